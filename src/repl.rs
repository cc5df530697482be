//! Read-prompt-print loop around an [`Interpreter`].

use crate::config::ShellConfig;
use crate::interpreter::Interpreter;
use crate::parser;
use crate::status::{self, StatusCode};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};

/// What the loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Exit,
}

/// Parses and runs one line, reporting problems to `out`.
///
/// Nothing a stage does can make this fail; only writing to `out` can.
pub fn run_line(
    interpreter: &mut Interpreter,
    line: &str,
    config: &ShellConfig,
    out: &mut dyn Write,
) -> io::Result<LineOutcome> {
    if line.trim().is_empty() {
        return Ok(LineOutcome::Continue);
    }
    let commands = match parser::parse(line) {
        Ok(commands) => commands,
        Err(err) => {
            writeln!(out, "{err}")?;
            return Ok(LineOutcome::Continue);
        }
    };

    let statuses = interpreter.interpret(commands);
    if status::exit_requested(&statuses) {
        if statuses[0].command == config.farewell {
            writeln!(out, "{}", config.farewell)?;
        }
        writeln!(out)?;
        return Ok(LineOutcome::Exit);
    }

    for status in &statuses {
        match (&status.code, &status.error) {
            (StatusCode::UnknownCommand, _) => writeln!(out, "No command with name: {}", status.command)?,
            (StatusCode::Interrupted, _) => {
                tracing::info!(command = %status.command, "stage interrupted")
            }
            (_, Some(err)) => writeln!(out, "{err}")?,
            _ => {}
        }
    }
    out.flush()?;
    Ok(LineOutcome::Continue)
}

/// Interactive session on the terminal until an exit keyword or end of input.
pub fn run(interpreter: &mut Interpreter, config: &ShellConfig) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut stdout = io::stdout();

    loop {
        println!();
        println!("{}", interpreter.path());
        match editor.readline(&config.prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    editor.add_history_entry(line.as_str())?;
                }
                if run_line(interpreter, &line, config, &mut stdout)? == LineOutcome::Exit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::io_adapters::MemConsole;
    use std::sync::Arc;

    fn session() -> (Interpreter, ShellConfig, MemConsole) {
        let console = MemConsole::default();
        let mut sh = Interpreter::with_console("/a/b", Arc::new(console.clone()));
        builtin::install(&mut sh).unwrap();
        let config = ShellConfig {
            start_dir: "/a/b".into(),
            exit_keywords: vec!["exit".into(), "bye".into()],
            farewell: "bye".into(),
            prompt: "$ ".into(),
            log_filter: "warn".into(),
            command: None,
        };
        for keyword in &config.exit_keywords {
            sh.register_exit(keyword.as_str()).unwrap();
        }
        (sh, config, console)
    }

    fn line(sh: &mut Interpreter, config: &ShellConfig, text: &str) -> (LineOutcome, String) {
        let mut out = Vec::new();
        let outcome = run_line(sh, text, config, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_unknown_command_is_reported() {
        let (mut sh, config, _) = session();
        let (outcome, out) = line(&mut sh, &config, "frobnicate now");
        assert_eq!(outcome, LineOutcome::Continue);
        assert_eq!(out, "No command with name: frobnicate\n");
    }

    #[test]
    fn test_parse_error_is_printed_and_loop_continues() {
        let (mut sh, config, _) = session();
        let (outcome, out) = line(&mut sh, &config, "pwd | | cat");
        assert_eq!(outcome, LineOutcome::Continue);
        assert!(out.contains("empty command"), "{out}");
    }

    #[test]
    fn test_stage_errors_are_printed() {
        let (mut sh, config, _) = session();
        let (outcome, out) = line(&mut sh, &config, "cd a b");
        assert_eq!(outcome, LineOutcome::Continue);
        assert_eq!(out, "Too many arguments\n");
    }

    #[test]
    fn test_bye_says_goodbye_and_exit_does_not() {
        let (mut sh, config, _) = session();
        let (outcome, out) = line(&mut sh, &config, "bye");
        assert_eq!(outcome, LineOutcome::Exit);
        assert_eq!(out, "bye\n\n");

        let (outcome, out) = line(&mut sh, &config, "exit");
        assert_eq!(outcome, LineOutcome::Exit);
        assert_eq!(out, "\n");
    }

    #[test]
    fn test_exit_inside_pipeline_does_not_end_session() {
        let (mut sh, config, _) = session();
        let (outcome, _) = line(&mut sh, &config, "exit | pwd");
        assert_eq!(outcome, LineOutcome::Continue);
    }

    #[test]
    fn test_blank_line_is_ignored() {
        let (mut sh, config, console) = session();
        let (outcome, out) = line(&mut sh, &config, "   ");
        assert_eq!(outcome, LineOutcome::Continue);
        assert_eq!(out, "");
        assert_eq!(console.output_string(), "");
    }

    #[test]
    fn test_command_output_goes_to_console() {
        let (mut sh, config, console) = session();
        let (_, out) = line(&mut sh, &config, "pwd");
        assert_eq!(out, "");
        assert_eq!(console.output_string(), "/a/b");
    }
}
