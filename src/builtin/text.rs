use super::{BuiltinCommand, Invocation, collect_errors};
use crate::command::ExecutionError;
use anyhow::Context;
use argh::FromArgs;
use regex::{Regex, RegexBuilder};
use std::fs::File;
use std::io::ErrorKind;

/// Reads a named file through the checked copy, relative to the working path.
fn read_file(io: &Invocation<'_>, name: &str) -> Result<Vec<u8>, ExecutionError> {
    let mut file = File::open(io.resolve(name))?;
    let mut data = Vec::new();
    io.transfer(&mut file, &mut data)?;
    Ok(data)
}

#[derive(FromArgs)]
/// Print files to standard output; without files, copy standard input.
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print, relative to the current directory.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        if self.files.is_empty() {
            io.pump()?;
            return Ok(());
        }

        let mut errors = Vec::new();
        for name in &self.files {
            let mut file = match File::open(io.resolve(name)) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    errors.push(format!("{name} - file does not exist"));
                    continue;
                }
                Err(e) => {
                    errors.push(format!("{name} - {e}"));
                    continue;
                }
            };
            match io.copy_from(&mut file) {
                Ok(_) => {}
                Err(ExecutionError::Stopped) => return Err(ExecutionError::Stopped),
                Err(e) => errors.push(format!("{name} - {e}")),
            }
        }
        collect_errors(errors)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let mut line = self.args.join(" ");
        if !self.no_newline {
            line.push('\n');
        }
        io.print(&line)
    }
}

#[derive(FromArgs)]
/// count lines, words and bytes
pub struct Wc {
    #[argh(positional, greedy)]
    /// files to count; standard input when omitted.
    pub files: Vec<String>,
}

fn counts(data: &[u8]) -> (usize, usize, usize) {
    let text = String::from_utf8_lossy(data);
    (text.lines().count(), text.split_whitespace().count(), data.len())
}

impl BuiltinCommand for Wc {
    fn name() -> &'static str {
        "wc"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        if self.files.is_empty() {
            let data = io.read_input()?;
            let (lines, words, bytes) = counts(&data);
            return io.print(&format!("{lines} {words} {bytes}\n"));
        }

        let mut errors = Vec::new();
        for name in &self.files {
            match read_file(io, name) {
                Ok(data) => {
                    let (lines, words, bytes) = counts(&data);
                    io.print(&format!("{lines} {words} {bytes} {name}\n"))?;
                }
                Err(ExecutionError::Stopped) => return Err(ExecutionError::Stopped),
                Err(e) => errors.push(format!("wc: {name}: {e}")),
            }
        }
        collect_errors(errors)
    }
}

#[derive(FromArgs)]
/// print lines matching a pattern
pub struct Grep {
    #[argh(positional)]
    /// the pattern to search for (a regular expression)
    pub pattern: String,

    #[argh(positional, greedy)]
    /// files to search. If none provided, reads from stdin.
    pub files: Vec<String>,

    #[argh(switch, short = 'w')]
    /// match only whole words (using non-word characters as boundaries)
    pub word_regexp: bool,

    #[argh(switch, short = 'i')]
    /// ignore case distinctions
    pub ignore_case: bool,
}

impl Grep {
    fn regex(&self) -> anyhow::Result<Regex> {
        let pattern = if self.word_regexp {
            format!(r"\b({})\b", self.pattern)
        } else {
            self.pattern.clone()
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
            .with_context(|| format!("Invalid regex pattern: {pattern}"))
    }

    fn matching(
        io: &mut Invocation<'_>,
        data: &[u8],
        re: &Regex,
        prefix: &str,
    ) -> Result<(), ExecutionError> {
        let text = String::from_utf8_lossy(data);
        for line in text.lines().filter(|line| re.is_match(line)) {
            io.print(&format!("{prefix}{line}\n"))?;
        }
        Ok(())
    }
}

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let re = self.regex()?;

        if self.files.is_empty() {
            let data = io.read_input()?;
            return Grep::matching(io, &data, &re, "");
        }

        let mut errors = Vec::new();
        for name in &self.files {
            match read_file(io, name) {
                Ok(data) => Grep::matching(io, &data, &re, &format!("{name}:"))?,
                Err(ExecutionError::Stopped) => return Err(ExecutionError::Stopped),
                Err(e) => errors.push(format!("grep: {name}: {e}")),
            }
        }
        collect_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::tests::run;
    use std::fs;

    #[test]
    fn test_cat_copies_stdin_when_no_args() {
        let cat = Cat { files: Vec::new() };
        let (res, out, _) = run(cat, "/", b"from stdin\nline2\n");
        assert!(res.is_ok());
        assert_eq!(out, "from stdin\nline2\n");
    }

    #[test]
    fn test_cat_prints_files_and_reports_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.txt"), "hello\n").unwrap();
        fs::write(dir.path().join("two.txt"), "world\n").unwrap();
        let path = dir.path().to_string_lossy().into_owned();

        let cat = Cat {
            files: vec!["one.txt".into(), "ghost.txt".into(), "two.txt".into()],
        };
        let (res, out, _) = run(cat, &path, b"");
        assert_eq!(out, "hello\nworld\n");
        assert_eq!(res.unwrap_err().to_string(), "ghost.txt - file does not exist");
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let echo = Echo {
            no_newline: false,
            args: vec!["hello".into(), "world".into()],
        };
        let (_, out, _) = run(echo, "/", b"");
        assert_eq!(out, "hello world\n");

        let echo = Echo {
            no_newline: true,
            args: vec!["foo".into(), "bar".into()],
        };
        let (_, out, _) = run(echo, "/", b"");
        assert_eq!(out, "foo bar");
    }

    #[test]
    fn test_wc_counts_stdin_when_no_args() {
        let (res, out, _) = run(Wc { files: Vec::new() }, "/", b"a b c\n");
        assert!(res.is_ok());
        assert_eq!(out, "1 3 6\n");
    }

    #[test]
    fn test_wc_counts_files_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "one two\nthree\n").unwrap();
        let path = dir.path().to_string_lossy().into_owned();

        let (res, out, _) = run(Wc { files: vec!["f.txt".into()] }, &path, b"");
        assert!(res.is_ok());
        assert_eq!(out, "2 3 14 f.txt\n");
    }

    #[test]
    fn test_grep_ignore_case_with_file_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), "Target 1\nTaRgEt 2\nNo match\n").unwrap();
        let path = dir.path().to_string_lossy().into_owned();

        let grep = Grep {
            pattern: "target".into(),
            files: vec!["data.txt".into()],
            word_regexp: false,
            ignore_case: true,
        };
        let (res, out, _) = run(grep, &path, b"");
        assert!(res.is_ok());
        assert_eq!(out, "data.txt:Target 1\ndata.txt:TaRgEt 2\n");
    }

    #[test]
    fn test_grep_whole_words_from_stdin() {
        let grep = Grep {
            pattern: "cat".into(),
            files: Vec::new(),
            word_regexp: true,
            ignore_case: false,
        };
        let (res, out, _) = run(grep, "/", b"concatenate\nthe cat sat\n");
        assert!(res.is_ok());
        assert_eq!(out, "the cat sat\n");
    }

    #[test]
    fn test_grep_rejects_invalid_pattern() {
        let grep = Grep {
            pattern: "(".into(),
            files: Vec::new(),
            word_regexp: false,
            ignore_case: false,
        };
        let (res, out, _) = run(grep, "/", b"anything\n");
        assert!(res.unwrap_err().to_string().starts_with("Invalid regex pattern"));
        assert_eq!(out, "");
    }
}
