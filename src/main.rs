use anyhow::Context;
use pipeline_shell::config::{Cli, ShellConfig};
use pipeline_shell::repl::{self, LineOutcome};
use pipeline_shell::{Interpreter, builtin};
use std::io;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    let cli: Cli = argh::from_env();
    let config = match ShellConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter {:?}: {e}", config.log_filter);
        EnvFilter::new("warn")
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ShellConfig) -> anyhow::Result<()> {
    let mut interpreter = Interpreter::new(config.start_dir.as_str());
    builtin::install(&mut interpreter).context("cannot register builtin commands")?;
    for keyword in &config.exit_keywords {
        interpreter
            .register_exit(keyword.as_str())
            .context("cannot register exit keyword")?;
    }

    let interrupts = interpreter.interrupt_handle();
    ctrlc::set_handler(move || {
        if !interrupts.trigger() {
            tracing::debug!("interrupt with nothing in the foreground");
        }
    })
    .context("cannot install the interrupt handler")?;

    match &config.command {
        Some(line) => {
            let outcome = repl::run_line(&mut interpreter, line, config, &mut io::stdout())?;
            if outcome == LineOutcome::Continue {
                interpreter.wait_background();
            }
            Ok(())
        }
        None => repl::run(&mut interpreter, config),
    }
}
