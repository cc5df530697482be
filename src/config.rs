//! Command line and session settings of the `pipeline-shell` binary.

use argh::FromArgs;
use std::env;
use std::path::Path;

/// Exit keywords registered when none are given on the command line.
pub const DEFAULT_EXIT_KEYWORDS: [&str; 3] = ["exit", "logout", "bye"];

/// Keyword that says goodbye before ending the session.
pub const FAREWELL_KEYWORD: &str = "bye";

pub const DEFAULT_PROMPT: &str = "$ ";

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(FromArgs, Debug, Default, PartialEq)]
/// Line-oriented command interpreter with pipes, redirection and background runs.
pub struct Cli {
    #[argh(option)]
    /// directory to start in; defaults to the process working directory.
    pub dir: Option<String>,

    #[argh(option, short = 'c')]
    /// run a single command line and exit.
    pub command: Option<String>,

    #[argh(option)]
    /// tracing filter directive, e.g. `debug` or `pipeline_shell=trace`; overrides RUST_LOG.
    pub log_filter: Option<String>,

    #[argh(option)]
    /// keyword that ends the session; repeatable. Defaults to exit, logout and bye.
    pub exit_keyword: Vec<String>,
}

/// Settings of one shell session, resolved from [`Cli`] and the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    pub start_dir: String,
    pub exit_keywords: Vec<String>,
    pub farewell: String,
    pub prompt: String,
    pub log_filter: String,
    pub command: Option<String>,
}

impl ShellConfig {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        Self::resolve(cli, env::var("RUST_LOG").ok())
    }

    fn resolve(cli: Cli, rust_log: Option<String>) -> anyhow::Result<Self> {
        let start_dir = match cli.dir {
            Some(dir) => std::fs::canonicalize(Path::new(&dir))
                .map_err(|e| anyhow::anyhow!("{dir} - cannot start here: {e}"))?,
            None => env::current_dir()?,
        };
        let exit_keywords = if cli.exit_keyword.is_empty() {
            DEFAULT_EXIT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            cli.exit_keyword
        };
        let log_filter = cli
            .log_filter
            .or(rust_log.filter(|f| !f.is_empty()))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            start_dir: start_dir.to_string_lossy().into_owned(),
            exit_keywords,
            farewell: FAREWELL_KEYWORD.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            log_filter,
            command: cli.command,
        })
    }
}
