use super::{BuiltinCommand, Invocation};
use crate::command::ExecutionError;
use anyhow::{Context, anyhow};
use argh::FromArgs;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let path = io.path.clone();
        io.print(&path)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target, changes to the root of the current path.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let target = match self.target.as_slice() {
            [] => None,
            [target] => Some(target.as_str()).filter(|t| !t.is_empty()),
            _ => return Err(anyhow!("Too many arguments").into()),
        };
        let Some(target) = target else {
            *io.path = root_of(io.path.as_str()).to_string_lossy().into_owned();
            return Ok(());
        };

        let candidate = io.resolve(target);
        match fs::metadata(&candidate) {
            Ok(meta) if meta.is_dir() => {
                let canonical = fs::canonicalize(&candidate)
                    .with_context(|| format!("cd: can't canonicalize {}", candidate.display()))?;
                *io.path = canonical.to_string_lossy().into_owned();
                Ok(())
            }
            Ok(_) => Err(anyhow!("{} - path leads to file, not directory", candidate.display()).into()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(anyhow!("{} - path does not exist", candidate.display()).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// First component of `path`: `/` for absolute Unix paths.
fn root_of(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .next()
        .map(|c| PathBuf::from(c.as_os_str()))
        .unwrap_or_else(|| PathBuf::from("/"))
}
