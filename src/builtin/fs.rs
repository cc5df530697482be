use super::{BuiltinCommand, Invocation, collect_errors};
use crate::command::ExecutionError;
use anyhow::{Context, anyhow};
use argh::FromArgs;
use chrono::{DateTime, Local};
use std::fs::{self, File, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(FromArgs)]
/// List the entries of a directory, sorted by name.
pub struct Ls {
    #[argh(switch, short = 'l')]
    /// long format: mode, size, modification time and name, one per line.
    pub long: bool,

    #[argh(positional)]
    /// directory to list; defaults to the current directory.
    pub dir: Option<String>,
}

struct Entry {
    name: String,
    meta: Metadata,
}

impl Ls {
    fn entries(dir: &Path, io: &Invocation<'_>) -> Result<Vec<Entry>, ExecutionError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("ls: cannot read {}", dir.display()))? {
            io.check()?;
            let entry = entry?;
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                meta: entry.metadata()?,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let dir = match &self.dir {
            Some(dir) => io.resolve(dir),
            None => PathBuf::from(io.path.as_str()),
        };
        let entries = Ls::entries(&dir, io)?;

        if !self.long {
            for entry in &entries {
                let slash = if entry.meta.is_dir() { "/" } else { "" };
                io.print(&format!("{}{}    ", entry.name, slash))?;
            }
            if !entries.is_empty() {
                io.print("\n")?;
            }
            return Ok(());
        }

        let width = entries
            .iter()
            .map(|e| e.meta.len().to_string().len())
            .max()
            .unwrap_or(0);
        for entry in &entries {
            let modified = entry
                .meta
                .modified()
                .map(|t| DateTime::<Local>::from(t).format("%H:%M %d %b").to_string())
                .unwrap_or_else(|_| "--:-- -- ---".to_string());
            let slash = if entry.meta.is_dir() { "/" } else { "" };
            io.print(&format!(
                "{} {:>width$} {} {}{}\n",
                mode_string(&entry.meta),
                entry.meta.len(),
                modified,
                entry.name,
                slash,
            ))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn mode_string(meta: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode();
    let mut s = String::with_capacity(10);
    s.push(file_kind(meta));
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

#[cfg(not(unix))]
fn mode_string(meta: &Metadata) -> String {
    let rest = if meta.permissions().readonly() { "r--r--r--" } else { "rw-rw-rw-" };
    format!("{}{}", file_kind(meta), rest)
}

fn file_kind(meta: &Metadata) -> char {
    if meta.is_dir() {
        'd'
    } else if meta.file_type().is_symlink() {
        'L'
    } else {
        '-'
    }
}

/// Resolves and validates the two arguments of `cp` and `mv`.
fn source_and_target(files: &[String], io: &Invocation<'_>) -> Result<(PathBuf, PathBuf), ExecutionError> {
    let [source, target] = files else {
        return Err(anyhow!("Two arguments are needed").into());
    };
    let source = io.resolve(source);
    let target = io.resolve(target);
    if source == target {
        return Err(anyhow!("Source and target file are the same").into());
    }
    match fs::metadata(&source) {
        Ok(meta) if meta.is_dir() => Err(anyhow!("{} - is a directory", source.display()).into()),
        Ok(_) => Ok((source, target)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(anyhow!("{} - is not a valid name in the file system", source.display()).into())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(FromArgs)]
/// Copy a file.
pub struct Cp {
    #[argh(positional, greedy)]
    /// source and target file names.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cp {
    fn name() -> &'static str {
        "cp"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let (source, target) = source_and_target(&self.files, io)?;
        let mut from = File::open(&source).with_context(|| format!("cannot open {}", source.display()))?;
        let mut to = File::create(&target).with_context(|| format!("cannot create {}", target.display()))?;
        io.transfer(&mut from, &mut to)?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Move or rename a file.
pub struct Mv {
    #[argh(positional, greedy)]
    /// source and target file names.
    pub files: Vec<String>,
}

impl BuiltinCommand for Mv {
    fn name() -> &'static str {
        "mv"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let (source, target) = source_and_target(&self.files, io)?;
        io.check()?;
        fs::rename(&source, &target)
            .with_context(|| format!("cannot move {} to {}", source.display(), target.display()))?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Create directories.
pub struct Mkdir {
    #[argh(positional, greedy)]
    /// names of the directories to create.
    pub dirs: Vec<String>,
}

impl BuiltinCommand for Mkdir {
    fn name() -> &'static str {
        "mkdir"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        if self.dirs.is_empty() {
            return Err(anyhow!("At least one argument is needed").into());
        }
        let mut errors = Vec::new();
        for dir in &self.dirs {
            io.check()?;
            let full = io.resolve(dir);
            match fs::symlink_metadata(&full) {
                Ok(_) => errors.push(format!("{} - exists", full.display())),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if let Err(e) = fs::create_dir(&full) {
                        errors.push(format!("{} - {}", full.display(), e));
                    }
                }
                Err(e) => errors.push(format!("{} - {}", full.display(), e)),
            }
        }
        collect_errors(errors)
    }
}

#[derive(FromArgs)]
/// Remove files, or directories with -r.
pub struct Rm {
    #[argh(switch, short = 'r')]
    /// remove directories and their contents; files are left alone.
    pub recursive: bool,

    #[argh(positional, greedy)]
    /// names to remove.
    pub names: Vec<String>,
}

impl BuiltinCommand for Rm {
    fn name() -> &'static str {
        "rm"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        if self.names.is_empty() {
            return Err(anyhow!("At least one argument is needed").into());
        }
        let mut errors = Vec::new();
        for name in &self.names {
            io.check()?;
            let full = io.resolve(name);
            let meta = match fs::metadata(&full) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    errors.push(format!("{} is not a valid name in the file system", full.display()));
                    continue;
                }
                Err(e) => {
                    errors.push(e.to_string());
                    continue;
                }
            };

            let removed = match (self.recursive, meta.is_dir()) {
                (true, true) => fs::remove_dir_all(&full),
                (false, false) => fs::remove_file(&full),
                (true, false) => {
                    errors.push(format!("{} is a file", full.display()));
                    continue;
                }
                (false, true) => {
                    errors.push(format!("{} is a directory", full.display()));
                    continue;
                }
            };
            if let Err(e) = removed {
                errors.push(format!("{} - {}", full.display(), e));
            }
        }
        collect_errors(errors)
    }
}

#[derive(FromArgs)]
/// Search the current directory tree for entries with the given names.
pub struct Find {
    #[argh(positional, greedy)]
    /// entry names to look for.
    pub names: Vec<String>,
}

impl BuiltinCommand for Find {
    fn name() -> &'static str {
        "find"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        if self.names.is_empty() {
            return Err(anyhow!("At least one argument is needed").into());
        }
        let root = PathBuf::from(io.path.as_str());
        let mut errors = Vec::new();

        'names: for name in &self.names {
            io.check()?;
            for entry in WalkDir::new(&root).sort_by_file_name() {
                io.check()?;
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        errors.push(e.to_string());
                        continue 'names;
                    }
                };
                if entry.file_name().to_string_lossy() == name.as_str() {
                    io.print(&format!("{} found - {}\n", name, entry.path().display()))?;
                    continue 'names;
                }
            }
            io.print(&format!("{name} not found\n"))?;
        }
        collect_errors(errors)
    }
}
