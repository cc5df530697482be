use crate::command::full_path;
use anyhow::{Context, anyhow};
use os_pipe::{PipeReader, PipeWriter};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, ErrorKind, Read, Result as IoResult, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the interactive streams handed to the first and last stages.
pub trait Console: Send + Sync {
    fn input(&self) -> Box<dyn Read + Send>;
    fn output(&self) -> Box<dyn Write + Send>;
    /// Where background stages report their errors.
    fn error(&self) -> Box<dyn Write + Send>;
}

/// The process' own stdin, stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn input(&self) -> Box<dyn Read + Send> {
        Box::new(io::stdin())
    }

    fn output(&self) -> Box<dyn Write + Send> {
        Box::new(io::stdout())
    }

    fn error(&self) -> Box<dyn Write + Send> {
        Box::new(io::stderr())
    }
}

/// Memory-backed writer whose bytes can be read back by the owner.
///
/// Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct SharedBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Memory-backed reader; clones consume the same cursor.
#[derive(Debug, Clone)]
struct SharedReader {
    cursor: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl Read for SharedReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(out)
    }
}

/// In-memory console, for embedding the interpreter and for tests.
#[derive(Debug, Clone)]
pub struct MemConsole {
    input: SharedReader,
    output: SharedBuffer,
    error: SharedBuffer,
}

impl MemConsole {
    /// Console whose interactive input yields `input`, then EOF.
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: SharedReader {
                cursor: Arc::new(Mutex::new(Cursor::new(input.into()))),
            },
            output: SharedBuffer::new(),
            error: SharedBuffer::new(),
        }
    }

    pub fn output_string(&self) -> String {
        self.output.to_string_lossy()
    }

    pub fn error_string(&self) -> String {
        self.error.to_string_lossy()
    }

    /// Number of interactive input bytes nobody has read yet.
    pub fn unread_input(&self) -> usize {
        let cursor = self
            .input
            .cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cursor.get_ref().len().saturating_sub(cursor.position() as usize)
    }
}

impl Default for MemConsole {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Console for MemConsole {
    fn input(&self) -> Box<dyn Read + Send> {
        Box::new(self.input.clone())
    }

    fn output(&self) -> Box<dyn Write + Send> {
        Box::new(self.output.clone())
    }

    fn error(&self) -> Box<dyn Write + Send> {
        Box::new(self.error.clone())
    }
}

/// Resolved input of a stage.
pub enum Input {
    Interactive(Box<dyn Read + Send>),
    File(File),
    Pipe(PipeReader),
    /// Always at EOF; used to insulate background stages from the console.
    Exhausted,
}

impl Input {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Input::Interactive(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Input::Interactive(_) => "interactive",
            Input::File(_) => "file",
            Input::Pipe(_) => "pipe",
            Input::Exhausted => "exhausted",
        }
    }
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self {
            Input::Interactive(r) => r.read(buf),
            Input::File(f) => f.read(buf),
            Input::Pipe(p) => p.read(buf),
            Input::Exhausted => Ok(0),
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input::{}", self.kind())
    }
}

/// Resolved output of a stage.
pub enum Output {
    Interactive(Box<dyn Write + Send>),
    File(File),
    Pipe(PipeWriter),
}

impl Output {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Output::Interactive(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Output::Interactive(_) => "interactive",
            Output::File(_) => "file",
            Output::Pipe(_) => "pipe",
        }
    }
}

impl Write for Output {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        match self {
            Output::Interactive(w) => w.write(data),
            Output::File(f) => f.write(data),
            Output::Pipe(p) => p.write(data),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            Output::Interactive(w) => w.flush(),
            Output::File(f) => f.flush(),
            Output::Pipe(p) => p.flush(),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output::{}", self.kind())
    }
}

/// Opens a redirected input file, relative to the working path.
pub(crate) fn open_input(path: &str, file_name: &str) -> anyhow::Result<File> {
    let full = full_path(path, file_name);
    File::open(&full).map_err(|e| match e.kind() {
        ErrorKind::NotFound => anyhow!(
            "File for reading the input with name {} does not exist",
            file_name
        ),
        _ => anyhow::Error::new(e).context(format!("cannot open {} for reading", full.display())),
    })
}

/// Opens (creating or truncating) a redirected output file, relative to the working path.
pub(crate) fn open_output(path: &str, file_name: &str) -> anyhow::Result<File> {
    let full = full_path(path, file_name);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full)
        .with_context(|| format!("cannot open {} for writing", full.display()))
}

/// A background stage must never wait on the console.
pub(crate) fn insulate(input: Input, background: bool) -> Input {
    if background && input.is_interactive() {
        Input::Exhausted
    } else {
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_mem_console_shares_buffers_between_handles() {
        let console = MemConsole::new("abc");
        let mut first = console.output();
        let mut second = console.output();
        first.write_all(b"one ").unwrap();
        second.write_all(b"two").unwrap();
        assert_eq!(console.output_string(), "one two");

        let mut buf = [0u8; 2];
        let n = console.input().read(&mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(console.unread_input(), 1);
    }

    #[test]
    fn test_insulate_only_replaces_interactive_input_in_background() {
        let console = MemConsole::new("secret");

        let fg = insulate(Input::Interactive(console.input()), false);
        assert!(fg.is_interactive());

        let mut bg = insulate(Input::Interactive(console.input()), true);
        assert!(matches!(bg, Input::Exhausted));
        let mut buf = Vec::new();
        bg.read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());
        assert_eq!(console.unread_input(), 6);
    }

    #[test]
    fn test_open_input_reports_missing_file_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();

        let err = open_input(&path, "missing.txt").unwrap_err();
        assert_eq!(
            err.to_string(),
            "File for reading the input with name missing.txt does not exist"
        );
    }

    #[test]
    fn test_open_output_truncates_relative_to_working_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        std::fs::write(dir.path().join("out.txt"), "old content that is long").unwrap();

        let mut file = open_output(&path, "out.txt").unwrap();
        file.write_all(b"new").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "new");
    }
}
