use crate::io_adapters::{Input, Output};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use thiserror::Error;

/// Size of the chunks moved by the checked copy helpers.
///
/// Every chunk is preceded by a cancellation check, so this also bounds how
/// much data a stopped command can still move.
const CHUNK_SIZE: usize = 4096;

/// Error returned by [`Command::execute`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A stop request was observed at one of the checked I/O points.
    #[error("execution was stopped")]
    Stopped,

    /// The options or arguments were rejected; carries the usage message.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Any domain error of the command itself ("file not found", ...).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutionError {
    pub fn is_stopped(&self) -> bool {
        matches!(self, ExecutionError::Stopped)
    }
}

/// Single-slot cancellation channel owned by one command instance.
///
/// The slot holds at most one pending stop request. Checking the signal
/// consumes the pending request, after which the command is expected to abort.
pub struct StopSignal {
    pending: Receiver<()>,
    sender: SyncSender<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, pending) = mpsc::sync_channel(1);
        Self { pending, sender }
    }

    /// Handle through which another thread can request a stop.
    pub fn handle(&self) -> StopHandle {
        StopHandle {
            sender: self.sender.clone(),
        }
    }

    /// Returns true (and consumes the request) if a stop was requested.
    pub fn is_requested(&self) -> bool {
        self.pending.try_recv().is_ok()
    }

    /// Cancellation point: fails with [`ExecutionError::Stopped`] on a pending request.
    pub fn check(&self) -> Result<(), ExecutionError> {
        if self.is_requested() {
            Err(ExecutionError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Checked read: polls the signal, then performs a single read.
    pub fn read(&self, input: &mut dyn Read, buf: &mut [u8]) -> Result<usize, ExecutionError> {
        self.check()?;
        loop {
            match input.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Checked write: polls the signal, then writes the whole buffer.
    pub fn write_all(&self, output: &mut dyn Write, bytes: &[u8]) -> Result<(), ExecutionError> {
        self.check()?;
        output.write_all(bytes)?;
        Ok(())
    }

    /// Moves everything from `input` to `output` in checked chunks.
    pub fn copy(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<u64, ExecutionError> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = self.read(input, &mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            self.write_all(output, &buf[..n])?;
            total += n as u64;
        }
    }

    /// Reads `input` to its end in checked chunks.
    pub fn read_to_end(&self, input: &mut dyn Read) -> Result<Vec<u8>, ExecutionError> {
        let mut data = Vec::new();
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = self.read(input, &mut buf)?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&buf[..n]);
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side of a [`StopSignal`].
#[derive(Clone)]
pub struct StopHandle {
    sender: SyncSender<()>,
}

impl StopHandle {
    /// Best-effort, non-blocking stop request.
    ///
    /// Returns false when the slot already holds an unconsumed request (the
    /// new request is dropped) or the command is gone.
    pub fn request_stop(&self) -> bool {
        self.sender.try_send(()).is_ok()
    }
}

/// Everything a single pipeline stage needs to run.
pub struct ExecutionContext {
    /// Snapshot of the interpreter's working path.
    pub path: String,
    pub arguments: Vec<String>,
    /// Options as parsed, without their leading `-`.
    pub options: Vec<String>,
    pub input: Input,
    pub output: Output,
}

impl ExecutionContext {
    pub fn new(path: impl Into<String>, input: Input, output: Output) -> Self {
        Self {
            path: path.into(),
            arguments: Vec::new(),
            options: Vec::new(),
            input,
            output,
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    /// Command line as seen by an argument parser: options first, then arguments.
    pub fn argv(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|o| format!("-{o}"))
            .chain(self.arguments.iter().cloned())
            .collect()
    }
}

/// Contract every executable command implements.
///
/// Registered instances are prototypes: the interpreter never executes them,
/// it executes the independent copies produced by [`Command::clone_box`].
pub trait Command: Send {
    /// Name the command is registered and invoked under.
    fn name(&self) -> &str;

    /// The command's own working path, as left by the last `execute`.
    fn path(&self) -> &str;

    /// Independent copy with a fresh stop signal; the current path carries over.
    fn clone_box(&self) -> Box<dyn Command>;

    /// Handle to this instance's stop signal.
    fn stop_handle(&self) -> StopHandle;

    /// Runs the command.
    ///
    /// All blocking I/O must go through the checked points of the command's
    /// [`StopSignal`]. Once a stop is observed the command returns
    /// [`ExecutionError::Stopped`] without touching its streams again. Output
    /// written before that stays written.
    fn execute(&mut self, ctx: ExecutionContext) -> Result<(), ExecutionError>;
}

impl Clone for Box<dyn Command> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Resolves `name` against the working path `base`; absolute names win.
pub fn full_path(base: &str, name: &str) -> PathBuf {
    Path::new(base).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stop_slot_holds_a_single_request() {
        let signal = StopSignal::new();
        let handle = signal.handle();

        assert!(handle.request_stop());
        // second request while the first is pending is dropped
        assert!(!handle.request_stop());

        assert!(signal.is_requested());
        assert!(!signal.is_requested());

        // slot is free again once consumed
        assert!(handle.request_stop());
    }

    #[test]
    fn test_checked_write_refuses_after_stop() {
        let signal = StopSignal::new();
        let mut out = Vec::new();

        signal.write_all(&mut out, b"before ").unwrap();
        signal.handle().request_stop();
        let err = signal.write_all(&mut out, b"after").unwrap_err();

        assert!(err.is_stopped());
        assert_eq!(out, b"before ");
    }

    #[test]
    fn test_checked_copy_moves_everything() {
        let signal = StopSignal::new();
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();

        let n = signal.copy(&mut Cursor::new(data.clone()), &mut out).unwrap();

        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn test_checked_read_stops_before_reading() {
        let signal = StopSignal::new();
        let mut input = Cursor::new(b"untouched".to_vec());
        signal.handle().request_stop();

        let mut buf = [0u8; 4];
        assert!(signal.read(&mut input, &mut buf).unwrap_err().is_stopped());
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_argv_puts_options_first() {
        let ctx = ExecutionContext::new("/", Input::Exhausted, Output::Interactive(Box::new(Vec::new())))
            .with_arguments(["a", "b"])
            .with_options(["l", "r"]);

        assert_eq!(ctx.argv(), vec!["-l", "-r", "a", "b"]);
        assert!(ctx.has_option("r"));
        assert!(!ctx.has_option("x"));
    }

    #[test]
    fn test_full_path_keeps_absolute_names() {
        assert_eq!(full_path("/a/b", "c.txt"), PathBuf::from("/a/b/c.txt"));
        assert_eq!(full_path("/a/b", "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
