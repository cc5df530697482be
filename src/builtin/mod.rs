//! Built-in commands.
//!
//! Every builtin is an [`argh`] `FromArgs` struct implementing
//! [`BuiltinCommand`]. The generic [`Builtin`] wrapper turns it into a
//! registrable [`Command`]: it owns the working path and the stop signal,
//! rebuilds the command line from the stage's options and arguments, and
//! routes all I/O through the checked points of the stop signal.

mod fs;
mod nav;
mod net;
mod text;

pub use fs::{Cp, Find, Ls, Mkdir, Mv, Rm};
pub use nav::{Cd, Pwd};
pub use net::Ping;
pub use text::{Cat, Echo, Grep, Wc};

use crate::command::{Command, ExecutionContext, ExecutionError, StopHandle, StopSignal, full_path};
use crate::interpreter::Interpreter;
use crate::registry::RegistryError;
use argh::{EarlyExit, FromArgs};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
pub trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "ls" or "cd".
    fn name() -> &'static str;

    /// Executes the parsed command against the stage's streams.
    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError>;
}

/// What a running builtin may touch: its own working path and the stage's
/// streams, the latter only through checked reads and writes.
pub struct Invocation<'a> {
    pub path: &'a mut String,
    input: &'a mut dyn Read,
    output: &'a mut dyn Write,
    stop: &'a StopSignal,
}

impl<'a> Invocation<'a> {
    pub fn new(
        path: &'a mut String,
        input: &'a mut dyn Read,
        output: &'a mut dyn Write,
        stop: &'a StopSignal,
    ) -> Self {
        Self {
            path,
            input,
            output,
            stop,
        }
    }

    /// Cancellation point without I/O, for loops over the file system.
    pub fn check(&self) -> Result<(), ExecutionError> {
        self.stop.check()
    }

    pub fn print(&mut self, text: &str) -> Result<(), ExecutionError> {
        self.stop.write_all(self.output, text.as_bytes())
    }

    pub fn read_input(&mut self) -> Result<Vec<u8>, ExecutionError> {
        self.stop.read_to_end(self.input)
    }

    /// Copies the stage input to the stage output.
    pub fn pump(&mut self) -> Result<u64, ExecutionError> {
        self.stop.copy(self.input, self.output)
    }

    /// Copies `reader` to the stage output.
    pub fn copy_from(&mut self, reader: &mut dyn Read) -> Result<u64, ExecutionError> {
        self.stop.copy(reader, self.output)
    }

    /// Copies between two handles that are not the stage's streams.
    pub fn transfer(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> Result<u64, ExecutionError> {
        self.stop.copy(reader, writer)
    }

    /// Resolves a user-supplied name against the working path.
    pub fn resolve(&self, name: &str) -> PathBuf {
        full_path(self.path.as_str(), name)
    }
}

/// Registrable prototype of the builtin `T`.
pub struct Builtin<T> {
    path: String,
    stop: StopSignal,
    _command: PhantomData<fn() -> T>,
}

impl<T> Builtin<T> {
    pub fn new() -> Self {
        Self::at(String::new())
    }

    fn at(path: String) -> Self {
        Self {
            path,
            stop: StopSignal::new(),
            _command: PhantomData,
        }
    }
}

impl<T> Default for Builtin<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BuiltinCommand + 'static> Command for Builtin<T> {
    fn name(&self) -> &str {
        T::name()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(Self::at(self.path.clone()))
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.handle()
    }

    fn execute(&mut self, mut ctx: ExecutionContext) -> Result<(), ExecutionError> {
        self.path = std::mem::take(&mut ctx.path);
        let argv = ctx.argv();
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();

        let mut io = Invocation::new(&mut self.path, &mut ctx.input, &mut ctx.output, &self.stop);
        match T::from_args(&[T::name()], &argv) {
            Ok(command) => command.run(&mut io)?,
            Err(EarlyExit { output, status }) => {
                if status.is_err() {
                    return Err(ExecutionError::Usage(format!("{}: {}", T::name(), output.trim_end())));
                }
                io.print(&output)?;
            }
        }
        ctx.output.flush()?;
        Ok(())
    }
}

/// The default command set.
pub fn defaults() -> Vec<Box<dyn Command>> {
    vec![
        Box::new(Builtin::<Pwd>::default()),
        Box::new(Builtin::<Cd>::default()),
        Box::new(Builtin::<Ls>::default()),
        Box::new(Builtin::<Cat>::default()),
        Box::new(Builtin::<Cp>::default()),
        Box::new(Builtin::<Mv>::default()),
        Box::new(Builtin::<Mkdir>::default()),
        Box::new(Builtin::<Rm>::default()),
        Box::new(Builtin::<Find>::default()),
        Box::new(Builtin::<Ping>::default()),
        Box::new(Builtin::<Echo>::default()),
        Box::new(Builtin::<Wc>::default()),
        Box::new(Builtin::<Grep>::default()),
    ]
}

/// Registers [`defaults`] with `interpreter`.
pub fn install(interpreter: &mut Interpreter) -> Result<(), RegistryError> {
    for command in defaults() {
        interpreter.register(command)?;
    }
    Ok(())
}

/// Joins per-item error messages; `Ok` when there were none.
fn collect_errors(errors: Vec<String>) -> Result<(), ExecutionError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(errors.join("\n")).into())
    }
}
