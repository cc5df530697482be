//! A line-oriented command interpreter with pipes, redirection and background runs.
//!
//! A parsed line is a pipeline of [`ParsedCommand`]s. The [`Interpreter`] looks
//! every stage up in its registry of command prototypes, wires the stages'
//! streams together (pipes, redirect files, or the [`Console`]), runs each
//! stage on its own thread and returns one [`Status`] per stage.
//!
//! Cancellation is cooperative: an [`InterruptHandle`] pushes a stop request
//! into every stage of the foreground run, and commands observe it at the
//! checked I/O points of their [`StopSignal`].
//!
//! The public modules [`command`] and [`builtin`] expose the traits for
//! implementing your own commands and the default command set.

pub mod builtin;
pub mod command;
pub mod config;
pub mod interrupt;
pub mod io_adapters;
pub mod parser;
pub mod registry;
pub mod repl;
pub mod status;

mod interpreter;
mod pipeline;

pub use command::{Command, ExecutionContext, ExecutionError, StopHandle, StopSignal};
pub use interpreter::Interpreter;
pub use interrupt::InterruptHandle;
pub use io_adapters::{Console, MemConsole, StdConsole};
pub use parser::{ParseError, ParsedCommand, parse};
pub use registry::{Registry, RegistryError};
pub use status::{Status, StatusCode, exit_requested};
