use crate::command::{Command, ExecutionContext, ExecutionError};
use crate::interrupt::InterruptHandle;
use crate::io_adapters::{Console, StdConsole};
use crate::parser::ParsedCommand;
use crate::pipeline::{Pipeline, Stage};
use crate::registry::{Registry, RegistryError};
use crate::status::{Aggregator, Event, Status, StatusCode};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};

/// Runs parsed command lines against a registry of command prototypes.
///
/// The interpreter owns the working path. Stages only ever see a snapshot of
/// it; after a run the interpreter adopts the path of the stage's command, but
/// only when the run was a single foreground stage that finished `Ok`.
///
/// Example
/// ```
/// use pipeline_shell::{Interpreter, MemConsole, ParsedCommand, StatusCode, builtin};
/// use std::sync::Arc;
///
/// let console = MemConsole::default();
/// let mut sh = Interpreter::with_console("/a/b", Arc::new(console.clone()));
/// builtin::install(&mut sh).unwrap();
///
/// let statuses = sh.interpret(vec![ParsedCommand::new("pwd")]);
/// assert_eq!(statuses[0].code, StatusCode::Ok);
/// assert_eq!(console.output_string(), "/a/b");
/// ```
pub struct Interpreter {
    path: String,
    registry: Registry,
    console: Arc<dyn Console>,
    interrupts: InterruptHandle,
    /// Stage threads nobody waits for: background runs and interrupted stages.
    detached: Vec<JoinHandle<()>>,
}

/// A stage that passed lookup and stream resolution.
struct Job {
    index: usize,
    name: String,
    command: Box<dyn Command>,
    ctx: ExecutionContext,
}

impl Interpreter {
    /// Interpreter on the process' stdin/stdout with an empty registry.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_console(path, Arc::new(StdConsole))
    }

    pub fn with_console(path: impl Into<String>, console: Arc<dyn Console>) -> Self {
        Self {
            path: path.into(),
            registry: Registry::new(),
            console,
            interrupts: InterruptHandle::new(),
            detached: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn register(&mut self, command: Box<dyn Command>) -> Result<(), RegistryError> {
        self.registry.register(command)
    }

    pub fn register_exit(&mut self, name: impl Into<String>) -> Result<(), RegistryError> {
        self.registry.register_exit(name)
    }

    /// Handle that interrupts whatever runs in the foreground.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupts.clone()
    }

    /// Joins every detached stage thread.
    pub fn wait_background(&mut self) {
        for handle in self.detached.drain(..) {
            let _ = handle.join();
        }
    }

    /// Runs one pipeline and returns one status per stage, in stage order.
    ///
    /// Foreground runs wait for every stage unless an interrupt arrives first.
    /// Background runs return as soon as the stages are launched.
    pub fn interpret(&mut self, commands: Vec<ParsedCommand>) -> Vec<Status> {
        self.detached.retain(|handle| !handle.is_finished());
        if commands.is_empty() {
            return Vec::new();
        }

        let names: Vec<String> = commands.iter().map(|c| c.name.clone()).collect();
        let pipeline = match Pipeline::build(commands, &self.path, self.console.as_ref()) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                tracing::error!("cannot allocate pipes: {err}");
                return names
                    .into_iter()
                    .map(|name| Status::new(StatusCode::Ok, name).with_error(&err))
                    .collect();
            }
        };

        let background = pipeline.background;
        let (events, completions) = mpsc::sync_channel(pipeline.len());
        let mut aggregator = Aggregator::new(names);

        let mut jobs = Vec::new();
        for stage in pipeline.stages {
            match self.prepare(stage) {
                Ok(job) => jobs.push(job),
                Err((index, status)) => aggregator.record(index, status, None),
            }
        }

        let stops = jobs.iter().map(|job| job.command.stop_handle()).collect();
        let armed = (!background).then(|| self.interrupts.arm(stops, events.clone()));

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (index, name) = (job.index, job.name.clone());
            match self.launch(job, events.clone(), background) {
                Ok(handle) => {
                    if background {
                        aggregator.record(index, Status::new(StatusCode::Ok, name), None);
                    }
                    handles.push(handle);
                }
                Err(err) => {
                    tracing::error!(stage = index, command = %name, "cannot spawn stage: {err}");
                    aggregator.record(index, Status::new(StatusCode::Ok, name).with_error(err), None);
                }
            }
        }
        drop(events);

        if background {
            self.detached.extend(handles);
            return aggregator.into_statuses();
        }

        let mut interrupted = false;
        while !aggregator.is_complete() {
            match completions.recv() {
                Ok(Event::Finished {
                    index,
                    status,
                    path,
                }) => aggregator.record(index, status, path),
                Ok(Event::Interrupt) => {
                    let pending = aggregator.request_stop();
                    tracing::info!(pending, "foreground run interrupted");
                    interrupted = true;
                    break;
                }
                Err(_) => break,
            }
        }
        drop(armed);
        aggregator.conclude("stage exited without reporting a status");

        if interrupted {
            // stopped stages finish and close their streams on their own
            self.detached.extend(handles);
        } else {
            for handle in handles {
                let _ = handle.join();
            }
        }

        if let Some(path) = aggregator.path_update(background) {
            tracing::debug!(from = %self.path, to = %path, "working path updated");
            self.path = path.to_string();
        }
        aggregator.into_statuses()
    }

    /// Lookup and context building for one stage. Stages that do not run
    /// drop their streams here, which closes any pipe ends they held.
    fn prepare(&self, stage: Stage) -> Result<Job, (usize, Status)> {
        let Stage {
            index,
            command: parsed,
            streams,
        } = stage;

        if self.registry.is_exit(&parsed.name) {
            return Err((index, Status::new(StatusCode::ExitRequested, parsed.name)));
        }
        let Some(prototype) = self.registry.lookup(&parsed.name) else {
            tracing::debug!(stage = index, command = %parsed.name, "unknown command");
            return Err((index, Status::new(StatusCode::UnknownCommand, parsed.name)));
        };
        let streams = match streams {
            Ok(streams) => streams,
            Err(err) => {
                let status = Status::new(StatusCode::Ok, parsed.name).with_error(format!("{err:#}"));
                return Err((index, status));
            }
        };

        let ctx = ExecutionContext {
            path: self.path.clone(),
            arguments: parsed.arguments,
            options: parsed.options,
            input: streams.input,
            output: streams.output,
        };
        Ok(Job {
            index,
            name: parsed.name,
            command: prototype.clone_box(),
            ctx,
        })
    }

    fn launch(
        &self,
        job: Job,
        events: SyncSender<Event>,
        background: bool,
    ) -> std::io::Result<JoinHandle<()>> {
        let Job {
            index,
            name,
            mut command,
            ctx,
        } = job;
        let console = Arc::clone(&self.console);
        tracing::debug!(stage = index, command = %name, background, "launching stage");

        thread::Builder::new()
            .name(format!("stage-{index}-{name}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| command.execute(ctx)));
                let status = match result {
                    Ok(Ok(())) => Status::new(StatusCode::Ok, &name),
                    Ok(Err(ExecutionError::Stopped)) => Status::new(StatusCode::Interrupted, &name),
                    Ok(Err(err)) => Status::new(StatusCode::Ok, &name).with_error(err),
                    Err(_) => Status::new(StatusCode::Ok, &name).with_error("command panicked"),
                };
                tracing::debug!(stage = index, command = %name, code = ?status.code, "stage finished");

                if background {
                    if let Some(err) = &status.error {
                        let _ = writeln!(console.error(), "{name}: {err}");
                    }
                }
                // the receiver is gone once the run was concluded
                let _ = events.send(Event::Finished {
                    index,
                    status,
                    path: Some(command.path().to_string()),
                });
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::io_adapters::MemConsole;

    fn interpreter(path: &str) -> (Interpreter, MemConsole) {
        let console = MemConsole::default();
        let mut sh = Interpreter::with_console(path, Arc::new(console.clone()));
        builtin::install(&mut sh).unwrap();
        sh.register_exit("exit").unwrap();
        (sh, console)
    }

    #[test]
    fn test_pwd_prints_shared_path() {
        let (mut sh, console) = interpreter("/a/b");
        let statuses = sh.interpret(vec![ParsedCommand::new("pwd")]);
        assert_eq!(statuses, vec![Status::new(StatusCode::Ok, "pwd")]);
        assert_eq!(console.output_string(), "/a/b");
    }

    #[test]
    fn test_exit_and_unknown_stages_do_not_run() {
        let (mut sh, console) = interpreter("/");
        let statuses = sh.interpret(vec![
            ParsedCommand::new("exit"),
            ParsedCommand::new("frobnicate"),
            ParsedCommand::new("cat"),
        ]);
        let codes: Vec<_> = statuses.iter().map(|s| s.code).collect();
        assert_eq!(
            codes,
            vec![StatusCode::ExitRequested, StatusCode::UnknownCommand, StatusCode::Ok]
        );
        assert_eq!(console.output_string(), "");
        assert_eq!(sh.path(), "/");
    }

    #[test]
    fn test_empty_pipeline_yields_no_statuses() {
        let (mut sh, _) = interpreter("/");
        assert!(sh.interpret(Vec::new()).is_empty());
    }

    #[test]
    fn test_command_errors_are_reported_not_escalated() {
        let (mut sh, console) = interpreter("/");
        let statuses = sh.interpret(vec![ParsedCommand::new("cd").arg("a").arg("b")]);
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].code, StatusCode::Ok);
        assert_eq!(statuses[0].error.as_deref(), Some("Too many arguments"));
        assert_eq!(console.output_string(), "");
    }

    #[test]
    fn test_failed_command_does_not_update_path() {
        let (mut sh, _) = interpreter("/");
        let statuses = sh.interpret(vec![ParsedCommand::new("cd").arg("definitely/not/here")]);
        assert!(statuses[0].error.is_some());
        assert_eq!(sh.path(), "/");
    }
}
