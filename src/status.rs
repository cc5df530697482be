use crate::interrupt::StageState;
use std::fmt;

/// Completion code of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// The stage ran (or, in the background, was launched). Errors the
    /// command itself reported are carried in [`Status::error`].
    Ok,
    /// The stage named a registered exit keyword.
    ExitRequested,
    /// No command is registered under the stage's name.
    UnknownCommand,
    /// The stage was stopped by an interrupt.
    Interrupted,
}

/// Outcome of one stage, attributed by command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub command: String,
    /// Stage-local error that was reported but not escalated.
    pub error: Option<String>,
}

impl Status {
    pub fn new(code: StatusCode, command: impl Into<String>) -> Self {
        Self {
            code,
            command: command.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// True when the run was a lone exit keyword, i.e. the session should end.
pub fn exit_requested(statuses: &[Status]) -> bool {
    matches!(statuses, [only] if only.code == StatusCode::ExitRequested)
}

/// Message on the completion channel of a run.
pub(crate) enum Event {
    Finished {
        index: usize,
        status: Status,
        /// Working path of the stage's command after it finished.
        path: Option<String>,
    },
    Interrupt,
}

/// Collects exactly one status per stage, keyed by stage index.
pub(crate) struct Aggregator {
    names: Vec<String>,
    states: Vec<StageState>,
    statuses: Vec<Option<Status>>,
    paths: Vec<Option<String>>,
}

impl Aggregator {
    pub(crate) fn new(names: Vec<String>) -> Self {
        let n = names.len();
        Self {
            names,
            states: vec![StageState::Running; n],
            statuses: vec![None; n],
            paths: vec![None; n],
        }
    }

    pub(crate) fn record(&mut self, index: usize, status: Status, path: Option<String>) {
        let Some(slot) = self.statuses.get_mut(index) else {
            return;
        };
        if slot.is_none() {
            *slot = Some(status);
            self.paths[index] = path;
            self.states[index] = StageState::Finished;
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.statuses.iter().all(Option::is_some)
    }

    /// Marks every still-running stage as asked to stop; returns how many.
    pub(crate) fn request_stop(&mut self) -> usize {
        let mut count = 0;
        for state in &mut self.states {
            if *state == StageState::Running {
                *state = StageState::StopRequested;
                count += 1;
            }
        }
        count
    }

    /// Concludes the run without waiting further: stages that were asked to
    /// stop report `Interrupted`, anything else still missing reports `Ok`
    /// with `reason` as error.
    pub(crate) fn conclude(&mut self, reason: &str) {
        for (index, slot) in self.statuses.iter_mut().enumerate() {
            if slot.is_none() {
                let name = self.names[index].clone();
                *slot = Some(match self.states[index] {
                    StageState::StopRequested => Status::new(StatusCode::Interrupted, name),
                    _ => Status::new(StatusCode::Ok, name).with_error(reason),
                });
            }
        }
    }

    /// Path the interpreter should adopt: only for a single foreground stage
    /// that finished with `Ok`.
    pub(crate) fn path_update(&self, background: bool) -> Option<&str> {
        match (self.statuses.as_slice(), self.paths.as_slice()) {
            ([Some(status)], [Some(path)]) if !background && status.is_ok() => Some(path.as_str()),
            _ => None,
        }
    }

    pub(crate) fn into_statuses(self) -> Vec<Status> {
        self.statuses.into_iter().flatten().collect()
    }
}
