use crate::command::Command;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} - command with that name already exists")]
    AlreadyRegistered(String),
}

/// Registered command prototypes and exit keywords, in registration order.
#[derive(Default)]
pub struct Registry {
    exits: Vec<String>,
    commands: Vec<Box<dyn Command>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a keyword that ends the interactive session.
    pub fn register_exit(&mut self, name: impl Into<String>) -> Result<(), RegistryError> {
        let name = name.into();
        if self.is_exit(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        tracing::debug!(keyword = %name, "registered exit keyword");
        self.exits.push(name);
        Ok(())
    }

    /// Stores `command` as the prototype for its name.
    pub fn register(&mut self, command: Box<dyn Command>) -> Result<(), RegistryError> {
        if self.lookup(command.name()).is_some() {
            return Err(RegistryError::AlreadyRegistered(command.name().to_string()));
        }
        tracing::debug!(command = command.name(), "registered command");
        self.commands.push(command);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn is_exit(&self, name: &str) -> bool {
        self.exits.iter().any(|e| e == name)
    }

    /// Command names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name())
    }

    pub fn exit_keywords(&self) -> impl Iterator<Item = &str> {
        self.exits.iter().map(String::as_str)
    }
}
