use std::collections::HashMap;

use super::commands::{
    CdCommand, ColonCommand, EchoCommand, ExitCommand, ExportCommand, FalseCommand, HelpCommand,
    ReadCommand, SourceCommand, TrueCommand,
};
use crate::environment::Environment;
use crate::executor::{ExecError, ExecStatus};

/// A command that runs inside the shell process.
///
/// `args` excludes the command name. Output goes to the shell's own
/// descriptors, which the executor has already redirected.
pub trait BuiltinCommand {
    fn name(&self) -> &'static str;
    fn run(&self, args: &[String], env: &mut Environment) -> ExecStatus;
}

pub struct BuiltinManager {
    commands: HashMap<String, Box<dyn BuiltinCommand>>,
}

impl Default for BuiltinManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinManager {
    pub fn new() -> Self {
        let mut mgr = BuiltinManager {
            commands: HashMap::new(),
        };
        mgr.register(Box::new(ColonCommand));
        mgr.register(Box::new(TrueCommand));
        mgr.register(Box::new(FalseCommand));
        mgr.register(Box::new(EchoCommand));
        mgr.register(Box::new(CdCommand));
        mgr.register(Box::new(ReadCommand));
        mgr.register(Box::new(SourceCommand::named("source")));
        mgr.register(Box::new(SourceCommand::named(".")));
        mgr.register(Box::new(ExportCommand));
        mgr.register(Box::new(ExitCommand));
        mgr.register(Box::new(HelpCommand));
        mgr
    }

    pub fn register(&mut self, cmd: Box<dyn BuiltinCommand>) {
        self.commands.insert(cmd.name().to_string(), cmd);
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn execute(&self, name: &str, args: &[String], env: &mut Environment) -> ExecStatus {
        match self.commands.get(name) {
            Some(cmd) => cmd.run(args, env),
            None => Err(ExecError::NoSuchBuiltin(name.to_string())),
        }
    }
}
