use std::io;

use nix::errno::Errno;
use thiserror::Error;

use crate::ast::CommandList;
use crate::environment::Environment;
use crate::expander::ExpandError;

/// How a command finished: with a status, or by asking the shell to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Code(i32),
    Exit(i32),
}

impl ExecOutcome {
    pub fn code(self) -> i32 {
        match self {
            ExecOutcome::Code(code) | ExecOutcome::Exit(code) => code,
        }
    }
}

pub type ExecStatus = Result<ExecOutcome, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}: command not found")]
    CommandNotFound(String),
    #[error("{target}: {source}")]
    Redirect { target: String, source: io::Error },
    #[error("{fd}: bad file descriptor")]
    BadFd { fd: i32, errno: Errno },
    #[error("{context}: {errno}")]
    Os { context: &'static str, errno: Errno },
    #[error("no such builtin command: {0}")]
    NoSuchBuiltin(String),
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExecError {
    pub fn os(context: &'static str) -> impl FnOnce(Errno) -> ExecError {
        move |errno| ExecError::Os { context, errno }
    }

    /// Value of `$?` after a command failed this way.
    pub fn status(&self) -> i32 {
        match self {
            ExecError::CommandNotFound(_) => 127,
            _ => 1,
        }
    }
}

pub trait Executor {
    fn exec(&mut self, list: &CommandList, env: &mut Environment) -> ExecStatus;
}
