use std::os::fd::{AsRawFd, OwnedFd};

use log::debug;
use nix::unistd::pipe;

use super::executor::ExecError;
use super::process;
use crate::ast::{Command, Redirection};
use crate::environment::Environment;

pub struct PipelineHandler;

impl PipelineHandler {
    /// Runs every command of a multi-command pipeline in its own child,
    /// stdout of each wired to stdin of the next, and waits for all of
    /// them. The status is the last command's.
    ///
    /// `run_stage` runs inside the child. It receives the command with the
    /// pipe rewirings prepended to its redirections and the raw pipe ends
    /// listed in `pipe_fds`, which it must close after applying them.
    pub fn run<F>(commands: &[Command], env: &mut Environment, mut run_stage: F) -> Result<i32, ExecError>
    where
        F: FnMut(&Command, &mut Environment) -> i32,
    {
        debug!("running a pipeline of {} commands", commands.len());
        let mut children = Vec::with_capacity(commands.len());
        let mut input: Option<OwnedFd> = None;
        let mut failure = None;

        for (i, command) in commands.iter().enumerate() {
            let output = if i + 1 < commands.len() {
                match pipe() {
                    Ok(ends) => Some(ends),
                    Err(errno) => {
                        failure = Some(ExecError::Os { context: "pipe", errno });
                        break;
                    }
                }
            } else {
                None
            };

            let stage = Self::wire(command, input.as_ref(), output.as_ref());
            match process::run_in_child(env, |env| run_stage(&stage, env)) {
                Ok(pid) => children.push(pid),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }

            // the parent keeps only the read end the next stage needs
            input = output.map(|(read_end, _write_end)| read_end);
        }
        drop(input);

        let mut status = 0;
        for pid in children {
            status = process::wait_for(pid)?;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(status),
        }
    }

    fn wire(command: &Command, input: Option<&OwnedFd>, output: Option<&(OwnedFd, OwnedFd)>) -> Command {
        let mut stage = command.clone();
        let mut rewirings = Vec::with_capacity(2);
        if let Some(read_end) = input {
            rewirings.push(Redirection::rewiring(libc::STDIN_FILENO, read_end.as_raw_fd()));
            stage.pipe_fds.push(read_end.as_raw_fd());
        }
        if let Some((read_end, write_end)) = output {
            rewirings.push(Redirection::rewiring(libc::STDOUT_FILENO, write_end.as_raw_fd()));
            stage.pipe_fds.push(write_end.as_raw_fd());
            stage.pipe_fds.push(read_end.as_raw_fd());
        }
        stage.redirections.splice(0..0, rewirings);
        stage
    }
}
