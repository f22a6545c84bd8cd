use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, execve, fork, pipe};

use super::executor::ExecError;
use super::report;
use crate::environment::Environment;

const INTERACTIVE_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGQUIT];

pub fn flush_std_streams() {
    // nothing useful can be done about a failed flush here
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Forks; the child runs `f` on its copy of `env` and exits with the
/// returned status. The parent gets the child's pid.
pub fn run_in_child<F>(env: &mut Environment, f: F) -> Result<Pid, ExecError>
where
    F: FnOnce(&mut Environment) -> i32,
{
    flush_std_streams();
    // SAFETY: the shell is single threaded; the child only runs shell code
    // and leaves through `exit`.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            trace!("forked child {child}");
            Ok(child)
        }
        Ok(ForkResult::Child) => {
            reset_signals();
            let code = f(env);
            flush_std_streams();
            std::process::exit(code)
        }
        Err(errno) => Err(ExecError::Os { context: "fork", errno }),
    }
}

/// Runs `f` in a child whose standard output is captured, and returns
/// the captured text and the child's status.
pub fn capture_output<F>(env: &mut Environment, f: F) -> Result<(String, i32), ExecError>
where
    F: FnOnce(&mut Environment) -> i32,
{
    let (read_end, write_end) = pipe().map_err(ExecError::os("pipe"))?;
    let pid = run_in_child(env, |env| {
        if let Err(errno) = dup2(write_end.as_raw_fd(), libc::STDOUT_FILENO) {
            report(&format_args!("dup2: {errno}"));
            return 1;
        }
        close_fds(&[read_end.as_raw_fd(), write_end.as_raw_fd()]);
        f(env)
    })?;
    drop(write_end);

    let mut output = Vec::new();
    let read_result = File::from(read_end).read_to_end(&mut output);
    let status = wait_for(pid)?;
    read_result?;
    Ok((String::from_utf8_lossy(&output).into_owned(), status))
}

/// Waits for `pid` to terminate. A child killed by a signal reports
/// `128 + signal`.
pub fn wait_for(pid: Pid) -> Result<i32, ExecError> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                trace!("child {pid} exited with {code}");
                return Ok(code);
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                debug!("child {pid} killed by {signal}");
                return Ok(128 + signal as i32);
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(errno) => return Err(ExecError::Os { context: "waitpid", errno }),
        }
    }
}

/// Collects background children that have finished, without blocking.
pub fn reap_background(env: &mut Environment) {
    env.background_jobs_mut().retain(|&pid| {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => true,
            Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => {
                debug!("background job {pid} finished");
                false
            }
            Ok(_) => true,
            Err(errno) => {
                warn!("waiting for background job {pid} failed: {errno}");
                false
            }
        }
    });
}

/// Replaces the current process with `path`. Only returns on failure,
/// with the status the failed command should report.
pub fn exec_program(path: &Path, argv: &[String], vars: &[(String, String)]) -> i32 {
    let name = argv.first().map(String::as_str).unwrap_or_default();
    let program = CString::new(path.as_os_str().as_bytes());
    let args: Result<Vec<CString>, _> = argv.iter().map(|arg| CString::new(arg.as_bytes())).collect();
    let envp: Result<Vec<CString>, _> = vars
        .iter()
        .map(|(k, v)| CString::new(format!("{k}={v}")))
        .collect();
    let (Ok(program), Ok(args), Ok(envp)) = (program, args, envp) else {
        report(&format_args!("{name}: argument contains a NUL byte"));
        return 126;
    };

    debug!("exec {}", path.display());
    flush_std_streams();
    let errno = match execve(&program, &args, &envp) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    report(&format_args!("{name}: {}", errno.desc()));
    match errno {
        Errno::ENOENT => 127,
        _ => 126,
    }
}

/// The environment a program started from `env` sees: exported variables
/// overlaid with the command's own assignments.
pub fn environment_for(env: &Environment, assignments: &[(String, String)]) -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = env
        .exported_vars()
        .into_iter()
        .filter(|(name, _)| !assignments.iter().any(|(n, _)| n == name))
        .collect();
    vars.extend(assignments.iter().cloned());
    vars
}

pub fn close_fds(fds: &[RawFd]) {
    for &fd in fds {
        if let Err(errno) = close(fd) {
            trace!("closing fd {fd}: {errno}");
        }
    }
}

/// An interactive shell survives ^C and ^\; its children do not.
pub fn ignore_interactive_signals() {
    for sig in INTERACTIVE_SIGNALS {
        // SAFETY: SigIgn installs no handler code.
        if let Err(errno) = unsafe { signal(sig, SigHandler::SigIgn) } {
            warn!("ignoring {sig} failed: {errno}");
        }
    }
}

fn reset_signals() {
    for sig in INTERACTIVE_SIGNALS {
        // SAFETY: SigDfl installs no handler code.
        let _ = unsafe { signal(sig, SigHandler::SigDfl) };
    }
}
