use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use log::{trace, warn};
use nix::errno::Errno;
use nix::unistd::{close, dup2};

use super::executor::ExecError;
use super::process::flush_std_streams;
use crate::ast::{RedirectKind, Redirection};
use crate::environment::{Environment, SavedFd};

/// Saved descriptors live at or above this number, out of the way of
/// anything a script names.
const SAVED_FD_MIN: RawFd = 10;

/// Where a redirected descriptor gets its new contents from.
enum Source {
    Fd(RawFd),
    File(File),
}

pub struct RedirectHandler;

impl RedirectHandler {
    /// Applies `redirections` for good. Used in forked children, which
    /// never need the old descriptors back.
    pub fn apply(redirections: &[Redirection]) -> Result<(), ExecError> {
        for redirection in redirections {
            let source = Self::open_source(redirection)?;
            Self::install(source, redirection.fd)?;
        }
        Ok(())
    }

    /// Runs `f` with `redirections` in effect, then puts every affected
    /// descriptor back, whatever `f` returned.
    pub fn with_redirections<T, F>(
        redirections: &[Redirection],
        env: &mut Environment,
        f: F,
    ) -> Result<T, ExecError>
    where
        F: FnOnce(&mut Environment) -> Result<T, ExecError>,
    {
        if redirections.is_empty() {
            return f(env);
        }
        let depth = env.saved_fds.len();
        if let Err(e) = Self::save_and_apply(redirections, env) {
            Self::restore_to(env, depth);
            return Err(e);
        }
        let result = f(env);
        Self::restore_to(env, depth);
        result
    }

    /// Creates or opens every file target without keeping it open, as
    /// `> file` with no command does.
    pub fn touch(redirections: &[Redirection]) -> Result<(), ExecError> {
        for redirection in redirections {
            Self::open_source(redirection)?;
        }
        Ok(())
    }

    fn save_and_apply(redirections: &[Redirection], env: &mut Environment) -> Result<(), ExecError> {
        for redirection in redirections {
            if let RedirectKind::Rewiring { source_fd } = redirection.kind {
                if source_fd == redirection.fd {
                    continue;
                }
            }
            // the target is opened before the descriptor it replaces is
            // moved away, so `> /dev/stdout` still sees the old stdout
            let source = Self::open_source(redirection)?;
            flush_std_streams();
            match &source {
                // the file landed on the closed descriptor itself
                Source::File(file) if file.as_raw_fd() == redirection.fd => {
                    trace!("fd {} was closed", redirection.fd);
                    env.saved_fds.push(SavedFd { fd: redirection.fd, saved: None });
                }
                _ => Self::save(redirection.fd, env)?,
            }
            Self::install(source, redirection.fd)?;
        }
        Ok(())
    }

    fn open_source(redirection: &Redirection) -> Result<Source, ExecError> {
        let mut options = OpenOptions::new();
        match redirection.kind {
            RedirectKind::Rewiring { source_fd } => return Ok(Source::Fd(source_fd)),
            RedirectKind::FileRead => options.read(true),
            RedirectKind::FileWrite => options.write(true).create(true).truncate(true),
            RedirectKind::FileWriteAppend => options.append(true).create(true),
        };
        options
            .open(&redirection.target)
            .map(Source::File)
            .map_err(|source| ExecError::Redirect {
                target: redirection.target.clone(),
                source,
            })
    }

    fn install(source: Source, fd: RawFd) -> Result<(), ExecError> {
        match source {
            Source::Fd(source_fd) if source_fd == fd => Ok(()),
            Source::Fd(source_fd) => dup2(source_fd, fd)
                .map(drop)
                .map_err(|errno| ExecError::BadFd { fd: source_fd, errno }),
            Source::File(file) if file.as_raw_fd() == fd => {
                // opened straight onto a closed descriptor; keep it across exec
                let raw = file.into_raw_fd();
                // SAFETY: `raw` is open and owned by nobody else now.
                if unsafe { libc::fcntl(raw, libc::F_SETFD, 0) } == -1 {
                    return Err(ExecError::Os { context: "fcntl", errno: Errno::last() });
                }
                Ok(())
            }
            Source::File(file) => dup2(file.as_raw_fd(), fd)
                .map(drop)
                .map_err(ExecError::os("dup2")),
        }
    }

    fn save(fd: RawFd, env: &mut Environment) -> Result<(), ExecError> {
        // SAFETY: F_DUPFD_CLOEXEC only reads `fd`; an invalid one is EBADF.
        let copy = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, SAVED_FD_MIN) };
        let saved = if copy == -1 {
            match Errno::last() {
                Errno::EBADF => None,
                errno => return Err(ExecError::Os { context: "fcntl", errno }),
            }
        } else {
            // SAFETY: `copy` is a fresh descriptor nothing else owns.
            Some(unsafe { OwnedFd::from_raw_fd(copy) })
        };
        trace!("saved fd {fd} as {:?}", saved.as_ref().map(AsRawFd::as_raw_fd));
        env.saved_fds.push(SavedFd { fd, saved });
        Ok(())
    }

    fn restore_to(env: &mut Environment, depth: usize) {
        flush_std_streams();
        while env.saved_fds.len() > depth {
            let Some(SavedFd { fd, saved }) = env.saved_fds.pop() else {
                break;
            };
            trace!("restoring fd {fd}");
            match saved {
                Some(saved) => {
                    if let Err(errno) = dup2(saved.as_raw_fd(), fd) {
                        warn!("restoring fd {fd} failed: {errno}");
                    }
                }
                None => {
                    let _ = close(fd);
                }
            }
        }
    }
}
