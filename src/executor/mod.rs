mod builtin;
mod default_executor;
mod executor;
mod path_resolver;
mod pipeline;
mod process;
mod redirect;

use std::fmt::Display;
use std::io::{self, Write};

pub use builtin::{BuiltinCommand, BuiltinManager};
pub use default_executor::DefaultExecutor;
pub use executor::{ExecError, ExecOutcome, ExecStatus, Executor};
pub use path_resolver::PathResolver;
pub use process::ignore_interactive_signals;

/// Prints a command failure the way every part of the shell does.
///
/// Goes straight to fd 2, so a child that redirected it reports there.
pub(crate) fn report(err: &dyn Display) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "{}: {err}", env!("CARGO_PKG_NAME"));
    let _ = stderr.flush();
}
