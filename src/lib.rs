pub mod ast;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod expander;
pub mod lexer;
pub mod parser;
pub mod prompt;

use environment::Environment;
use executor::{DefaultExecutor, ExecOutcome};

/// Tokenizes, parses and runs `input` against `env`.
///
/// Syntax errors are printed as `Syntax error: ...` and leave `$?` at 1.
/// `ExecOutcome::Exit` means the text ran `exit` and the caller should stop.
pub fn run_from_string(input: &str, env: &mut Environment) -> ExecOutcome {
    DefaultExecutor::new().run_string(input, env)
}
