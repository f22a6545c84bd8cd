use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::executor::ExecError;
use crate::lexer::LexError;
use crate::parser::ParseError;

/// Anything that can stop the shell from handling a piece of input.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("usage: {0}")]
    Usage(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_conversions_keep_the_message() {
        let err: ShellError = ParseError::Unsupported("here-documents").into();
        assert_matches!(err, ShellError::Parse(_));
        assert_eq!(err.to_string(), "here-documents are not supported");

        let err: ShellError = ExecError::CommandNotFound("nope".into()).into();
        assert_eq!(err.to_string(), "nope: command not found");
    }
}
