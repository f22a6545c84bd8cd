pub mod default;
mod pending;

use thiserror::Error;

use crate::ast::CommandList;
use crate::lexer::Token;

pub use default::DefaultParser;

pub trait Parser {
    fn parse(&mut self) -> Result<CommandList, ParseError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(String),
    #[error("{0} are not supported")]
    Unsupported(&'static str),
}

/// Parses a complete token sequence into a command list.
pub fn parse(tokens: &[Token]) -> Result<CommandList, ParseError> {
    DefaultParser::new(tokens).parse()
}
