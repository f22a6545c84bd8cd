mod command;
mod pathname;
mod tilde;
mod word;

use thiserror::Error;

use crate::lexer::LexError;

pub use command::CommandExpander;
pub use word::{ExpandOptions, PathnameExpansion, WordExpander};

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("{0}: ambiguous redirect")]
    AmbiguousRedirect(String),
    #[error("{0}: bad substitution")]
    BadSubstitution(String),
    #[error("{name}: {message}")]
    ParameterError { name: String, message: String },
    #[error("arithmetic expansion is not supported")]
    ArithmeticUnsupported,
    #[error("command substitution: {0}")]
    CommandSubstitution(String),
    #[error(transparent)]
    Lex(#[from] LexError),
}

/// What word expansion needs from the running shell.
pub trait ExpansionContext {
    fn get_variable(&self, name: &str) -> Option<String>;

    fn positional_params(&self) -> Vec<String>;

    fn set_variable(&mut self, name: &str, value: &str);

    /// Runs `program` and returns everything it wrote to standard output.
    fn command_substitution(&mut self, program: &str) -> Result<String, ExpandError>;

    fn home_dir_of(&self, user: &str) -> Option<String> {
        tilde::home_dir_of(user)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use super::{ExpandError, ExpansionContext};

    /// In-memory context: substitutions echo back canned output.
    #[derive(Debug, Default)]
    pub struct FakeContext {
        pub vars: HashMap<String, String>,
        pub params: Vec<String>,
        pub outputs: HashMap<String, String>,
        pub programs_run: Vec<String>,
    }

    impl FakeContext {
        pub fn with_vars(vars: &[(&str, &str)]) -> Self {
            FakeContext {
                vars: vars
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl ExpansionContext for FakeContext {
        fn get_variable(&self, name: &str) -> Option<String> {
            match name {
                "@" | "*" => Some(self.params.join(" ")),
                "#" => Some(self.params.len().to_string()),
                _ => match name.parse::<usize>() {
                    Ok(n) if n > 0 => self.params.get(n - 1).cloned(),
                    _ => self.vars.get(name).cloned(),
                },
            }
        }

        fn positional_params(&self) -> Vec<String> {
            self.params.clone()
        }

        fn set_variable(&mut self, name: &str, value: &str) {
            self.vars.insert(name.to_string(), value.to_string());
        }

        fn command_substitution(&mut self, program: &str) -> Result<String, ExpandError> {
            self.programs_run.push(program.to_string());
            self.outputs
                .get(program)
                .cloned()
                .ok_or_else(|| ExpandError::CommandSubstitution(format!("no output for '{program}'")))
        }

        fn home_dir_of(&self, user: &str) -> Option<String> {
            (user == "alice").then(|| "/home/alice".to_string())
        }
    }
}
