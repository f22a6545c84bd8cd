use crate::ast::{Command, CommandKind, Redirection, SimpleCommand};
use crate::lexer::Token;
use crate::parser::ParseError;

/// The command currently being assembled by the parser.
///
/// `Unstarted` means no token of the command has been seen. Once a token
/// arrives the command is `Building`: redirections alone keep it `Empty`,
/// the first word commits it to `Simple`, and compound commands are only
/// installed while still `Unstarted`.
#[derive(Debug, Default)]
pub(crate) enum PendingCommand {
    #[default]
    Unstarted,
    Building(Command),
}

impl PendingCommand {
    pub fn is_unstarted(&self) -> bool {
        matches!(self, PendingCommand::Unstarted)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, PendingCommand::Building(cmd) if cmd.kind.is_compound())
    }

    /// True when the next word would be the first word of a command, so
    /// reserved and closing words keep their meaning.
    pub fn at_command_word(&self) -> bool {
        self.is_unstarted() || self.is_compound()
    }

    /// Argument count of a simple command under construction.
    pub fn argv_len(&self) -> usize {
        match self {
            PendingCommand::Building(Command {
                kind: CommandKind::Simple(simple),
                ..
            }) => simple.argv.len(),
            _ => 0,
        }
    }

    fn command_mut(&mut self) -> &mut Command {
        if let PendingCommand::Unstarted = self {
            *self = PendingCommand::Building(Command::default());
        }
        match self {
            PendingCommand::Building(cmd) => cmd,
            PendingCommand::Unstarted => unreachable!("promoted above"),
        }
    }

    /// Records `token` as part of the command's source range.
    pub fn touch(&mut self, token: &Token) {
        let cmd = self.command_mut();
        if cmd.start_token.is_none() {
            cmd.start_token = Some(token.clone());
        }
        cmd.end_token = Some(token.clone());
    }

    /// Promotes an `Empty` command to `Simple` and hands it out.
    pub fn commit_as_simple(&mut self) -> Result<&mut SimpleCommand, ParseError> {
        let cmd = self.command_mut();
        if let CommandKind::Empty = cmd.kind {
            cmd.kind = CommandKind::Simple(SimpleCommand::default());
        }
        match &mut cmd.kind {
            CommandKind::Simple(simple) => Ok(simple),
            _ => Err(ParseError::Syntax(
                "compound commands cannot take arguments".to_string(),
            )),
        }
    }

    pub fn push_redirection(&mut self, redirection: Redirection) {
        self.command_mut().redirections.push(redirection);
    }

    /// Installs a fully parsed compound command.
    pub fn install(&mut self, kind: CommandKind, start: &Token, end: Option<&Token>) -> Result<(), ParseError> {
        if !self.is_unstarted() {
            return Err(ParseError::Syntax(format!(
                "'{}' must start a new command",
                start.lexeme
            )));
        }
        let mut cmd = Command::new(kind);
        cmd.start_token = Some(start.clone());
        cmd.end_token = end.cloned();
        *self = PendingCommand::Building(cmd);
        Ok(())
    }

    /// Replaces a one-word simple command with its function definition.
    pub fn replace_kind(&mut self, kind: CommandKind, end: Option<&Token>) {
        let cmd = self.command_mut();
        cmd.kind = kind;
        if let Some(end) = end {
            cmd.end_token = Some(end.clone());
        }
    }

    /// Takes the finished command, dropping commands that carry nothing.
    pub fn take(&mut self) -> Option<Command> {
        match std::mem::take(self) {
            PendingCommand::Unstarted => None,
            PendingCommand::Building(cmd) => {
                if matches!(cmd.kind, CommandKind::Empty) && cmd.redirections.is_empty() {
                    None
                } else {
                    Some(cmd)
                }
            }
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            PendingCommand::Unstarted => None,
            PendingCommand::Building(cmd) => Some(cmd),
        }
    }
}
