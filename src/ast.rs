use std::os::fd::RawFd;
use std::rc::Rc;

use crate::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    FileWrite,
    FileWriteAppend,
    FileRead,
    /// `fd>&source_fd`: `fd` becomes a duplicate of `source_fd`.
    Rewiring { source_fd: RawFd },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub kind: RedirectKind,
    pub fd: RawFd,
    pub target: String, // unexpanded until the command expander runs
    pub token: Option<Token>,
}

impl Redirection {
    pub fn rewiring(fd: RawFd, source_fd: RawFd) -> Self {
        Redirection {
            kind: RedirectKind::Rewiring { source_fd },
            fd,
            target: String::new(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableAssignment {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleCommand {
    pub assignments: Vec<VariableAssignment>,
    pub argv: Vec<String>,
    pub argv_tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IfCommand {
    pub condition: CommandList,
    pub then: CommandList,
    pub elif: Vec<(CommandList, CommandList)>,
    pub opt_else: Option<CommandList>,
}

/// Shared by `while` and `until`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopCommand {
    pub condition: CommandList,
    pub body: CommandList,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForCommand {
    pub var_name: String,
    pub items: Vec<String>,
    pub item_tokens: Vec<Token>,
    pub body: CommandList,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Empty,
    Simple(SimpleCommand),
    BraceGroup(CommandList),
    If(IfCommand),
    While(LoopCommand),
    Until(LoopCommand),
    For(ForCommand),
    FunctionDefinition { name: String, body: Rc<CommandList> },
}

impl CommandKind {
    /// Short name used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            CommandKind::Empty => "empty command",
            CommandKind::Simple(_) => "simple command",
            CommandKind::BraceGroup(_) => "brace group",
            CommandKind::If(_) => "if",
            CommandKind::While(_) => "while",
            CommandKind::Until(_) => "until",
            CommandKind::For(_) => "for",
            CommandKind::FunctionDefinition { .. } => "function definition",
        }
    }

    pub fn is_compound(&self) -> bool {
        !matches!(self, CommandKind::Empty | CommandKind::Simple(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub kind: CommandKind,
    pub redirections: Vec<Redirection>,
    /// Pipe ends a forked child must close once its own rewiring is in place.
    pub pipe_fds: Vec<RawFd>,
    pub start_token: Option<Token>,
    pub end_token: Option<Token>,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Command {
            kind,
            ..Default::default()
        }
    }

    pub fn simple(argv: &[&str]) -> Self {
        Command::new(CommandKind::Simple(SimpleCommand {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }))
    }

    pub fn as_simple(&self) -> Option<&SimpleCommand> {
        match &self.kind {
            CommandKind::Simple(simple) => Some(simple),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOrOp {
    And,
    Or,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AndOrList {
    pub items: Vec<(Pipeline, AndOrOp)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Semicolon,
    Ampersand,
    Newline,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandList {
    pub items: Vec<(AndOrList, Separator)>,
}

impl CommandList {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
