use super::{ExpandError, ExpandOptions, ExpansionContext, WordExpander};
use crate::ast::{Command, CommandKind, RedirectKind, Redirection};

/// Expands the words of one command in place, right before it runs.
///
/// Only a simple command's assignments and argv are touched here; nested
/// command lists of compound commands are expanded when they execute.
pub struct CommandExpander<'c, C: ExpansionContext + ?Sized> {
    ctx: &'c mut C,
}

impl<'c, C: ExpansionContext + ?Sized> CommandExpander<'c, C> {
    pub fn new(ctx: &'c mut C) -> Self {
        CommandExpander { ctx }
    }

    pub fn expand(&mut self, cmd: &mut Command) -> Result<(), ExpandError> {
        if let CommandKind::Simple(simple) = &mut cmd.kind {
            // `a=1 b=$a` sees the new `a`, whether or not a command follows
            let mut scope = AssignmentScope {
                inner: &mut *self.ctx,
                assigned: Vec::new(),
            };
            for assignment in &mut simple.assignments {
                let value =
                    WordExpander::new(&mut scope, ExpandOptions::assignment()).expand_joined(&assignment.value)?;
                scope.assigned.push((assignment.name.clone(), value.clone()));
                assignment.value = value;
            }
        }

        self.expand_redirections(&mut cmd.redirections)?;

        if let CommandKind::Simple(simple) = &mut cmd.kind {
            let mut expander = WordExpander::new(&mut *self.ctx, ExpandOptions::argv());
            let words = std::mem::take(&mut simple.argv);
            for word in &words {
                let fields = expander.expand(word)?;
                simple.argv.extend(fields);
            }
        }
        Ok(())
    }

    pub fn expand_redirections(&mut self, redirections: &mut [Redirection]) -> Result<(), ExpandError> {
        let mut expander = WordExpander::new(&mut *self.ctx, ExpandOptions::redirection());
        for redirection in redirections {
            if let RedirectKind::Rewiring { .. } = redirection.kind {
                continue;
            }
            redirection.target = expander.expand_single(&redirection.target)?;
        }
        Ok(())
    }
}

/// The context seen by assignment values: earlier assignments of the same
/// command shadow the shell's variables without being set yet.
struct AssignmentScope<'s, C: ExpansionContext + ?Sized> {
    inner: &'s mut C,
    assigned: Vec<(String, String)>,
}

impl<C: ExpansionContext + ?Sized> ExpansionContext for AssignmentScope<'_, C> {
    fn get_variable(&self, name: &str) -> Option<String> {
        match self.assigned.iter().rev().find(|(n, _)| n == name) {
            Some((_, value)) => Some(value.clone()),
            None => self.inner.get_variable(name),
        }
    }

    fn positional_params(&self) -> Vec<String> {
        self.inner.positional_params()
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.assigned.push((name.to_string(), value.to_string()));
        self.inner.set_variable(name, value);
    }

    fn command_substitution(&mut self, program: &str) -> Result<String, ExpandError> {
        self.inner.command_substitution(program)
    }

    fn home_dir_of(&self, user: &str) -> Option<String> {
        self.inner.home_dir_of(user)
    }
}
