use std::rc::Rc;

use log::{debug, trace};

use super::builtin::BuiltinManager;
use super::executor::{ExecError, ExecOutcome, ExecStatus, Executor};
use super::path_resolver::PathResolver;
use super::pipeline::PipelineHandler;
use super::process;
use super::redirect::RedirectHandler;
use super::report;
use crate::ast::{
    AndOrList, AndOrOp, CommandKind, CommandList, Command, ForCommand, IfCommand, LoopCommand,
    Pipeline, Redirection, Separator, VariableAssignment,
};
use crate::environment::Environment;
use crate::error::ShellError;
use crate::expander::{CommandExpander, ExpandError, ExpandOptions, ExpansionContext, WordExpander};
use crate::lexer::tokenize;
use crate::parser::parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// In the shell process itself; redirections are undone afterwards.
    Shell,
    /// In a forked child that exits once the command is done.
    Subshell,
}

/// Tree-walking interpreter for parsed command lists.
///
/// Builtins, functions and compound commands run in the shell process so
/// they can change its state, unless they are a stage of a multi-command
/// pipeline; programs always run in a child.
pub struct DefaultExecutor {
    builtins: BuiltinManager,
    path_resolver: PathResolver,
}

impl Default for DefaultExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for DefaultExecutor {
    fn exec(&mut self, list: &CommandList, env: &mut Environment) -> ExecStatus {
        self.run_list(list, env)
    }
}

pub(crate) fn parse_program(input: &str) -> Result<CommandList, ShellError> {
    let tokens = tokenize(input)?;
    Ok(parse(&tokens)?)
}

impl DefaultExecutor {
    pub fn new() -> Self {
        Self::with_builtins(BuiltinManager::new())
    }

    pub fn with_builtins(builtins: BuiltinManager) -> Self {
        DefaultExecutor {
            builtins,
            path_resolver: PathResolver,
        }
    }

    /// Tokenizes, parses and runs `input`. A syntax error is reported on
    /// stderr and sets `$?` to 1.
    pub fn run_string(&mut self, input: &str, env: &mut Environment) -> ExecOutcome {
        process::reap_background(env);
        let list = match parse_program(input) {
            Ok(list) => list,
            Err(e) => {
                eprintln!("Syntax error: {e}");
                env.set_last_status(1);
                return ExecOutcome::Code(1);
            }
        };
        match self.exec(&list, env) {
            Ok(outcome) => outcome,
            Err(e) => {
                report(&e);
                env.set_last_status(e.status());
                ExecOutcome::Code(e.status())
            }
        }
    }

    fn run_list(&mut self, list: &CommandList, env: &mut Environment) -> ExecStatus {
        for (and_or, separator) in &list.items {
            let outcome = match separator {
                Separator::Ampersand => self.run_background(and_or, env),
                Separator::Semicolon | Separator::Newline | Separator::End => self.run_and_or(and_or, env)?,
            };
            if let ExecOutcome::Exit(_) = outcome {
                return Ok(outcome);
            }
        }
        Ok(ExecOutcome::Code(env.last_status()))
    }

    fn run_background(&mut self, and_or: &AndOrList, env: &mut Environment) -> ExecOutcome {
        let child = process::run_in_child(env, |env| match self.run_and_or(and_or, env) {
            Ok(outcome) => outcome.code(),
            Err(e) => {
                report(&e);
                e.status()
            }
        });
        let status = match child {
            Ok(pid) => {
                debug!("started background job {pid}");
                env.record_background(pid);
                0
            }
            Err(e) => {
                report(&e);
                e.status()
            }
        };
        env.set_last_status(status);
        ExecOutcome::Code(status)
    }

    fn run_and_or(&mut self, and_or: &AndOrList, env: &mut Environment) -> ExecStatus {
        let mut previous = AndOrOp::End;
        for (pipeline, op) in &and_or.items {
            let run = match previous {
                AndOrOp::And => env.last_status() == 0,
                AndOrOp::Or => env.last_status() != 0,
                AndOrOp::End => true,
            };
            if run {
                let outcome = self.run_pipeline(pipeline, env)?;
                if let ExecOutcome::Exit(_) = outcome {
                    return Ok(outcome);
                }
            }
            previous = *op;
        }
        Ok(ExecOutcome::Code(env.last_status()))
    }

    fn run_pipeline(&mut self, pipeline: &Pipeline, env: &mut Environment) -> ExecStatus {
        let result = match pipeline.commands.as_slice() {
            [] => Ok(ExecOutcome::Code(0)),
            [command] => self.run_command(command, env, Placement::Shell),
            commands => {
                PipelineHandler::run(commands, env, |stage, env| self.run_stage(stage, env)).map(ExecOutcome::Code)
            }
        };
        let status = match result {
            Ok(ExecOutcome::Exit(code)) => return Ok(ExecOutcome::Exit(code)),
            Ok(ExecOutcome::Code(code)) => code,
            Err(e) => {
                report(&e);
                e.status()
            }
        };
        let status = if pipeline.negated { i32::from(status == 0) } else { status };
        env.set_last_status(status);
        Ok(ExecOutcome::Code(status))
    }

    /// One stage of a pipeline, inside its forked child.
    fn run_stage(&mut self, stage: &Command, env: &mut Environment) -> i32 {
        match self.run_command(stage, env, Placement::Subshell) {
            Ok(outcome) => outcome.code(),
            Err(e) => {
                report(&e);
                e.status()
            }
        }
    }

    fn run_command(&mut self, command: &Command, env: &mut Environment, placement: Placement) -> ExecStatus {
        let mut command = command.clone();
        if let CommandKind::Simple(simple) = &command.kind {
            // `a=$(false)` leaves 1 in `$?`, `false; a=b` leaves 0
            if simple.argv.is_empty() {
                env.set_last_status(0);
            }
        }
        CommandExpander::new(&mut ShellContext { executor: self, env }).expand(&mut command)?;

        let redirections: &[Redirection] = match placement {
            Placement::Shell => &command.redirections,
            Placement::Subshell => {
                RedirectHandler::apply(&command.redirections)?;
                process::close_fds(&command.pipe_fds);
                &[]
            }
        };

        match &command.kind {
            CommandKind::Empty => {
                RedirectHandler::touch(redirections)?;
                Ok(ExecOutcome::Code(0))
            }
            CommandKind::Simple(simple) => match simple.argv.split_first() {
                None => self.assign(&simple.assignments, redirections, env),
                Some((name, args)) => self.run_simple(name, args, &simple.assignments, redirections, env, placement),
            },
            CommandKind::FunctionDefinition { name, body } => {
                debug!("defining function {name}");
                env.define_function(name, Rc::clone(body));
                Ok(ExecOutcome::Code(0))
            }
            CommandKind::BraceGroup(list) => {
                RedirectHandler::with_redirections(redirections, env, |env| self.run_list(list, env))
            }
            CommandKind::If(cmd) => RedirectHandler::with_redirections(redirections, env, |env| self.run_if(cmd, env)),
            CommandKind::While(cmd) => {
                RedirectHandler::with_redirections(redirections, env, |env| self.run_loop(cmd, false, env))
            }
            CommandKind::Until(cmd) => {
                RedirectHandler::with_redirections(redirections, env, |env| self.run_loop(cmd, true, env))
            }
            CommandKind::For(cmd) => RedirectHandler::with_redirections(redirections, env, |env| self.run_for(cmd, env)),
        }
    }

    /// `a=b` with no command name: the assignments stick.
    fn assign(
        &mut self,
        assignments: &[VariableAssignment],
        redirections: &[Redirection],
        env: &mut Environment,
    ) -> ExecStatus {
        for assignment in assignments {
            trace!("setting {}", assignment.name);
            env.set(&assignment.name, &assignment.value);
        }
        RedirectHandler::touch(redirections)?;
        Ok(ExecOutcome::Code(env.last_status()))
    }

    fn run_simple(
        &mut self,
        name: &str,
        args: &[String],
        assignments: &[VariableAssignment],
        redirections: &[Redirection],
        env: &mut Environment,
        placement: Placement,
    ) -> ExecStatus {
        let assignments: Vec<(String, String)> = assignments
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect();

        if let Some(body) = env.function(name) {
            debug!("calling function {name}");
            let params = args.to_vec();
            return RedirectHandler::with_redirections(redirections, env, |env| {
                env.with_temporary_vars(&assignments, |env| {
                    env.with_positional(params, |env| self.run_list(&body, env))
                })
            });
        }

        if self.builtins.is_builtin(name) {
            trace!("running builtin {name}");
            let builtins = &self.builtins;
            return RedirectHandler::with_redirections(redirections, env, |env| {
                env.with_temporary_vars(&assignments, |env| builtins.execute(name, args, env))
            });
        }

        // a missing program is reported by the child, after its redirections
        let path = self.path_resolver.resolve(name, env.get_variable("PATH").as_deref());
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(name.to_string());
        argv.extend_from_slice(args);
        let vars = process::environment_for(env, &assignments);
        let launch = || match &path {
            Some(path) => process::exec_program(path, &argv, &vars),
            None => {
                let e = ExecError::CommandNotFound(name.to_string());
                report(&e);
                e.status()
            }
        };

        match placement {
            Placement::Subshell => Ok(ExecOutcome::Code(launch())),
            Placement::Shell => {
                let pid = process::run_in_child(env, |_| match RedirectHandler::apply(redirections) {
                    Ok(()) => launch(),
                    Err(e) => {
                        report(&e);
                        e.status()
                    }
                })?;
                Ok(ExecOutcome::Code(process::wait_for(pid)?))
            }
        }
    }

    fn run_if(&mut self, cmd: &IfCommand, env: &mut Environment) -> ExecStatus {
        let branches = std::iter::once((&cmd.condition, &cmd.then)).chain(cmd.elif.iter().map(|(c, t)| (c, t)));
        for (condition, body) in branches {
            // the condition starts from a clean `$?`, and a failed one does
            // not leak into the status of the whole command
            env.set_last_status(0);
            let outcome = self.run_list(condition, env)?;
            if let ExecOutcome::Exit(_) = outcome {
                return Ok(outcome);
            }
            let passed = env.last_status() == 0;
            env.set_last_status(0);
            if passed {
                return self.run_list(body, env);
            }
        }
        match &cmd.opt_else {
            Some(body) => self.run_list(body, env),
            None => Ok(ExecOutcome::Code(0)),
        }
    }

    /// `while` stops at the first failing condition, `until` at the first
    /// succeeding one. The status is the last body's, or 0.
    fn run_loop(&mut self, cmd: &LoopCommand, stop_on_success: bool, env: &mut Environment) -> ExecStatus {
        let mut status = 0;
        loop {
            env.set_last_status(0);
            let outcome = self.run_list(&cmd.condition, env)?;
            if let ExecOutcome::Exit(_) = outcome {
                return Ok(outcome);
            }
            if (env.last_status() == 0) == stop_on_success {
                break;
            }
            env.set_last_status(0);
            let outcome = self.run_list(&cmd.body, env)?;
            if let ExecOutcome::Exit(_) = outcome {
                return Ok(outcome);
            }
            status = env.last_status();
        }
        env.set_last_status(status);
        Ok(ExecOutcome::Code(status))
    }

    fn run_for(&mut self, cmd: &ForCommand, env: &mut Environment) -> ExecStatus {
        let mut items = Vec::new();
        {
            let mut ctx = ShellContext { executor: self, env };
            let mut expander = WordExpander::new(&mut ctx, ExpandOptions::argv());
            for word in &cmd.items {
                items.extend(expander.expand(word)?);
            }
        }

        // the loop variable keeps its last value afterwards
        let mut status = 0;
        for item in items {
            env.set(&cmd.var_name, &item);
            let outcome = self.run_list(&cmd.body, env)?;
            if let ExecOutcome::Exit(_) = outcome {
                return Ok(outcome);
            }
            status = env.last_status();
        }
        env.set_last_status(status);
        Ok(ExecOutcome::Code(status))
    }

    /// Runs `program` in a child and returns what it printed. `$?` becomes
    /// the child's status.
    fn substitute(&mut self, program: &str, env: &mut Environment) -> Result<String, ExpandError> {
        let list = parse_program(program).map_err(|e| ExpandError::CommandSubstitution(e.to_string()))?;
        let (output, status) = process::capture_output(env, |env| match self.run_list(&list, env) {
            Ok(outcome) => outcome.code(),
            Err(e) => {
                report(&e);
                e.status()
            }
        })
        .map_err(|e| ExpandError::CommandSubstitution(e.to_string()))?;
        env.set_last_status(status);
        Ok(output)
    }
}

/// The running shell as seen by word expansion.
struct ShellContext<'a> {
    executor: &'a mut DefaultExecutor,
    env: &'a mut Environment,
}

impl ExpansionContext for ShellContext<'_> {
    fn get_variable(&self, name: &str) -> Option<String> {
        self.env.get_variable(name)
    }

    fn positional_params(&self) -> Vec<String> {
        self.env.positional().to_vec()
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.env.set(name, value);
    }

    fn command_substitution(&mut self, program: &str) -> Result<String, ExpandError> {
        self.executor.substitute(program, self.env)
    }
}
