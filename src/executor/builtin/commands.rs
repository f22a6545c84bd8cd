use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;

use log::debug;

use super::manager::BuiltinCommand;
use crate::environment::Environment;
use crate::executor::{DefaultExecutor, ExecOutcome, ExecStatus};
use crate::parser::default::is_name;

const DEFAULT_IFS: &str = " \t\n";

pub struct ColonCommand;

impl BuiltinCommand for ColonCommand {
    fn name(&self) -> &'static str {
        ":"
    }
    fn run(&self, _args: &[String], _env: &mut Environment) -> ExecStatus {
        Ok(ExecOutcome::Code(0))
    }
}

pub struct TrueCommand;

impl BuiltinCommand for TrueCommand {
    fn name(&self) -> &'static str {
        "true"
    }
    fn run(&self, _args: &[String], _env: &mut Environment) -> ExecStatus {
        Ok(ExecOutcome::Code(0))
    }
}

pub struct FalseCommand;

impl BuiltinCommand for FalseCommand {
    fn name(&self) -> &'static str {
        "false"
    }
    fn run(&self, _args: &[String], _env: &mut Environment) -> ExecStatus {
        Ok(ExecOutcome::Code(1))
    }
}

pub struct EchoCommand;

impl BuiltinCommand for EchoCommand {
    fn name(&self) -> &'static str {
        "echo"
    }
    fn run(&self, args: &[String], _env: &mut Environment) -> ExecStatus {
        let (newline, words) = match args.split_first() {
            Some((flag, rest)) if flag == "-n" => (false, rest),
            _ => (true, args),
        };
        let mut out = io::stdout().lock();
        write!(out, "{}", words.join(" "))?;
        if newline {
            writeln!(out)?;
        }
        out.flush()?;
        Ok(ExecOutcome::Code(0))
    }
}

pub struct HelpCommand;

impl BuiltinCommand for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }
    fn run(&self, _args: &[String], _env: &mut Environment) -> ExecStatus {
        let mut out = io::stdout().lock();
        writeln!(out, "Available built-in commands:")?;
        writeln!(out, "  : | true | false     : Do nothing, successfully or not")?;
        writeln!(out, "  echo [-n] [ARG...]   : Print arguments")?;
        writeln!(out, "  cd [DIR | -]         : Change directory")?;
        writeln!(out, "  read [-r] [NAME...]  : Read a line into variables")?;
        writeln!(out, "  source FILE [ARG...] : Run FILE in this shell (also '.')")?;
        writeln!(out, "  export [NAME[=VALUE]...] : Export variables to programs")?;
        writeln!(out, "  exit [N]             : Exit shell")?;
        writeln!(out, "  help                 : Show this help")?;
        out.flush()?;
        Ok(ExecOutcome::Code(0))
    }
}

pub struct CdCommand;

impl BuiltinCommand for CdCommand {
    fn name(&self) -> &'static str {
        "cd"
    }
    fn run(&self, args: &[String], env: &mut Environment) -> ExecStatus {
        if args.len() > 1 {
            eprintln!("cd: too many arguments");
            return Ok(ExecOutcome::Code(1));
        }
        let target = match args.first().map(String::as_str) {
            Some("-") => match env.get_variable("OLDPWD") {
                Some(old) => {
                    let mut out = io::stdout().lock();
                    writeln!(out, "{old}")?;
                    out.flush()?;
                    old
                }
                None => {
                    eprintln!("cd: OLDPWD not set");
                    return Ok(ExecOutcome::Code(1));
                }
            },
            Some(dir) => dir.to_string(),
            None => match env.get_variable("HOME") {
                Some(home) if !home.is_empty() => home,
                _ => return Ok(ExecOutcome::Code(0)),
            },
        };

        let previous = env.get_variable("PWD");
        match std::env::set_current_dir(&target) {
            Ok(()) => {
                if let Some(previous) = previous {
                    env.set("OLDPWD", &previous);
                }
                if let Ok(cwd) = std::env::current_dir() {
                    env.set("PWD", &cwd.to_string_lossy());
                }
                Ok(ExecOutcome::Code(0))
            }
            Err(e) => {
                eprintln!("cd: {target}: {e}");
                Ok(ExecOutcome::Code(1))
            }
        }
    }
}

pub struct ReadCommand;

impl ReadCommand {
    /// Reads one line from fd 0 a byte at a time, so nothing past the
    /// newline is consumed. Returns the line and whether input ended.
    fn read_line(raw: bool) -> io::Result<(String, bool)> {
        let mut input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
        let mut line = Vec::new();
        let mut escaped = false;
        let mut byte = [0u8; 1];
        loop {
            match input.read(&mut byte) {
                Ok(0) => return Ok((String::from_utf8_lossy(&line).into_owned(), true)),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            match byte[0] {
                b'\n' if escaped => escaped = false,
                b'\n' => break,
                b'\\' if !raw && !escaped => escaped = true,
                b => {
                    escaped = false;
                    line.push(b);
                }
            }
        }
        Ok((String::from_utf8_lossy(&line).into_owned(), false))
    }
}

/// Splits `line` into at most `count` fields on the characters of `ifs`.
/// IFS whitespace runs count as one delimiter and are trimmed at both
/// ends; the last field takes the rest of the line.
fn split_fields(line: &str, ifs: &str, count: usize) -> Vec<String> {
    let is_ifs_space = |c: char| ifs.contains(c) && c.is_whitespace();
    let is_ifs = |c: char| ifs.contains(c);

    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start_matches(is_ifs_space);
    while fields.len() + 1 < count {
        let Some(pos) = rest.find(is_ifs) else {
            break;
        };
        fields.push(rest[..pos].to_string());
        // one delimiter: IFS whitespace around at most one other IFS character
        let mut after = rest[pos..].trim_start_matches(is_ifs_space);
        if let Some(c) = after.chars().next().filter(|&c| is_ifs(c) && !c.is_whitespace()) {
            after = after[c.len_utf8()..].trim_start_matches(is_ifs_space);
        }
        rest = after;
    }
    let last = rest.trim_end_matches(is_ifs_space);
    if !last.is_empty() {
        fields.push(last.to_string());
    }
    fields.resize(count, String::new());
    fields
}

impl BuiltinCommand for ReadCommand {
    fn name(&self) -> &'static str {
        "read"
    }
    fn run(&self, args: &[String], env: &mut Environment) -> ExecStatus {
        let (raw, names) = match args.split_first() {
            Some((flag, rest)) if flag == "-r" => (true, rest),
            _ => (false, args),
        };
        let names: Vec<&str> = if names.is_empty() {
            vec!["REPLY"]
        } else {
            names.iter().map(String::as_str).collect()
        };
        if let Some(bad) = names.iter().find(|name| !is_name(name)) {
            eprintln!("read: '{bad}': not a valid identifier");
            return Ok(ExecOutcome::Code(2));
        }

        let (line, at_eof) = Self::read_line(raw)?;
        let ifs = env.get_variable("IFS").unwrap_or_else(|| DEFAULT_IFS.to_string());
        let fields = split_fields(&line, &ifs, names.len());
        for (name, value) in names.iter().zip(&fields) {
            env.set(name, value);
        }
        Ok(ExecOutcome::Code(if at_eof { 1 } else { 0 }))
    }
}

pub struct SourceCommand {
    name: &'static str,
}

impl SourceCommand {
    pub fn named(name: &'static str) -> Self {
        SourceCommand { name }
    }
}

impl BuiltinCommand for SourceCommand {
    fn name(&self) -> &'static str {
        self.name
    }
    fn run(&self, args: &[String], env: &mut Environment) -> ExecStatus {
        let Some((path, params)) = args.split_first() else {
            eprintln!("{}: usage: {} FILE [ARG...]", self.name, self.name);
            return Ok(ExecOutcome::Code(2));
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("{}: cannot access '{path}': {e}", self.name);
                return Ok(ExecOutcome::Code(1));
            }
        };
        debug!("sourcing {path}");
        let mut executor = DefaultExecutor::new();
        if params.is_empty() {
            Ok(executor.run_string(&text, env))
        } else {
            Ok(env.with_positional(params.to_vec(), |env| executor.run_string(&text, env)))
        }
    }
}

pub struct ExportCommand;

impl BuiltinCommand for ExportCommand {
    fn name(&self) -> &'static str {
        "export"
    }
    fn run(&self, args: &[String], env: &mut Environment) -> ExecStatus {
        if args.is_empty() {
            let mut vars = env.exported_vars();
            vars.sort();
            let mut out = io::stdout().lock();
            for (name, value) in vars {
                writeln!(out, "export {name}='{}'", value.replace('\'', "'\\''"))?;
            }
            out.flush()?;
            return Ok(ExecOutcome::Code(0));
        }

        let mut status = 0;
        for arg in args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if !is_name(name) {
                eprintln!("export: '{arg}': not a valid identifier");
                status = 1;
                continue;
            }
            if let Some(value) = value {
                env.set(name, value);
            }
            env.export(name);
        }
        Ok(ExecOutcome::Code(status))
    }
}

pub struct ExitCommand;

impl BuiltinCommand for ExitCommand {
    fn name(&self) -> &'static str {
        "exit"
    }
    fn run(&self, args: &[String], env: &mut Environment) -> ExecStatus {
        let code = match args.first() {
            None => env.last_status(),
            Some(arg) => match arg.parse::<i32>() {
                Ok(code) => code,
                Err(_) => {
                    eprintln!("exit: {arg}: numeric argument required");
                    2
                }
            },
        };
        Ok(ExecOutcome::Exit(code))
    }
}
