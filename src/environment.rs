use std::collections::HashMap;
use std::os::fd::{OwnedFd, RawFd};
use std::rc::Rc;

use log::trace;
use nix::unistd::Pid;

use crate::ast::CommandList;

#[derive(Debug, Clone, PartialEq)]
struct Variable {
    value: String,
    exported: bool,
}

/// A file descriptor moved out of the way by a reversible redirection.
///
/// `saved` is `None` when `fd` was not open; restoring closes it again.
#[derive(Debug)]
pub struct SavedFd {
    pub fd: RawFd,
    pub saved: Option<OwnedFd>,
}

/// State of the running shell: variables, `$?`, positional parameters,
/// functions, saved descriptors and background children.
///
/// A forked child works on its own copy and never writes back.
#[derive(Debug)]
pub struct Environment {
    vars: HashMap<String, Variable>,
    last_status: i32,
    positional: Vec<String>,
    shell_name: String,
    shell_pid: Pid,
    functions: HashMap<String, Rc<CommandList>>,
    pub saved_fds: Vec<SavedFd>,
    last_background_pid: Option<Pid>,
    background_jobs: Vec<Pid>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Environment {
            vars: HashMap::new(),
            last_status: 0,
            positional: Vec::new(),
            shell_name: env!("CARGO_PKG_NAME").to_string(),
            shell_pid: nix::unistd::getpid(),
            functions: HashMap::new(),
            saved_fds: Vec::new(),
            last_background_pid: None,
            background_jobs: Vec::new(),
        };

        // Import all OS environment variables when starting the process (default value)
        for (k, v) in std::env::vars() {
            env.vars.insert(
                k,
                Variable {
                    value: v,
                    exported: true,
                },
            );
        }

        env
    }

    /// Looks a parameter up the way `$name` sees it: special parameters
    /// first, then shell variables, then the process environment.
    pub fn get_variable(&self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_status.to_string()),
            "#" => Some(self.positional.len().to_string()),
            "*" | "@" => Some(self.positional.join(" ")),
            "0" => Some(self.shell_name.clone()),
            "$" => Some(self.shell_pid.to_string()),
            "!" => self.last_background_pid.map(|pid| pid.to_string()),
            "-" => Some(String::new()),
            "PWD" => self.pwd(),
            "PROMPT_PWD" => self.prompt_pwd(),
            n if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
                let index: usize = n.parse().ok()?;
                self.positional.get(index.checked_sub(1)?).cloned()
            }
            _ => self
                .get(name)
                .map(str::to_string)
                .or_else(|| std::env::var(name).ok()),
        }
    }

    fn pwd(&self) -> Option<String> {
        std::env::current_dir()
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| self.get("PWD").map(str::to_string))
    }

    fn prompt_pwd(&self) -> Option<String> {
        let pwd = self.pwd()?;
        match self.get_variable("HOME") {
            Some(home) if !home.is_empty() && pwd.starts_with(&home) => {
                let rest = &pwd[home.len()..];
                if rest.is_empty() || rest.starts_with('/') {
                    Some(format!("~{rest}"))
                } else {
                    Some(pwd)
                }
            }
            _ => Some(pwd),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.value.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.vars
            .entry(key.to_string())
            .and_modify(|var| var.value = value.to_string())
            .or_insert(Variable {
                value: value.to_string(),
                exported: false,
            });
    }

    pub fn unset(&mut self, key: &str) {
        self.vars.remove(key);
    }

    pub fn export(&mut self, key: &str) {
        match self.vars.get_mut(key) {
            Some(var) => var.exported = true,
            None => {
                // `export NAME` before NAME is set still marks it for children
                if let Ok(value) = std::env::var(key) {
                    self.vars.insert(key.to_string(), Variable { value, exported: true });
                }
            }
        }
    }

    pub fn is_exported(&self, key: &str) -> bool {
        self.vars.get(key).is_some_and(|v| v.exported)
    }

    pub fn all(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    pub fn exported_vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .filter(|(_, v)| v.exported)
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn set_last_status(&mut self, status: i32) {
        self.last_status = status;
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn set_positional(&mut self, params: Vec<String>) {
        self.positional = params;
    }

    pub fn shell_name(&self) -> &str {
        &self.shell_name
    }

    pub fn set_shell_name(&mut self, name: &str) {
        self.shell_name = name.to_string();
    }

    pub fn define_function(&mut self, name: &str, body: Rc<CommandList>) {
        self.functions.insert(name.to_string(), body);
    }

    pub fn function(&self, name: &str) -> Option<Rc<CommandList>> {
        self.functions.get(name).cloned()
    }

    pub fn record_background(&mut self, pid: Pid) {
        self.last_background_pid = Some(pid);
        self.background_jobs.push(pid);
    }

    pub fn background_jobs_mut(&mut self) -> &mut Vec<Pid> {
        &mut self.background_jobs
    }

    /// Runs `f` with `assignments` applied, then puts every variable back
    /// the way it was (including absent).
    pub fn with_temporary_vars<R>(
        &mut self,
        assignments: &[(String, String)],
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let changes: Vec<_> = assignments
            .iter()
            .map(|(name, value)| TemporaryVariableChange::apply(self, name, value))
            .collect();
        let result = f(self);
        for change in changes.into_iter().rev() {
            change.restore(self);
        }
        result
    }

    /// Runs `f` with the positional parameters replaced by `params`.
    pub fn with_positional<R>(&mut self, params: Vec<String>, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.positional, params);
        let result = f(self);
        self.positional = previous;
        result
    }
}

/// Overwrites one variable until `restore` is called.
#[derive(Debug)]
pub struct TemporaryVariableChange {
    name: String,
    previous: Option<Variable>,
}

impl TemporaryVariableChange {
    pub fn apply(env: &mut Environment, name: &str, value: &str) -> Self {
        let previous = env.vars.get(name).cloned();
        trace!("temporarily setting {name}");
        env.vars.insert(
            name.to_string(),
            Variable {
                value: value.to_string(),
                exported: previous.as_ref().is_some_and(|v| v.exported),
            },
        );
        TemporaryVariableChange {
            name: name.to_string(),
            previous,
        }
    }

    pub fn restore(self, env: &mut Environment) {
        match self.previous {
            Some(var) => {
                env.vars.insert(self.name, var);
            }
            None => {
                env.vars.remove(&self.name);
            }
        }
    }
}
