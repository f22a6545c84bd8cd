use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;

use crate::environment::Environment;

pub struct ShellPrompt {
    template: String,
}

impl ShellPrompt {
    /// `template` may contain `\w`, replaced by `$PROMPT_PWD` each time.
    pub fn new(template: &str) -> Self {
        ShellPrompt {
            template: template.to_string(),
        }
    }

    pub fn render(&self, env: &Environment) -> String {
        let cwd = env.get_variable("PROMPT_PWD").unwrap_or_default();
        self.template.replace("\\w", &cwd)
    }

    pub fn show_prompt(&self, env: &Environment) -> io::Result<()> {
        let mut err = io::stderr().lock();
        err.write_all(self.render(env).as_bytes())?;
        err.flush()
    }

    /// One line without its newline, or `None` at end of input.
    ///
    /// Reads fd 0 a byte at a time: whatever follows the line is left for
    /// the commands it runs, such as `read`.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match input.read(&mut byte) {
                Ok(0) if line.is_empty() => {
                    // EOF (e.g., Ctrl-D)
                    writeln!(io::stderr().lock())?;
                    return Ok(None);
                }
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}
