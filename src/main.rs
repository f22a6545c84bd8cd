use std::io::ErrorKind;
use std::process;

use log::debug;
use simplelog::{ColorChoice, TermLogger, TerminalMode};

use tiny_posix_shell::config::{Config, ConfigLoader};
use tiny_posix_shell::environment::Environment;
use tiny_posix_shell::error::ShellError;
use tiny_posix_shell::executor::{DefaultExecutor, ExecOutcome, ignore_interactive_signals};
use tiny_posix_shell::prompt::ShellPrompt;

const LOG_ENV_VAR: &str = "TINY_SHELL_LOG";

fn main() {
    let config = load_config();
    init_logging(&config);

    let mut env = Environment::new();
    for (name, value) in &config.env_vars {
        env.set(name, value);
        env.export(name);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match run(&args, &config, &mut env) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {e}", env!("CARGO_PKG_NAME"));
            match e {
                ShellError::Io(io) if io.kind() == ErrorKind::NotFound => 127,
                _ => 2,
            }
        }
    };
    process::exit(code);
}

fn load_config() -> Config {
    let Some(path) = ConfigLoader::default_path() else {
        return Config::default();
    };
    ConfigLoader::load_from_file(&path).unwrap_or_else(|e| {
        eprintln!("{}: {}: {}", env!("CARGO_PKG_NAME"), path.display(), ShellError::from(e));
        Config::default()
    })
}

fn init_logging(config: &Config) {
    let level = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(config.log_level);
    if let Err(e) = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("{}: logging disabled: {e}", env!("CARGO_PKG_NAME"));
    }
}

fn run(args: &[String], config: &Config, env: &mut Environment) -> Result<i32, ShellError> {
    let mut executor = DefaultExecutor::new();
    match args.split_first() {
        Some((flag, rest)) if flag == "-c" => {
            let Some((command, rest)) = rest.split_first() else {
                return Err(ShellError::Usage("-c requires a command string".to_string()));
            };
            if let Some((name, params)) = rest.split_first() {
                env.set_shell_name(name);
                env.set_positional(params.to_vec());
            }
            debug!("running command string");
            Ok(executor.run_string(command, env).code())
        }
        Some((script, params)) => {
            let text = std::fs::read_to_string(script)?;
            env.set_shell_name(script);
            env.set_positional(params.to_vec());
            debug!("running script {script}");
            Ok(executor.run_string(&text, env).code())
        }
        None => interactive(&mut executor, config, env),
    }
}

fn interactive(executor: &mut DefaultExecutor, config: &Config, env: &mut Environment) -> Result<i32, ShellError> {
    ignore_interactive_signals();
    let prompt = ShellPrompt::new(&config.prompt);
    loop {
        prompt.show_prompt(env)?;
        let Some(line) = prompt.read_line()? else {
            return Ok(env.last_status());
        };
        if line.trim().is_empty() {
            continue;
        }
        if let ExecOutcome::Exit(code) = executor.run_string(&line, env) {
            return Ok(code);
        }
    }
}
