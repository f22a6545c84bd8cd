use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = ".tiny_posix_shell.conf";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub prompt: String,
    pub log_level: LevelFilter,
    /// Seeded as exported shell variables at startup.
    pub env_vars: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        ConfigLoader::default_config()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn default_config() -> Config {
        Config {
            prompt: "\\w $ ".to_string(),
            log_level: LevelFilter::Warn,
            env_vars: BTreeMap::new(),
        }
    }

    /// `$HOME/.tiny_posix_shell.conf`, if `HOME` is set.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| Path::new(&home).join(CONFIG_FILE_NAME))
    }

    /// Loads the file at `path`; a missing file gives the defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        match fs::read_to_string(path) {
            Ok(src) => Self::load_from_str(&src),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default_config()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn load_from_str(src: &str) -> Result<Config, ConfigError> {
        let mut config = Self::default_config();

        for (lineno, line) in src.lines().enumerate() {
            let line_number = lineno + 1;
            let parse_error = |message: String| ConfigError::Parse {
                line: line_number,
                message,
            };
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(parse_error(format!("no '=' found: {line}")));
            };
            // the value is kept verbatim so prompts can end in a space
            match key.trim() {
                "prompt" => config.prompt = value.to_string(),
                "log_level" => {
                    config.log_level = value
                        .trim()
                        .parse()
                        .map_err(|_| parse_error(format!("invalid log level: {}", value.trim())))?;
                }
                k if k.starts_with("env.") => {
                    let name = &k["env.".len()..];
                    if !crate::parser::default::is_name(name) {
                        return Err(parse_error(format!("invalid variable name: {name}")));
                    }
                    config.env_vars.insert(name.to_string(), value.to_string());
                }
                k => return Err(parse_error(format!("unknown key: {k}"))),
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_load_from_str() {
        let config = ConfigLoader::load_from_str(
            "# shell settings\n\nprompt=% \nlog_level = debug\nenv.EDITOR=vi\nenv.GREETING=a=b\n",
        )
        .unwrap();
        assert_eq!(config.prompt, "% ");
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.env_vars.get("EDITOR").map(String::as_str), Some("vi"));
        assert_eq!(config.env_vars.get("GREETING").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::load_from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level, LevelFilter::Warn);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        assert_matches!(
            ConfigLoader::load_from_str("prompt=$ \nhistory_max=5"),
            Err(ConfigError::Parse { line: 2, message }) if message.contains("history_max")
        );
        assert_matches!(
            ConfigLoader::load_from_str("just words"),
            Err(ConfigError::Parse { line: 1, .. })
        );
        assert_matches!(
            ConfigLoader::load_from_str("log_level=loud"),
            Err(ConfigError::Parse { line: 1, .. })
        );
        assert_matches!(
            ConfigLoader::load_from_str("env.1BAD=x"),
            Err(ConfigError::Parse { line: 1, .. })
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(ConfigLoader::load_from_file(&path).unwrap(), Config::default());

        std::fs::write(&path, "log_level=trace\n").unwrap();
        assert_eq!(ConfigLoader::load_from_file(&path).unwrap().log_level, LevelFilter::Trace);

        assert_matches!(ConfigLoader::load_from_file(dir.path()), Err(ConfigError::Io(_)));
    }
}
