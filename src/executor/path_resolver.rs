use std::env;
use std::path::{Path, PathBuf};

pub struct PathResolver;

impl PathResolver {
    /// Finds the program `command` names. Names containing a slash are used
    /// as they are; anything else is searched for in `path` (a `PATH`
    /// value), falling back to the process environment's `PATH`.
    pub fn resolve(&self, command: &str, path: Option<&str>) -> Option<PathBuf> {
        if command.is_empty() {
            return None;
        }
        if command.contains('/') {
            let path = Path::new(command);
            return path.is_file().then(|| path.to_path_buf());
        }

        let paths = match path {
            Some(p) => p.to_string(),
            None => env::var("PATH").ok()?,
        };
        env::split_paths(&paths)
            .map(|dir| {
                // an empty PATH entry means the current directory
                if dir.as_os_str().is_empty() {
                    PathBuf::from(".").join(command)
                } else {
                    dir.join(command)
                }
            })
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_search_in_given_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        File::create(second.path().join("tool")).unwrap();
        let path = env::join_paths([first.path(), second.path()]).unwrap();
        let found = PathResolver.resolve("tool", path.to_str());
        assert_eq!(found, Some(second.path().join("tool")));
        assert_eq!(PathResolver.resolve("missing-tool", path.to_str()), None);
    }

    #[test]
    fn test_names_with_slash_are_not_searched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script");
        File::create(&file).unwrap();
        let name = file.to_str().unwrap();
        assert_eq!(PathResolver.resolve(name, Some("/nonexistent")), Some(file.clone()));
        assert_eq!(PathResolver.resolve(dir.path().to_str().unwrap(), None), None);
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(PathResolver.resolve("", Some("/bin")), None);
    }
}
