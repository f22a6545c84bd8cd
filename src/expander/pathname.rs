use glob::{MatchOptions, glob_with};
use log::debug;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Paths matching `pattern`, sorted. A malformed pattern matches nothing.
pub fn expand(pattern: &str) -> Vec<String> {
    let paths = match glob_with(pattern, MATCH_OPTIONS) {
        Ok(paths) => paths,
        Err(e) => {
            debug!("not globbing '{pattern}': {e}");
            return Vec::new();
        }
    };
    let mut matches: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    matches.sort();
    matches
}
