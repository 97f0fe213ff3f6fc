//! Target and candidate list sources
//!
//! Each list has two interchangeable providers: the built-in list compiled
//! into the binary, or a user supplied list (inline text or a file).

use super::{Config, SourceConfig};
use crate::error::{Error, Result};
use crate::orchestrator::RunPlan;

/// Built-in target sites
pub const BUILTIN_TARGETS: &str = include_str!("../../assets/proxytest_sites.txt");

/// Built-in candidate configurations
pub const BUILTIN_CANDIDATES: &str = include_str!("../../assets/proxytest_cmds.txt");

/// Split newline separated text into trimmed, non-empty entries.
///
/// Entries are kept in order and never deduplicated.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Built-in lists additionally carry `#` comments
fn parse_builtin(text: &str) -> Vec<String> {
    parse_lines(text)
        .into_iter()
        .filter(|line| !line.starts_with('#'))
        .collect()
}

impl SourceConfig {
    /// Resolve the entries of this source, falling back to `builtin`
    /// unless the custom list is selected.
    pub fn resolve(&self, builtin: &str) -> Result<Vec<String>> {
        if !self.use_custom {
            return Ok(parse_builtin(builtin));
        }

        match self.file {
            Some(ref path) => {
                let content = std::fs::read_to_string(path).map_err(|e| Error::Source {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                Ok(parse_lines(&content))
            }
            None => Ok(parse_lines(&self.custom)),
        }
    }
}

/// Build the target and candidate lists for a run
pub fn resolve_plan(config: &Config) -> Result<RunPlan> {
    Ok(RunPlan {
        targets: config.targets.resolve(BUILTIN_TARGETS)?,
        candidates: config.candidates.resolve(BUILTIN_CANDIDATES)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines_trims_and_drops_blanks() {
        let entries = parse_lines("  example.com  \n\n\t\nexample.org\r\n");
        assert_eq!(entries, vec!["example.com", "example.org"]);
    }

    #[test]
    fn test_parse_lines_keeps_duplicates_and_order() {
        let entries = parse_lines("b.com\na.com\nb.com");
        assert_eq!(entries, vec!["b.com", "a.com", "b.com"]);
    }

    #[test]
    fn test_builtin_lists_are_usable() {
        let targets = parse_builtin(BUILTIN_TARGETS);
        let candidates = parse_builtin(BUILTIN_CANDIDATES);
        assert!(!targets.is_empty());
        assert!(!candidates.is_empty());
        assert!(targets.iter().all(|t| !t.starts_with('#')));
        assert!(candidates.iter().all(|c| !c.starts_with('#')));
    }

    #[test]
    fn test_custom_text_source() {
        let source = SourceConfig {
            use_custom: true,
            custom: "--opt-a\n\n --opt-b \n".to_string(),
            file: None,
        };
        assert_eq!(source.resolve("ignored").unwrap(), vec!["--opt-a", "--opt-b"]);
    }

    #[test]
    fn test_custom_flag_off_ignores_custom_text() {
        let source = SourceConfig {
            use_custom: false,
            custom: "custom.example".to_string(),
            file: None,
        };
        assert_eq!(source.resolve("builtin.example\n").unwrap(), vec!["builtin.example"]);
    }

    #[test]
    fn test_custom_file_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("sites.txt");
        std::fs::write(&path, "example.com\n  test.org  \n\n").unwrap();

        let source = SourceConfig {
            use_custom: true,
            custom: "ignored.example".to_string(),
            file: Some(path),
        };
        assert_eq!(source.resolve("").unwrap(), vec!["example.com", "test.org"]);
    }

    #[test]
    fn test_missing_custom_file() {
        let source = SourceConfig {
            use_custom: true,
            custom: String::new(),
            file: Some("/nonexistent/sites.txt".into()),
        };
        assert!(matches!(source.resolve(""), Err(Error::Source { .. })));
    }

    #[test]
    fn test_resolve_plan_defaults() {
        let plan = resolve_plan(&Config::default()).unwrap();
        assert!(plan.targets.contains(&"youtube.com".to_string()));
        assert!(!plan.candidates.is_empty());
    }
}
