//! Configuration file support.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default CLI options.
    pub defaults: Defaults,
    /// Workflow aliases, mapping a short name to a workflow file.
    pub workflows: HashMap<String, PathBuf>,
}

/// Default CLI options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Enable verbose output by default.
    pub verbose: bool,
    /// Enable quiet output by default.
    pub quiet: bool,
    /// Cancel `run` after this many seconds.
    pub timeout_secs: Option<u64>,
    /// Log filter used when neither flags nor `RUST_LOG` say otherwise.
    pub log_level: Option<String>,
}

impl Config {
    /// Load config from the default location (~/.config/tributary/config.toml).
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Load config from a specific path.
    ///
    /// Runs before logging is set up, so problems are reported on stderr
    /// directly.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tributary").join("config.toml"))
    }

    /// Resolve a workflow argument: an alias from `[workflows]`, or a path.
    pub fn resolve_workflow(&self, arg: &str) -> PathBuf {
        match self.workflows.get(arg) {
            Some(path) => path.clone(),
            None => Path::new(arg).to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
[defaults]
verbose = true
timeout_secs = 30
log_level = "info"

[workflows]
numbers = "/srv/flows/numbers.yaml"
"#,
        )
        .unwrap();

        assert!(config.defaults.verbose);
        assert!(!config.defaults.quiet);
        assert_eq!(config.defaults.timeout_secs, Some(30));
        assert_eq!(config.defaults.log_level.as_deref(), Some("info"));
        assert_eq!(
            config.resolve_workflow("numbers"),
            PathBuf::from("/srv/flows/numbers.yaml")
        );
    }

    #[test]
    fn test_unknown_alias_is_a_path() {
        let config = Config::default();
        assert_eq!(
            config.resolve_workflow("flows/a.json"),
            PathBuf::from("flows/a.json")
        );
    }

    #[test]
    fn test_missing_or_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Config::load_from_path(Some(dir.path().join("nope.toml")));
        assert!(missing.workflows.is_empty());

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "defaults = 3").unwrap();
        let malformed = Config::load_from_path(Some(path));
        assert_eq!(malformed.defaults.timeout_secs, None);
    }
}
