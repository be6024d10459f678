//! CLI configuration file and flag overrides.

use noderelay::{EngineOptions, NodeLauncherConfig, RelayError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of the `--config` JSON file.
///
/// Engine keys sit at the top level; runtime launch settings live under
/// `Runtime`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub engine: EngineOptions,
    #[serde(rename = "Runtime", default)]
    pub runtime: NodeLauncherConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config("--config", format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| RelayError::config("--config", e.to_string()))
    }

    /// Apply command-line overrides on top of the file values.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.engine.timeout_ms = timeout_ms;
        }
        if let Some(max_retries) = overrides.max_retries {
            self.engine.max_retries = max_retries;
        }
        if let Some(program) = &overrides.program {
            self.runtime.program = program.clone();
        }
        if let Some(entry) = &overrides.entry {
            match self.runtime.args.first_mut() {
                Some(first) => *first = entry.clone(),
                None => self.runtime.args.push(entry.clone()),
            }
        }
    }

    /// The launcher config, rejecting one without an entry script.
    pub fn launcher(&self) -> Result<NodeLauncherConfig, RelayError> {
        if self.runtime.args.is_empty() {
            return Err(RelayError::config(
                "--entry",
                "no runtime entry script given (use --entry or Runtime.Args)",
            ));
        }
        Ok(self.runtime.clone())
    }
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub timeout_ms: Option<i64>,
    pub max_retries: Option<u32>,
    pub program: Option<PathBuf>,
    pub entry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_flattened_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("noderelay.json");
        std::fs::write(
            &path,
            r#"{
                "TimeoutMS": 500,
                "MaxRetries": 2,
                "Runtime": { "Program": "/usr/bin/node", "Args": ["runtime.js"] }
            }"#,
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.engine.timeout_ms, 500);
        assert_eq!(config.engine.max_retries, 2);
        assert_eq!(config.runtime.program, PathBuf::from("/usr/bin/node"));
        assert_eq!(config.runtime.args, vec!["runtime.js".to_string()]);
        assert!(config.runtime.pass_parent_pid);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = CliConfig::default();
        config.runtime.args = vec!["old.js".into(), "--flag".into()];

        config.apply(&Overrides {
            timeout_ms: Some(-1),
            max_retries: Some(0),
            program: Some(PathBuf::from("nodejs")),
            entry: Some("new.js".into()),
        });

        assert_eq!(config.engine.timeout_ms, -1);
        assert_eq!(config.engine.max_retries, 0);
        assert_eq!(config.runtime.program, PathBuf::from("nodejs"));
        assert_eq!(config.runtime.args, vec!["new.js".to_string(), "--flag".into()]);
    }

    #[test]
    fn test_missing_entry_is_config_error() {
        let err = CliConfig::default().launcher().unwrap_err();
        assert_eq!(err.to_exit_code(), 2);
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = CliConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, RelayError::Configuration { .. }));
    }
}
