//! Configuration loading shared by the collsplit binaries.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Write the Prometheus text exposition to this file when the run ends.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false)
}

/// Read a YAML file, interpolate environment variables and deserialize it.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_yaml(&contents)
}

/// Interpolate environment variables in `contents` and deserialize it.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let result = interpolate(contents);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    serde_yaml::from_str(&result.text).context(YamlParseSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yaml_file() {
        assert!(is_yaml_file(Path::new("split.yaml")));
        assert!(is_yaml_file(Path::new("split.yml")));
        assert!(!is_yaml_file(Path::new("split.toml")));
        assert!(!is_yaml_file(Path::new("guids.txt")));
    }

    #[test]
    fn test_load_yaml_rejects_other_extensions() {
        let err = load_yaml::<MetricsConfig>(Path::new("config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_load_yaml_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.yaml");
        std::fs::write(&path, "snapshot_path: /tmp/collsplit.prom\n").unwrap();

        let config: MetricsConfig = load_yaml(&path).unwrap();
        assert_eq!(
            config.snapshot_path,
            Some(PathBuf::from("/tmp/collsplit.prom"))
        );
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_yaml::<MetricsConfig>(Path::new("/nonexistent/collsplit.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_parse_yaml_rejects_unknown_fields() {
        let err = parse_yaml::<MetricsConfig>("address: 0.0.0.0:9090").unwrap_err();
        assert!(matches!(err, ConfigError::YamlParse { .. }));
    }
}
