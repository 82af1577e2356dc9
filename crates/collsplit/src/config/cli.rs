//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use super::{Config, SourceConfig};

/// Split event collections into sub-collections by file GUID.
#[derive(Parser, Debug, Default)]
#[command(version)]
pub struct CliArgs {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input collection (can be specified multiple times; replaces configured sources)
    #[arg(long = "src", value_name = "PATH")]
    pub sources: Vec<PathBuf>,

    /// Output directory for sub-collections
    #[arg(long = "out", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// File assigning GUIDs to named sub-collections
    #[arg(long = "guidfile", value_name = "FILE")]
    pub guid_file: Option<PathBuf>,

    /// Maximum number of synthesized sub-collections (values below 1 mean 1)
    #[arg(long = "maxsplit", value_name = "N", allow_negative_numbers = true)]
    pub max_split: Option<i64>,

    /// Rows buffered per sub-collection before its output is opened
    #[arg(long = "rowscached", value_name = "N")]
    pub rows_cached: Option<usize>,

    /// Minimum events per synthesized sub-collection (negative means no minimum)
    #[arg(long = "minevents", value_name = "N", allow_negative_numbers = true)]
    pub min_events: Option<i64>,

    /// Reference column holding the GUID to split on
    #[arg(long = "splitref", value_name = "NAME")]
    pub split_ref: Option<String>,

    /// Maximum number of outputs open at once (at least 2)
    #[arg(long = "maxopen", value_name = "N")]
    pub max_open: Option<usize>,

    /// Commit each output every N events
    #[arg(long = "nevtpercommit", value_name = "N")]
    pub events_per_commit: Option<u64>,

    /// Events each output caches before writing
    #[arg(long = "nevtcached", value_name = "N")]
    pub sink_rows_cached: Option<usize>,

    /// Do not write .meta.json sidecars
    #[arg(long = "nometadata")]
    pub no_metadata: bool,

    /// Name of the destination reference column
    #[arg(long = "dstref", value_name = "NAME")]
    pub dst_ref: Option<String>,

    /// Print the partition plan as JSON without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Overwrite `config` values with the flags that were given.
    pub fn apply_to(&self, config: &mut Config) {
        if !self.sources.is_empty() {
            config.sources = self.sources.iter().map(SourceConfig::new).collect();
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(path) = &self.guid_file {
            config.split.guid_file = Some(path.clone());
        }
        if let Some(n) = self.max_split {
            config.split.max_split = usize::try_from(n.max(1)).unwrap_or(usize::MAX);
        }
        if let Some(n) = self.rows_cached {
            config.split.rows_cached = n;
        }
        if let Some(n) = self.min_events {
            config.split.min_events = u64::try_from(n).ok();
        }
        if let Some(name) = &self.split_ref {
            config.split.split_ref = Some(name.clone());
        }
        if let Some(n) = self.max_open {
            config.split.max_open = n;
        }
        if let Some(n) = self.events_per_commit {
            config.split.events_per_commit = Some(n);
        }
        if let Some(n) = self.sink_rows_cached {
            config.output.sink_rows_cached = n;
        }
        if self.no_metadata {
            config.output.write_metadata = false;
        }
        if let Some(name) = &self.dst_ref {
            config.output.dst_ref = Some(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("collsplit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_only_config() {
        let args = parse(&[
            "--src", "a.ndjson", "--src", "b.ndjson.gz", "--out", "out", "--maxsplit", "0",
            "--minevents", "-1", "--maxopen", "8", "--nometadata", "--dstref", "StreamAOD_ref",
        ]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.split.max_split, 1);
        assert_eq!(config.split.min_events, None);
        assert_eq!(config.split.max_open, 8);
        assert!(!config.output.write_metadata);
        assert_eq!(config.output.dst_ref.as_deref(), Some("StreamAOD_ref"));
        assert!(!args.dry_run);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("split.yaml");
        std::fs::write(
            &path,
            "sources:\n  - path: a.ndjson\noutput:\n  dir: out\nsplit:\n  max_split: 20\n  min_events: 5\n",
        )
        .unwrap();

        let args = parse(&[
            "-c",
            path.to_str().unwrap(),
            "--minevents",
            "100",
            "--nevtpercommit",
            "10",
            "--dry-run",
        ]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.split.max_split, 20);
        assert_eq!(config.split.min_events, Some(100));
        assert_eq!(config.split.events_per_commit, Some(10));
        assert!(args.dry_run);
    }

    #[test]
    fn test_missing_output_dir() {
        let args = parse(&["--src", "a.ndjson"]);
        let err = Config::from_args(&args).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyOutputDir));
    }

    #[test]
    fn test_no_sources() {
        let args = parse(&["--out", "out"]);
        let err = Config::from_args(&args).unwrap_err();
        assert!(matches!(err, ConfigError::NoSources));
    }
}
