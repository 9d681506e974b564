use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use seedforge_generate::{GenerateOptions, RunOptions};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid profile: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Run profile loaded from a toml file.
///
/// Everything is optional; the file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    /// Row count for tables without an explicit entry in `rows`.
    pub default_rows: Option<u64>,
    /// Per-table row counts.
    pub rows: BTreeMap<String, u64>,
    /// Maximum generation batches in flight per table.
    pub parallelism: Option<usize>,
    /// Delay before a failed batch's single retry.
    pub retry_delay_ms: Option<u64>,
    /// Run seed for reproducible fallback output and FK repair.
    pub seed: Option<u64>,
    /// Per-table steering text passed through to generators.
    pub instructions: BTreeMap<String, String>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Fold the profile into run options; a `--rows` flag wins over the
    /// profile's default.
    pub fn into_run_options(self, rows_flag: Option<u64>) -> RunOptions {
        let defaults = RunOptions::default();
        let generate_defaults = GenerateOptions::default();

        RunOptions {
            default_rows: rows_flag
                .or(self.default_rows)
                .unwrap_or(defaults.default_rows),
            rows_by_table: self.rows,
            generate: GenerateOptions {
                parallelism: self.parallelism.unwrap_or(generate_defaults.parallelism),
                retry_delay: self
                    .retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(generate_defaults.retry_delay),
            },
            seed: self.seed.unwrap_or(defaults.seed),
            instructions: self.instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parses_and_folds_into_options() {
        let profile: Profile = toml::from_str(
            r#"
            default_rows = 20
            parallelism = 2
            retry_delay_ms = 100
            seed = 7

            [rows]
            user = 5
            post = 50

            [instructions]
            user = "brazilian names"
            "#,
        )
        .expect("parse");

        let options = profile.into_run_options(None);
        assert_eq!(options.default_rows, 20);
        assert_eq!(options.rows_by_table.get("post"), Some(&50));
        assert_eq!(options.generate.parallelism, 2);
        assert_eq!(options.generate.retry_delay, Duration::from_millis(100));
        assert_eq!(options.seed, 7);
        assert_eq!(
            options.instructions.get("user").map(String::as_str),
            Some("brazilian names")
        );
    }

    #[test]
    fn rows_flag_wins_over_profile_default() {
        let profile: Profile = toml::from_str("default_rows = 20").expect("parse");
        let options = profile.into_run_options(Some(3));
        assert_eq!(options.default_rows, 3);
    }

    #[test]
    fn empty_profile_uses_engine_defaults() {
        let profile = Profile::default();
        let defaults = RunOptions::default();
        let options = profile.into_run_options(None);
        assert_eq!(options.default_rows, defaults.default_rows);
        assert!(options.rows_by_table.is_empty());
    }
}
