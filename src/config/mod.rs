// CrabSift - GPL-3.0-or-later
// This file is part of CrabSift.
//
// Copyright (C) 2025 The CrabSift contributors
//
// CrabSift is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// CrabSift is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with CrabSift.  If not, see <https://www.gnu.org/licenses/>.

use crate::anomaly::ForestParams;
use crate::core::{CancelToken, ProgressSink, RunContext, DEFAULT_PROGRESS_EVERY};
use crate::error::ConfigError;
use crate::rarity::RarityParams;
use crate::vectorize::NumberParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Analysis defaults stored in the user's config directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Isolation forest training parameters
    pub forest: ForestParams,

    /// Rarity filter parameters
    pub rarity: RarityParams,

    /// Delimiters for the number vectorizer
    pub number: NumberParams,

    /// Iterations between two progress events
    pub progress_every: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            rarity: RarityParams::default(),
            number: NumberParams::default(),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl AnalysisConfig {
    /// Get the path to the user config file
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("crabsift").join("config.json"))
    }

    /// Load the user config, returning defaults if it is missing or broken
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::info!("No config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            tracing::info!("No config found at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the user config file
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating missing parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Run context reporting to `sink` at the configured cadence
    #[must_use]
    pub fn run_context<'a>(&self, sink: &'a dyn ProgressSink, cancel: CancelToken) -> RunContext<'a> {
        RunContext::new(sink, cancel).with_progress_every(self.progress_every)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NoProgress;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.json");

        let mut config = AnalysisConfig::default();
        config.forest.seed = Some(17);
        config.rarity.top_n = Some(12);
        config.number.prefix = Some("took".to_owned());
        config.save_to(&path).expect("saved");

        let loaded = AnalysisConfig::load_from(&path).expect("loaded");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "rarity": { "threshold": 0.75 } }"#).expect("written");

        let loaded = AnalysisConfig::load_from(&path).expect("loaded");
        assert_eq!(loaded.rarity.threshold, 0.75);
        assert_eq!(loaded.rarity.allowance, 0);
        assert_eq!(loaded.forest, ForestParams::default());
        assert_eq!(loaded.progress_every, DEFAULT_PROGRESS_EVERY);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("written");
        assert!(matches!(
            AnalysisConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            AnalysisConfig::load_from(&dir.path().join("absent.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_run_context_uses_configured_cadence() {
        let config = AnalysisConfig {
            progress_every: 0,
            ..AnalysisConfig::default()
        };
        let ctx = config.run_context(&NoProgress, CancelToken::new());
        assert!(format!("{ctx:?}").contains("every: 1"));
    }
}
