// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Runtime settings
//!
//! Settings describe where curaflow runs, not what the pipeline does: which
//! launcher starts tasks, where the search service lives and where run
//! records are kept. They are read from the first `curaflow.toml` found and
//! then overridden by command-line flags and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{CuraflowError, CuraflowResult};

/// File name looked up in the working directory and the config directory
pub const SETTINGS_FILE: &str = "curaflow.toml";

/// Which launcher starts stage tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LauncherKind {
    /// Run each container reference as a local command
    #[default]
    Process,
    /// Produce deterministic outputs without running anything
    Simulated,
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the search service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_endpoint: Option<String>,

    /// Directory holding run records, relative to the working directory
    pub runs_dir: PathBuf,

    pub launcher: LauncherKind,

    /// Location prefix used by the simulated launcher
    pub simulated_prefix: String,

    /// Overrides the pipeline's default deadline, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_endpoint: None,
            runs_dir: PathBuf::from(".curaflow").join("runs"),
            launcher: LauncherKind::default(),
            simulated_prefix: "sim://curaflow".into(),
            deadline_secs: None,
        }
    }
}

impl Settings {
    /// Load settings
    ///
    /// An explicit path must exist. Otherwise `./curaflow.toml` and then the
    /// user config directory are tried, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> CuraflowResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for candidate in Self::candidates() {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "loading settings");
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Paths searched when no explicit settings file is given
    pub fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(SETTINGS_FILE)];
        if let Some(dir) = user_config_dir() {
            paths.push(dir.join(SETTINGS_FILE));
        }
        paths
    }

    pub fn from_file(path: &Path) -> CuraflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CuraflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> CuraflowResult<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    pub fn to_toml(&self) -> CuraflowResult<String> {
        toml::to_string_pretty(self).map_err(|e| CuraflowError::Toml {
            message: e.to_string(),
        })
    }

    /// Apply command-line and environment overrides
    pub fn with_overrides(
        mut self,
        search_endpoint: Option<String>,
        launcher: Option<LauncherKind>,
        runs_dir: Option<PathBuf>,
    ) -> Self {
        if search_endpoint.is_some() {
            self.search_endpoint = search_endpoint;
        }
        if let Some(launcher) = launcher {
            self.launcher = launcher;
        }
        if let Some(runs_dir) = runs_dir {
            self.runs_dir = runs_dir;
        }
        self
    }
}

/// Per-user configuration directory
pub fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "curaflow").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.launcher, LauncherKind::Process);
        assert!(settings.runs_dir.ends_with("runs"));
    }

    #[test]
    fn test_parse_settings() {
        let settings = Settings::from_toml(
            r#"
search_endpoint = "https://search.internal:443"
launcher = "simulated"
deadline_secs = 600
"#,
        )
        .unwrap();

        assert_eq!(settings.search_endpoint.as_deref(), Some("https://search.internal:443"));
        assert_eq!(settings.launcher, LauncherKind::Simulated);
        assert_eq!(settings.deadline_secs, Some(600));
    }

    #[test]
    fn test_unknown_launcher_rejected() {
        let result = Settings::from_toml("launcher = \"kubernetes\"");
        assert!(matches!(result, Err(CuraflowError::Toml { .. })));
    }

    #[test]
    fn test_overrides_win() {
        let settings = Settings::default().with_overrides(
            Some("http://localhost:9200".into()),
            Some(LauncherKind::Simulated),
            None,
        );
        assert_eq!(settings.search_endpoint.as_deref(), Some("http://localhost:9200"));
        assert_eq!(settings.launcher, LauncherKind::Simulated);
        assert_eq!(settings.runs_dir, Settings::default().runs_dir);
    }

    #[test]
    fn test_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, Settings::default().to_toml().unwrap()).unwrap();

        assert_eq!(Settings::load(Some(&path)).unwrap(), Settings::default());
        assert!(Settings::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
