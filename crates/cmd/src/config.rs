// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! YAML settings file for the `mill` binary.
//!
//! Durations are written the human way ("30s", "24h") and parsed with
//! `parse_duration`; everything else maps straight onto the library's
//! settings type.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use millpond::{BackendSettings, Container, FileSystemSettings};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CmdConfig {
    pub name: String,
    pub base_path: String,
    pub containers: Vec<Container>,
    pub scratch_dir: PathBuf,
    #[serde(default)]
    pub lock_timeout: Option<String>,
    #[serde(default)]
    pub scratch_ttl: Option<String>,
    #[serde(default)]
    pub scratch_clean_interval: Option<String>,
    #[serde(default)]
    pub sync_interval: Option<String>,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub encryption_key_ref: Option<String>,
    #[serde(default)]
    pub backend: BackendSettings,
    /// Where the embedded coordination namespace snapshot lives.
    #[serde(default)]
    pub namespace_file: Option<PathBuf>,
}

fn millis(field: &str, value: &Option<String>) -> Result<Option<u64>> {
    match value {
        None => Ok(None),
        Some(text) => {
            let duration = parse_duration::parse(text)
                .with_context(|| format!("bad duration in {field}: {text:?}"))?;
            let ms = duration.as_millis();
            if ms == 0 {
                bail!("{field} must be greater than zero: {text:?}");
            }
            Ok(Some(ms as u64))
        }
    }
}

impl CmdConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        serde_yaml_ng::from_str(&text)
            .with_context(|| format!("cannot parse config {}", path.display()))
    }

    pub fn namespace_file(&self) -> PathBuf {
        self.namespace_file
            .clone()
            .unwrap_or_else(|| self.scratch_dir.join("namespace.json"))
    }

    pub fn into_settings(self) -> Result<FileSystemSettings> {
        let mut settings = FileSystemSettings::new(
            self.name,
            self.base_path,
            self.containers,
            self.scratch_dir,
        );
        settings.compressed = self.compressed;
        settings.encryption_key_ref = self.encryption_key_ref;
        settings.backend = self.backend;
        if let Some(ms) = millis("lock_timeout", &self.lock_timeout)? {
            settings.lock_timeout_ms = ms;
        }
        if let Some(ms) = millis("scratch_ttl", &self.scratch_ttl)? {
            settings.scratch_ttl_ms = ms;
        }
        if let Some(ms) = millis("scratch_clean_interval", &self.scratch_clean_interval)? {
            settings.scratch_clean_interval_ms = ms;
        }
        if let Some(ms) = millis("sync_interval", &self.sync_interval)? {
            settings.sync_interval_ms = ms;
        }
        settings.validate()?;
        Ok(settings)
    }
}
