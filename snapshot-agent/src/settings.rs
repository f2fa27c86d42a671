//! Persistent box settings shared with other local services.
//!
//! The file is small JSON; every read-modify-write goes through one mutex so
//! concurrent maintenance triggers cannot lose updates.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Minimum time between two maintenance runs
pub const MAINTENANCE_INTERVAL_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSettings {
    #[serde(rename = "sia_upload_limit_kbps", default)]
    pub upload_limit_kbps: u64,

    #[serde(default = "default_currency")]
    pub display_currency: String,

    #[serde(default)]
    pub last_maintenance: i64,

    /// Keys owned by other services, written back untouched
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for BoxSettings {
    fn default() -> Self {
        Self {
            upload_limit_kbps: 0,
            display_currency: default_currency(),
            last_maintenance: 0,
            other: serde_json::Map::new(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a maintenance run at `now` if the last one is older than a
    /// day. Returns whether the caller should run maintenance.
    pub async fn claim_maintenance(&self, now: i64) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut settings = self.read();
        if settings.last_maintenance >= now - MAINTENANCE_INTERVAL_SECS {
            return Ok(false);
        }
        settings.last_maintenance = now;
        self.write(&settings)?;
        info!("Run system maintenance.");
        Ok(true)
    }

    /// A missing or unreadable file yields defaults.
    fn read(&self) -> BoxSettings {
        if !self.path.is_file() {
            return BoxSettings::default();
        }
        match fs::read_to_string(&self.path)
            .map_err(crate::AgentError::from)
            .and_then(|s| serde_json::from_str::<BoxSettings>(&s).map_err(Into::into))
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Settings file could not be read: {} ({})", self.path.display(), e);
                BoxSettings::default()
            }
        }
    }

    fn write(&self, settings: &BoxSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(settings)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::new(temp.path().join("settings.json"));

        let settings = store.read();
        assert_eq!(settings, BoxSettings::default());
        assert_eq!(settings.display_currency, "USD");
    }

    #[tokio::test]
    async fn test_corrupt_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.read(), BoxSettings::default());
        assert!(store.claim_maintenance(1_700_000_000).await.unwrap());
        assert_eq!(store.read().last_maintenance, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_claim_keeps_foreign_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(
            &path,
            r#"{"sia_upload_limit_kbps": 50, "display_currency": "EUR", "theme": "dark"}"#,
        )
        .unwrap();

        let store = SettingsStore::new(&path);
        assert!(store.claim_maintenance(1_700_000_000).await.unwrap());
        assert_eq!(store.read().upload_limit_kbps, 50);

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["display_currency"], "EUR");
        assert_eq!(raw["sia_upload_limit_kbps"], 50);
        assert_eq!(raw["last_maintenance"], 1_700_000_000);
    }

    #[tokio::test]
    async fn test_claim_maintenance_once_per_day() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::new(temp.path().join("settings.json"));
        let now = 1_700_000_000;

        assert!(store.claim_maintenance(now).await.unwrap());
        assert!(!store.claim_maintenance(now + 60).await.unwrap());
        assert_eq!(store.read().last_maintenance, now);
        assert!(store.claim_maintenance(now + MAINTENANCE_INTERVAL_SECS + 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_claims_grant_one() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SettingsStore::new(temp.path().join("settings.json")));
        let now = 1_700_000_000;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim_maintenance(now).await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }
}
