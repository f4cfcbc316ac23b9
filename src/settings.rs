use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Runtime settings read by every loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing)]
    pub gemini_api_key: String,
    pub model: String,
    /// Seconds of video per clip.
    pub capture_duration: f64,
    pub capture_fps: u32,
    pub game_context: String,
    /// `None` records the full screen.
    pub target_window: Option<String>,
    pub temperature: f64,
    /// `low` or `default`.
    pub media_resolution: String,
    /// Minimum seconds between executed actions.
    pub action_delay: f64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            model: "gemini-3-flash-preview".into(),
            capture_duration: 1.5,
            capture_fps: 5,
            game_context: String::new(),
            target_window: None,
            temperature: 1.0,
            media_resolution: "low".into(),
            action_delay: 0.02,
            max_retries: 2,
            request_timeout_secs: 20,
        }
    }
}

impl AppConfig {
    pub fn capture_duration(&self) -> Duration {
        Duration::from_secs_f64(self.capture_duration)
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_secs_f64(self.action_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_range("capture_duration", self.capture_duration, 0.5, 5.0)?;
        check_range("capture_fps", self.capture_fps as f64, 1.0, 10.0)?;
        check_range("temperature", self.temperature, 0.0, 1.0)?;
        check_range("action_delay", self.action_delay, 0.0, 1.0)?;
        check_range("max_retries", self.max_retries as f64, 0.0, 10.0)?;
        check_range(
            "request_timeout_secs",
            self.request_timeout_secs as f64,
            1.0,
            120.0,
        )?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model",
                reason: "must not be empty".into(),
            });
        }
        if !matches!(self.media_resolution.as_str(), "low" | "default") {
            return Err(ConfigError::Invalid {
                field: "media_resolution",
                reason: format!("expected 'low' or 'default', got '{}'", self.media_resolution),
            });
        }
        Ok(())
    }

    /// Copy suitable for handing back to a client.
    pub fn masked(&self) -> MaskedConfig {
        let key = &self.gemini_api_key;
        let masked_key = if key.is_empty() {
            String::new()
        } else if key.chars().count() > 8 {
            let chars: Vec<char> = key.chars().collect();
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{head}...{tail}")
        } else {
            "***".into()
        };
        MaskedConfig {
            gemini_api_key: masked_key,
            config: self.clone(),
        }
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> std::result::Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskedConfig {
    pub gemini_api_key: String,
    #[serde(flatten)]
    pub config: AppConfig,
}

/// Partial update. Absent fields are left alone; `target_window` may be
/// explicitly set to `null` to go back to full-screen capture.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub gemini_api_key: Option<String>,
    pub model: Option<String>,
    pub capture_duration: Option<f64>,
    pub capture_fps: Option<u32>,
    pub game_context: Option<String>,
    #[serde(deserialize_with = "explicit_null")]
    pub target_window: Option<Option<String>>,
    pub temperature: Option<f64>,
    pub media_resolution: Option<String>,
    pub action_delay: Option<f64>,
    pub max_retries: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

// Present-but-null becomes `Some(None)`; absent stays `None` via `default`.
fn explicit_null<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(Some(value.filter(|title| !title.trim().is_empty())))
}

impl ConfigPatch {
    fn apply_to(self, config: &mut AppConfig) {
        if let Some(v) = self.gemini_api_key {
            config.gemini_api_key = v;
        }
        if let Some(v) = self.model {
            config.model = v;
        }
        if let Some(v) = self.capture_duration {
            config.capture_duration = v;
        }
        if let Some(v) = self.capture_fps {
            config.capture_fps = v;
        }
        if let Some(v) = self.game_context {
            config.game_context = v;
        }
        if let Some(v) = self.target_window {
            config.target_window = v;
        }
        if let Some(v) = self.temperature {
            config.temperature = v;
        }
        if let Some(v) = self.media_resolution {
            config.media_resolution = v;
        }
        if let Some(v) = self.action_delay {
            config.action_delay = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.request_timeout_secs {
            config.request_timeout_secs = v;
        }
    }
}

struct Versioned {
    version: u64,
    config: AppConfig,
}

/// The single synchronized configuration record. Reads copy the record out
/// so a loop iteration never observes a concurrent update half-way through.
#[derive(Clone)]
pub struct ConfigStore {
    path: Option<Arc<PathBuf>>,
    data: Arc<RwLock<Versioned>>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl ConfigStore {
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            path: None,
            data: Arc::new(RwLock::new(Versioned { version: 0, config })),
            writer: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Load persisted settings from `path` (if it exists) and take the API
    /// key from the environment.
    pub fn load(path: PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!("Ignoring unreadable settings {}: {err}", path.display());
                    AppConfig::default()
                }
            }
        } else {
            AppConfig::default()
        };

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.gemini_api_key = key;
        }
        if let Err(err) = config.validate() {
            log::warn!("Persisted settings out of range ({err}), using defaults");
            let key = std::mem::take(&mut config.gemini_api_key);
            config = AppConfig {
                gemini_api_key: key,
                ..AppConfig::default()
            };
        }

        Ok(Self {
            path: Some(Arc::new(path)),
            data: Arc::new(RwLock::new(Versioned { version: 0, config })),
            writer: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn snapshot(&self) -> AppConfig {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Validate and apply `patch`, then write the settings file off the
    /// runtime. A rejected patch leaves the store untouched; a failed write
    /// is logged and the update still stands.
    pub async fn update(&self, patch: ConfigPatch) -> std::result::Result<AppConfig, ConfigError> {
        let updated = self.apply(patch)?;
        if let Err(err) = self.persist().await {
            log::error!("Failed to persist settings: {err:#}");
        }
        Ok(updated)
    }

    fn apply(&self, patch: ConfigPatch) -> std::result::Result<AppConfig, ConfigError> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = guard.config.clone();
        patch.apply_to(&mut candidate);
        candidate.validate()?;

        guard.config = candidate;
        guard.version += 1;
        Ok(guard.config.clone())
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        // Writers queue here and each writes the newest record, so the file
        // never ends up older than the store.
        let _writer = self.writer.lock().await;
        let data = self.snapshot();
        tokio::task::spawn_blocking(move || write_settings(&path, &data))
            .await
            .context("Settings writer panicked")?
    }
}

fn write_settings(path: &Path, data: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(json: &str) -> ConfigPatch {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let store = ConfigStore::in_memory(AppConfig::default());
        let before = store.snapshot();
        store.update(patch(r#"{"capture_fps": 8}"#)).await.unwrap();
        assert_eq!(before.capture_fps, 5);
        assert_eq!(store.snapshot().capture_fps, 8);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn out_of_range_patch_is_rejected_whole() {
        let store = ConfigStore::in_memory(AppConfig::default());
        let err = store
            .update(patch(r#"{"game_context": "platformer", "capture_duration": 9.0}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "capture_duration", .. }));
        assert_eq!(store.snapshot().game_context, "");
        assert_eq!(store.version(), 0);
    }

    #[tokio::test]
    async fn target_window_can_be_cleared_with_null() {
        let store = ConfigStore::in_memory(AppConfig::default());
        store.update(patch(r#"{"target_window": "Celeste"}"#)).await.unwrap();
        assert_eq!(store.snapshot().target_window.as_deref(), Some("Celeste"));

        store.update(patch(r#"{"temperature": 0.5}"#)).await.unwrap();
        assert_eq!(store.snapshot().target_window.as_deref(), Some("Celeste"));

        store.update(patch(r#"{"target_window": null}"#)).await.unwrap();
        assert_eq!(store.snapshot().target_window, None);
    }

    #[tokio::test]
    async fn failed_write_keeps_the_update() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let store = ConfigStore::load(blocker.join("settings.json")).unwrap();

        let updated = store.update(patch(r#"{"capture_fps": 7}"#)).await.unwrap();
        assert_eq!(updated.capture_fps, 7);
        assert_eq!(store.snapshot().capture_fps, 7);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn concurrent_updates_leave_the_newest_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = ConfigStore::load(path.clone()).unwrap();

        let updates = (1..=8).map(|fps| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(patch(&format!(r#"{{"capture_fps": {fps}}}"#)))
                    .await
                    .unwrap()
            })
        });
        for update in updates.collect::<Vec<_>>() {
            update.await.unwrap();
        }

        let written: AppConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.capture_fps, store.snapshot().capture_fps);
        assert_eq!(store.version(), 8);
    }

    #[test]
    fn masks_api_key() {
        let config = AppConfig {
            gemini_api_key: "AIzaSyEXAMPLEKEY1234".into(),
            ..AppConfig::default()
        };
        assert_eq!(config.masked().gemini_api_key, "AIza...1234");

        let short = AppConfig {
            gemini_api_key: "abc".into(),
            ..AppConfig::default()
        };
        assert_eq!(short.masked().gemini_api_key, "***");
    }

    #[tokio::test]
    async fn persists_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = ConfigStore::load(path.clone()).unwrap();
        store
            .update(patch(r#"{"gemini_api_key": "secret-key-value", "capture_fps": 3}"#))
            .await
            .unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("secret-key-value"));
        assert!(written.contains("\"capture_fps\": 3"));
    }
}
