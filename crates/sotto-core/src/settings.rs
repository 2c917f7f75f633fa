//! User settings: the persisted record, partial updates, and the key-value store.
//!
//! The store is whole-object get/set. Fields split into two reconciled groups,
//! each guarded by its own version counter in the reconciler:
//! `{model, language, auto_paste}` propagates to the transcription backend and
//! `{launch_at_login}` to the OS autostart registry. The remaining fields are
//! local-only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Gesture detection mode for the input listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GestureMode {
    #[default]
    HoldDown,
    DoubleTap,
    Both,
}

impl std::str::FromStr for GestureMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hold_down" | "hold" => Ok(GestureMode::HoldDown),
            "double_tap" => Ok(GestureMode::DoubleTap),
            "both" => Ok(GestureMode::Both),
            _ => Err(format!(
                "unknown gesture mode '{s}'. Available: hold_down, double_tap, both"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Transcription model name, forwarded to the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Transcription language code
    #[serde(default = "default_language")]
    pub language: String,

    /// Whether the backend should paste the transcript into the active window
    #[serde(default)]
    pub auto_paste: bool,

    /// Start the app at login via the OS autostart registry
    #[serde(default)]
    pub launch_at_login: bool,

    /// Trigger key for gesture detection
    #[serde(default = "default_hotkey")]
    pub hotkey: String,

    #[serde(default)]
    pub gesture_mode: GestureMode,

    /// Selected microphone device name (None = system default)
    #[serde(default)]
    pub microphone_device: Option<String>,

    /// Transcription backend base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

fn default_model() -> String {
    "base.en".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_hotkey() -> String {
    "alt_r".to_string()
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8765".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
            auto_paste: false,
            launch_at_login: false,
            hotkey: default_hotkey(),
            gesture_mode: GestureMode::default(),
            microphone_device: None,
            backend_url: default_backend_url(),
        }
    }
}

/// Settings field group, the unit of versioning and rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    /// `{model, language, auto_paste}`, confirmed by the transcription backend
    Transcription,
    /// `{launch_at_login}`, confirmed by the autostart registry
    Launch,
}

impl FieldGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldGroup::Transcription => "transcription",
            FieldGroup::Launch => "launch_at_login",
        }
    }
}

/// Partial update over the reconciled settings fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub model: Option<String>,
    pub language: Option<String>,
    pub auto_paste: Option<bool>,
    pub launch_at_login: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.language.is_none()
            && self.auto_paste.is_none()
            && self.launch_at_login.is_none()
    }
}

impl Settings {
    /// Merge a partial update, returning the groups whose values actually changed.
    pub fn merge(&mut self, patch: &SettingsPatch) -> Vec<FieldGroup> {
        let mut transcription_changed = false;
        let mut launch_changed = false;

        if let Some(model) = &patch.model {
            if *model != self.model {
                self.model = model.clone();
                transcription_changed = true;
            }
        }
        if let Some(language) = &patch.language {
            if *language != self.language {
                self.language = language.clone();
                transcription_changed = true;
            }
        }
        if let Some(auto_paste) = patch.auto_paste {
            if auto_paste != self.auto_paste {
                self.auto_paste = auto_paste;
                transcription_changed = true;
            }
        }
        if let Some(launch) = patch.launch_at_login {
            if launch != self.launch_at_login {
                self.launch_at_login = launch;
                launch_changed = true;
            }
        }

        let mut changed = Vec::new();
        if transcription_changed {
            changed.push(FieldGroup::Transcription);
        }
        if launch_changed {
            changed.push(FieldGroup::Launch);
        }
        changed
    }

    /// Copy one group's fields from `source`, used by the rollback protocol.
    pub fn restore_group(&mut self, group: FieldGroup, source: &Settings) {
        match group {
            FieldGroup::Transcription => {
                self.model = source.model.clone();
                self.language = source.language.clone();
                self.auto_paste = source.auto_paste;
            }
            FieldGroup::Launch => {
                self.launch_at_login = source.launch_at_login;
            }
        }
    }
}

/// Whole-object persistent settings store.
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    /// Load the stored record, or None if nothing has been saved yet.
    async fn load(&self) -> Result<Option<Settings>>;

    async fn save(&self, settings: &Settings) -> Result<()>;
}

/// JSON file store under the per-user config directory.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location (`<config dir>/sotto/settings.json`).
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Store("could not resolve user config directory".into()))?;
        Ok(Self::new(dir.join("sotto").join("settings.json")))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Settings>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Store(format!("read {}: {e}", self.path.display()))),
        };
        let settings = serde_json::from_str(&contents)
            .map_err(|e| Error::Store(format!("parse {}: {e}", self.path.display())))?;
        Ok(Some(settings))
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Store(format!("create {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| Error::Store(format!("serialize settings: {e}")))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::Store(format!("write {}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_reports_changed_groups() {
        let mut settings = Settings::default();
        let changed = settings.merge(&SettingsPatch {
            model: Some("large-v3-turbo".into()),
            launch_at_login: Some(true),
            ..Default::default()
        });
        assert_eq!(changed, vec![FieldGroup::Transcription, FieldGroup::Launch]);
        assert_eq!(settings.model, "large-v3-turbo");
        assert!(settings.launch_at_login);
    }

    #[test]
    fn merge_same_value_is_not_a_change() {
        let mut settings = Settings::default();
        let changed = settings.merge(&SettingsPatch {
            model: Some(settings.model.clone()),
            auto_paste: Some(false),
            ..Default::default()
        });
        assert!(changed.is_empty());
    }

    #[test]
    fn restore_group_reverts_only_that_group() {
        let before = Settings::default();
        let mut settings = Settings::default();
        settings.model = "large-v3-turbo".into();
        settings.language = "de".into();
        settings.launch_at_login = true;

        settings.restore_group(FieldGroup::Transcription, &before);
        assert_eq!(settings.model, before.model);
        assert_eq!(settings.language, before.language);
        // Launch group untouched
        assert!(settings.launch_at_login);
    }

    #[test]
    fn settings_roundtrip_serde() {
        let mut settings = Settings::default();
        settings.gesture_mode = GestureMode::Both;
        settings.microphone_device = Some("USB Microphone".into());
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        assert!(store.load().await.unwrap().is_none());

        let mut settings = Settings::default();
        settings.model = "small.en".into();
        store.save(&settings).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, settings);
    }
}
