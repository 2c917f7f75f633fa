//! OS autostart registry: binary enable/disable, no partial states.
//!
//! The shipped implementation manages an XDG autostart desktop entry.
//! Enable writes the entry, disable removes it, and enabled-state is the
//! entry's existence.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{Error, Result};

#[async_trait]
pub trait AutostartRegistry: Send + Sync + 'static {
    async fn enable(&self) -> Result<()>;
    async fn disable(&self) -> Result<()>;
    async fn is_enabled(&self) -> Result<bool>;
}

/// XDG autostart implementation writing `~/.config/autostart/<name>.desktop`.
pub struct XdgAutostart {
    entry_path: PathBuf,
    app_name: String,
    exec: String,
}

impl XdgAutostart {
    /// Registry for the current executable.
    pub fn new(app_name: &str) -> Result<Self> {
        let exec = std::env::current_exe()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| app_name.to_string());
        let dir = autostart_dir().ok_or_else(|| Error::ConfigPropagationFailure {
            group: "launch_at_login",
            reason: "could not resolve autostart directory".into(),
        })?;
        Ok(Self::with_dir(dir, app_name, &exec))
    }

    /// Registry rooted at an explicit directory. Used by tests.
    pub fn with_dir(dir: PathBuf, app_name: &str, exec: &str) -> Self {
        Self {
            entry_path: dir.join(format!("{app_name}.desktop")),
            app_name: app_name.to_string(),
            exec: exec.to_string(),
        }
    }

    fn desktop_entry(&self) -> String {
        format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Version=1.0\n\
             Name={}\n\
             Comment=Voice dictation controller\n\
             Exec={}\n\
             StartupNotify=false\n\
             Terminal=false\n",
            self.app_name, self.exec
        )
    }

    fn propagation_error(&self, e: impl std::fmt::Display) -> Error {
        Error::ConfigPropagationFailure {
            group: "launch_at_login",
            reason: format!("{}: {e}", self.entry_path.display()),
        }
    }
}

fn autostart_dir() -> Option<PathBuf> {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(config_home).join("autostart"));
    }
    dirs::config_dir().map(|dir| dir.join("autostart"))
}

#[async_trait]
impl AutostartRegistry for XdgAutostart {
    async fn enable(&self) -> Result<()> {
        if let Some(parent) = self.entry_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.propagation_error(e))?;
        }
        tokio::fs::write(&self.entry_path, self.desktop_entry())
            .await
            .map_err(|e| self.propagation_error(e))?;
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.entry_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.propagation_error(e)),
        }
    }

    async fn is_enabled(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.entry_path)
            .await
            .unwrap_or(false))
    }
}
