//! Command implementations and controller wiring.

use anyhow::Context;
use clap::Args;
use std::sync::Arc;
use tokio::sync::broadcast;

use sotto_core::{
    list_input_devices, AutostartRegistry, BackendCapture, CaptureEngine, GestureMode,
    HttpBackend, JsonFileStore, MicCapture, SettingsStore, XdgAutostart,
};

use crate::gesture::hotkey_to_key;
use crate::listener::RdevListener;
use crate::session::{ControllerConfig, SessionController, StdoutSink};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Microphone device name (overrides settings)
    #[arg(long)]
    pub device: Option<String>,

    /// Trigger key, e.g. alt_r, shift_l, f5 (overrides settings)
    #[arg(long)]
    pub hotkey: Option<String>,

    /// Gesture mode: hold_down, double_tap or both (overrides settings)
    #[arg(long)]
    pub mode: Option<GestureMode>,

    /// Transcription backend URL (overrides settings)
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Let the backend own the capture instead of recording locally
    #[arg(long)]
    pub remote_capture: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long)]
    pub auto_paste: Option<bool>,

    #[arg(long)]
    pub launch_at_login: Option<bool>,

    #[arg(long)]
    pub hotkey: Option<String>,

    #[arg(long)]
    pub mode: Option<GestureMode>,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long)]
    pub backend_url: Option<String>,

    /// Print the resulting settings
    #[arg(long)]
    pub show: bool,
}

/// Run the dictation controller until interrupted.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let store = JsonFileStore::default_location()?;
    let mut settings = store.load().await?.unwrap_or_default();

    if let Some(device) = args.device {
        settings.microphone_device = Some(device);
    }
    if let Some(hotkey) = args.hotkey {
        settings.hotkey = hotkey;
    }
    if let Some(mode) = args.mode {
        settings.gesture_mode = mode;
    }
    if let Some(url) = args.backend_url {
        settings.backend_url = url;
    }

    if hotkey_to_key(&settings.hotkey).is_none() {
        anyhow::bail!("unknown hotkey '{}'", settings.hotkey);
    }

    let backend = Arc::new(
        HttpBackend::new(&settings.backend_url).context("invalid backend URL")?,
    );
    let engine: Arc<dyn CaptureEngine> = if args.remote_capture {
        Arc::new(BackendCapture::new(Arc::clone(&backend)))
    } else {
        Arc::new(MicCapture::new())
    };
    let registry: Arc<dyn AutostartRegistry> = Arc::new(XdgAutostart::new("sotto")?);

    tracing::info!(
        hotkey = %settings.hotkey,
        mode = ?settings.gesture_mode,
        backend = %settings.backend_url,
        "starting dictation controller"
    );

    let (controller, handle) = SessionController::new(ControllerConfig {
        engine,
        backend,
        sink: Arc::new(StdoutSink),
        store: Arc::new(store),
        registry,
        listener: Box::new(RdevListener::new()),
        settings,
    });

    // Log status transitions for any observer tailing the process
    let mut status_rx = handle.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(status) => tracing::info!(status = %status, "session status"),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
                handle.shutdown();
            }
        });
    }

    controller.run().await;
    Ok(())
}

/// List audio input devices, marking the system default.
pub fn devices() -> anyhow::Result<()> {
    for device in list_input_devices()? {
        let marker = if device.is_default { "*" } else { " " };
        println!("{marker} {}", device.name);
    }
    Ok(())
}

/// Edit the stored settings offline. Live propagation happens in the
/// running controller; this just writes the record.
pub async fn configure(args: ConfigArgs) -> anyhow::Result<()> {
    let store = JsonFileStore::default_location()?;
    let mut settings = store.load().await?.unwrap_or_default();

    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(language) = args.language {
        settings.language = language;
    }
    if let Some(auto_paste) = args.auto_paste {
        settings.auto_paste = auto_paste;
    }
    if let Some(launch) = args.launch_at_login {
        settings.launch_at_login = launch;
    }
    if let Some(hotkey) = args.hotkey {
        if hotkey_to_key(&hotkey).is_none() {
            anyhow::bail!("unknown hotkey '{hotkey}'");
        }
        settings.hotkey = hotkey;
    }
    if let Some(mode) = args.mode {
        settings.gesture_mode = mode;
    }
    if let Some(device) = args.device {
        settings.microphone_device = Some(device);
    }
    if let Some(url) = args.backend_url {
        settings.backend_url = url;
    }

    store.save(&settings).await?;
    println!("settings saved to {}", store.path().display());
    if args.show {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    }
    Ok(())
}
