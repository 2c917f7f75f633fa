pub mod audio;
pub mod autostart;
pub mod backend;
pub mod error;
pub mod resample;
pub mod settings;
pub mod status;

pub use audio::{
    finalize_clip, list_input_devices, CaptureEngine, EncodedClip, InputDeviceInfo, MicCapture,
    StopOutcome,
};
pub use autostart::{AutostartRegistry, XdgAutostart};
pub use backend::{BackendCapture, HttpBackend, Transcript, TranscriptionBackend};
pub use error::{Error, Result};
pub use resample::TARGET_SAMPLE_RATE;
pub use settings::{FieldGroup, GestureMode, JsonFileStore, Settings, SettingsPatch, SettingsStore};
pub use status::SessionStatus;
