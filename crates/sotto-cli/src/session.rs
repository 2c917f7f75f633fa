//! Session controller.
//!
//! One task owns the session state machine and a single mailbox. Gesture
//! intents, UI actions, settings patches and async completions are processed
//! strictly in arrival order; every native call is awaited, and the long
//! stop-and-transcribe chain runs as a spawned task that reports back
//! through the mailbox so new intents keep flowing while it is outstanding.
//! The single-flight capture guard lives in the state machine: a start
//! while a stop is processing is ignored, never queued.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, Duration, Instant};

use sotto_core::{
    AutostartRegistry, CaptureEngine, Error, SessionStatus, Settings, SettingsPatch,
    SettingsStore, StopOutcome, Transcript, TranscriptionBackend,
};

use crate::gesture::{
    hotkey_to_key, ClickArbiter, ClickDecision, GestureDetector, GestureIntent,
    LISTENER_RESTART_DELAY_MS, SHORT_TAP_MS,
};
use crate::listener::{InputEvent, InputListener};
use crate::reconcile::{PropagationOutcome, Reconciler};

/// Downstream consumer of finished transcripts. History persistence lives
/// behind this seam.
#[async_trait]
pub trait TranscriptSink: Send + Sync + 'static {
    async fn deliver(&self, transcript: &Transcript) -> anyhow::Result<()>;
}

/// Prints transcripts to stdout.
pub struct StdoutSink;

#[async_trait]
impl TranscriptSink for StdoutSink {
    async fn deliver(&self, transcript: &Transcript) -> anyhow::Result<()> {
        println!("{}", transcript.text);
        Ok(())
    }
}

/// Explicit action from the UI surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    /// Single click: toggle recording
    Toggle,
    /// Double click: sticky recording mode
    ToggleLock,
    /// Manual restart after the listener went inert
    RetryListener,
}

pub(crate) enum ControllerMsg {
    Input(InputEvent),
    Intent(GestureIntent),
    Ui(UiAction),
    Settings(SettingsPatch),
    ClickTimer(u64),
    CaptureFinished(Result<Option<Transcript>, Error>),
    Propagation(PropagationOutcome),
    ListenerRetry,
    Shutdown,
}

/// Cheap handle for driving a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: UnboundedSender<ControllerMsg>,
    status_tx: broadcast::Sender<SessionStatus>,
}

impl ControllerHandle {
    pub fn intent(&self, intent: GestureIntent) {
        let _ = self.tx.send(ControllerMsg::Intent(intent));
    }

    pub fn click(&self) {
        let _ = self.tx.send(ControllerMsg::Input(InputEvent::Click));
    }

    pub fn update_settings(&self, patch: SettingsPatch) {
        let _ = self.tx.send(ControllerMsg::Settings(patch));
    }

    pub fn retry_listener(&self) {
        let _ = self.tx.send(ControllerMsg::Ui(UiAction::RetryListener));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ControllerMsg::Shutdown);
    }

    /// Subscribe to the status broadcast. Delivery is at-least-once;
    /// subscribers must tolerate duplicate identical events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }
}

struct Session {
    status: SessionStatus,
    /// Sticky recording flag; meaningful only while not idle
    locked: bool,
    started_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerHealth {
    Running,
    RetryScheduled,
    Inert,
}

pub struct ControllerConfig {
    pub engine: Arc<dyn CaptureEngine>,
    pub backend: Arc<dyn TranscriptionBackend>,
    pub sink: Arc<dyn TranscriptSink>,
    pub store: Arc<dyn SettingsStore>,
    pub registry: Arc<dyn AutostartRegistry>,
    pub listener: Box<dyn InputListener>,
    pub settings: Settings,
}

pub struct SessionController {
    rx: UnboundedReceiver<ControllerMsg>,
    tx: UnboundedSender<ControllerMsg>,
    status_tx: broadcast::Sender<SessionStatus>,
    engine: Arc<dyn CaptureEngine>,
    backend: Arc<dyn TranscriptionBackend>,
    sink: Arc<dyn TranscriptSink>,
    listener: Box<dyn InputListener>,
    session: Session,
    gestures: GestureDetector,
    arbiter: ClickArbiter,
    reconciler: Reconciler,
    listener_health: ListenerHealth,
    listener_retry_used: bool,
}

impl SessionController {
    /// Build a controller and its handle. Must be called within a runtime;
    /// the reconciler and completion forwarders spawn immediately.
    pub fn new(config: ControllerConfig) -> (Self, ControllerHandle) {
        let (tx, rx) = unbounded_channel();
        let (status_tx, _) = broadcast::channel(16);

        // Propagation completions resolve back onto the controller mailbox
        let (outcome_tx, mut outcome_rx) = unbounded_channel();
        {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(outcome) = outcome_rx.recv().await {
                    if tx.send(ControllerMsg::Propagation(outcome)).is_err() {
                        break;
                    }
                }
            });
        }

        let gestures = GestureDetector::new(
            config.settings.gesture_mode,
            hotkey_to_key(&config.settings.hotkey),
            Duration::from_millis(SHORT_TAP_MS),
        );
        let reconciler = Reconciler::new(
            config.settings,
            config.store,
            Arc::clone(&config.backend),
            config.registry,
            outcome_tx,
        );

        let handle = ControllerHandle {
            tx: tx.clone(),
            status_tx: status_tx.clone(),
        };

        let controller = Self {
            rx,
            tx,
            status_tx,
            engine: config.engine,
            backend: config.backend,
            sink: config.sink,
            listener: config.listener,
            session: Session {
                status: SessionStatus::Idle,
                locked: false,
                started_at: None,
            },
            gestures,
            arbiter: ClickArbiter::new(),
            reconciler,
            listener_health: ListenerHealth::Running,
            listener_retry_used: false,
        };
        (controller, handle)
    }

    pub async fn run(mut self) {
        self.start_listener();
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ControllerMsg::Shutdown => break,
                other => self.handle(other).await,
            }
        }
        self.listener.stop();
    }

    async fn handle(&mut self, msg: ControllerMsg) {
        match msg {
            ControllerMsg::Input(InputEvent::ListenerError(reason)) => {
                self.on_listener_down(&reason);
            }
            ControllerMsg::Input(InputEvent::Click) => self.on_click().await,
            ControllerMsg::Input(event) => {
                let intents = self.gestures.handle_event(&event);
                for intent in intents {
                    self.on_intent(intent).await;
                }
            }
            ControllerMsg::Intent(intent) => self.on_intent(intent).await,
            ControllerMsg::Ui(action) => self.on_ui(action).await,
            ControllerMsg::Settings(patch) => self.reconciler.apply(patch).await,
            ControllerMsg::Propagation(outcome) => self.reconciler.complete(outcome).await,
            ControllerMsg::ClickTimer(generation) => {
                if self.arbiter.on_timer(generation) {
                    self.on_ui(UiAction::Toggle).await;
                }
            }
            ControllerMsg::CaptureFinished(result) => self.on_capture_finished(result).await,
            ControllerMsg::ListenerRetry => self.retry_listener_now(),
            ControllerMsg::Shutdown => {}
        }
    }

    async fn on_intent(&mut self, intent: GestureIntent) {
        match intent {
            GestureIntent::StartHold => self.start_capture(false).await,
            GestureIntent::StopHold => {
                if self.session.status == SessionStatus::Recording && !self.session.locked {
                    self.begin_stop();
                }
            }
            GestureIntent::ToggleDoubleTap => self.toggle(true).await,
            GestureIntent::CancelShortTap => self.cancel_capture().await,
        }
    }

    async fn on_ui(&mut self, action: UiAction) {
        match action {
            UiAction::Toggle => self.toggle(false).await,
            UiAction::ToggleLock => match self.session.status {
                SessionStatus::Idle => self.start_capture(true).await,
                SessionStatus::Recording => {
                    self.session.locked = !self.session.locked;
                    tracing::info!(locked = self.session.locked, "recording lock toggled");
                }
                SessionStatus::Processing => {}
            },
            UiAction::RetryListener => {
                self.listener_retry_used = false;
                self.retry_listener_now();
            }
        }
    }

    async fn on_click(&mut self) {
        match self.arbiter.on_click() {
            ClickDecision::Scheduled(generation) => {
                let tx = self.tx.clone();
                let delay = self.arbiter.delay();
                tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = tx.send(ControllerMsg::ClickTimer(generation));
                });
            }
            ClickDecision::DoubleClick => self.on_ui(UiAction::ToggleLock).await,
        }
    }

    async fn toggle(&mut self, locked_on_start: bool) {
        match self.session.status {
            SessionStatus::Idle => self.start_capture(locked_on_start).await,
            SessionStatus::Recording => self.begin_stop(),
            SessionStatus::Processing => {
                tracing::debug!("toggle ignored while processing");
            }
        }
    }

    async fn start_capture(&mut self, locked: bool) {
        match self.session.status {
            SessionStatus::Recording => {
                tracing::debug!("start ignored, already recording");
                return;
            }
            SessionStatus::Processing => {
                // Single-flight guard
                tracing::debug!("start ignored while a stop is processing");
                return;
            }
            SessionStatus::Idle => {}
        }

        self.session.locked = locked;
        let device = self.reconciler.settings().microphone_device.clone();
        match self.engine.start(device).await {
            Ok(()) => {
                self.session.status = SessionStatus::Recording;
                self.session.started_at = Some(Instant::now());
                self.publish_status();
                self.gestures.set_recording(true);
                tracing::info!(locked, "recording started");
            }
            Err(e) => {
                // Stay idle and clear the optimistic lock
                self.session.locked = false;
                self.publish_status();
                tracing::error!("failed to start capture: {e}");
            }
        }
    }

    fn begin_stop(&mut self) {
        if self.session.status != SessionStatus::Recording {
            return;
        }
        if let Some(started_at) = self.session.started_at {
            tracing::debug!(
                "stopping after {:.1}s of recording",
                started_at.elapsed().as_secs_f64()
            );
        }
        self.session.status = SessionStatus::Processing;
        self.publish_status();
        self.gestures.set_recording(false);

        let engine = Arc::clone(&self.engine);
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = stop_and_transcribe(engine, backend).await;
            let _ = tx.send(ControllerMsg::CaptureFinished(result));
        });
    }

    async fn on_capture_finished(&mut self, result: Result<Option<Transcript>, Error>) {
        self.session.status = SessionStatus::Idle;
        self.session.locked = false;
        self.session.started_at = None;
        self.publish_status();
        self.gestures.set_recording(false);

        match result {
            Ok(Some(transcript)) => {
                tracing::info!(
                    duration_secs = transcript.duration_secs,
                    "transcription complete"
                );
                if let Err(e) = self.sink.deliver(&transcript).await {
                    tracing::error!("transcript sink failed: {e}");
                }
            }
            Ok(None) => tracing::info!("no audio captured"),
            Err(e) => tracing::error!("stop failed: {e}"),
        }
    }

    async fn cancel_capture(&mut self) {
        if self.session.status != SessionStatus::Recording {
            tracing::debug!("cancel ignored, nothing recording");
            return;
        }
        if let Err(e) = self.engine.cancel().await {
            tracing::warn!("cancel: {e}");
        }
        self.session.status = SessionStatus::Idle;
        self.session.locked = false;
        self.session.started_at = None;
        self.publish_status();
        self.gestures.set_recording(false);
        tracing::info!("short tap, capture discarded");
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.session.status);
    }

    // -- Listener supervision --

    fn start_listener(&mut self) {
        let (raw_tx, mut raw_rx) = unbounded_channel();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if tx.send(ControllerMsg::Input(event)).is_err() {
                    break;
                }
            }
        });
        match self.listener.start(raw_tx) {
            Ok(()) => {
                self.listener_health = ListenerHealth::Running;
                tracing::info!("input listener running");
            }
            Err(e) => self.on_listener_down(&e.to_string()),
        }
    }

    fn on_listener_down(&mut self, reason: &str) {
        match self.listener_health {
            ListenerHealth::RetryScheduled | ListenerHealth::Inert => {
                tracing::debug!("duplicate listener failure ignored: {reason}");
                return;
            }
            ListenerHealth::Running => {}
        }
        tracing::warn!("input listener down: {reason}");

        if !self.listener_retry_used {
            // Exactly one automatic restart after a fixed backoff
            self.listener_retry_used = true;
            self.listener_health = ListenerHealth::RetryScheduled;
            let tx = self.tx.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(LISTENER_RESTART_DELAY_MS)).await;
                let _ = tx.send(ControllerMsg::ListenerRetry);
            });
        } else {
            self.listener_health = ListenerHealth::Inert;
            tracing::error!("input listener failed again; gestures inert until manual retry");
        }
    }

    fn retry_listener_now(&mut self) {
        tracing::info!("restarting input listener");
        self.listener_health = ListenerHealth::Running;
        self.start_listener();
    }
}

async fn stop_and_transcribe(
    engine: Arc<dyn CaptureEngine>,
    backend: Arc<dyn TranscriptionBackend>,
) -> Result<Option<Transcript>, Error> {
    match engine.stop().await? {
        StopOutcome::Transcript(transcript) => Ok(Some(transcript)),
        StopOutcome::Clip(clip) => {
            if clip.is_empty() {
                return Ok(None);
            }
            let transcript = backend.transcribe(&clip).await?;
            Ok(Some(transcript))
        }
    }
}
