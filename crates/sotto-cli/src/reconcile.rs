//! Settings reconciliation: optimistic local updates with versioned rollback.
//!
//! An update merges into the current settings and persists immediately, so a
//! crash mid-propagation still preserves user intent, then propagates
//! asynchronously per field group. Each group carries a monotonic version
//! incremented on every attempt; a failed propagation only rolls back when
//! its version is still current, so a superseding update suppresses the
//! stale rollback. Autostart toggles run through a single ordered worker so
//! concurrent flips are never applied out of order.

use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use sotto_core::{
    AutostartRegistry, Error, FieldGroup, Result, Settings, SettingsPatch, SettingsStore,
    TranscriptionBackend,
};

/// Completion of one propagation attempt, resolved back onto the controller.
#[derive(Debug)]
pub struct PropagationOutcome {
    pub group: FieldGroup,
    pub version: u64,
    pub previous: Settings,
    pub result: Result<()>,
}

struct AutostartJob {
    enable: bool,
    version: u64,
    previous: Settings,
}

pub struct Reconciler {
    settings: Settings,
    store: Arc<dyn SettingsStore>,
    backend: Arc<dyn TranscriptionBackend>,
    outcome_tx: UnboundedSender<PropagationOutcome>,
    autostart_tx: UnboundedSender<AutostartJob>,
    transcription_version: u64,
    launch_version: u64,
}

impl Reconciler {
    pub fn new(
        settings: Settings,
        store: Arc<dyn SettingsStore>,
        backend: Arc<dyn TranscriptionBackend>,
        registry: Arc<dyn AutostartRegistry>,
        outcome_tx: UnboundedSender<PropagationOutcome>,
    ) -> Self {
        // Single ordered chain for autostart toggles
        let (autostart_tx, mut autostart_rx) = unbounded_channel::<AutostartJob>();
        let chain_outcomes = outcome_tx.clone();
        tokio::spawn(async move {
            while let Some(job) = autostart_rx.recv().await {
                let result = if job.enable {
                    registry.enable().await
                } else {
                    registry.disable().await
                };
                let _ = chain_outcomes.send(PropagationOutcome {
                    group: FieldGroup::Launch,
                    version: job.version,
                    previous: job.previous,
                    result,
                });
            }
        });

        Self {
            settings,
            store,
            backend,
            outcome_tx,
            autostart_tx,
            transcription_version: 0,
            launch_version: 0,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Merge a partial update, persist, and kick off propagation per group.
    pub async fn apply(&mut self, patch: SettingsPatch) {
        if patch.is_empty() {
            return;
        }
        let previous = self.settings.clone();
        let changed = self.settings.merge(&patch);
        if changed.is_empty() {
            return;
        }

        // Persist before propagating
        if let Err(e) = self.store.save(&self.settings).await {
            tracing::error!("failed to persist settings: {e}");
        }

        for group in changed {
            match group {
                FieldGroup::Transcription => {
                    self.transcription_version += 1;
                    let version = self.transcription_version;
                    let backend = Arc::clone(&self.backend);
                    let outcomes = self.outcome_tx.clone();
                    let model = self.settings.model.clone();
                    let language = self.settings.language.clone();
                    let auto_paste = self.settings.auto_paste;
                    let previous = previous.clone();
                    tokio::spawn(async move {
                        let result = backend.configure(&model, &language, auto_paste).await;
                        let _ = outcomes.send(PropagationOutcome {
                            group: FieldGroup::Transcription,
                            version,
                            previous,
                            result,
                        });
                    });
                }
                FieldGroup::Launch => {
                    self.launch_version += 1;
                    let _ = self.autostart_tx.send(AutostartJob {
                        enable: self.settings.launch_at_login,
                        version: self.launch_version,
                        previous: previous.clone(),
                    });
                }
            }
        }
    }

    /// Resolve a propagation completion: confirm, roll back, or discard stale.
    pub async fn complete(&mut self, outcome: PropagationOutcome) {
        let current_version = match outcome.group {
            FieldGroup::Transcription => self.transcription_version,
            FieldGroup::Launch => self.launch_version,
        };

        match outcome.result {
            Ok(()) => {
                tracing::debug!(group = outcome.group.as_str(), "settings propagation confirmed");
            }
            Err(e) => {
                if outcome.version != current_version {
                    // Superseded by a newer attempt; its rollback is suppressed
                    tracing::debug!(
                        group = outcome.group.as_str(),
                        "{}: propagation failure discarded",
                        Error::StaleRequest
                    );
                    return;
                }
                tracing::error!(
                    group = outcome.group.as_str(),
                    "settings propagation failed, rolling back: {e}"
                );
                self.settings.restore_group(outcome.group, &outcome.previous);
                if let Err(e) = self.store.save(&self.settings).await {
                    tracing::error!("failed to persist rollback: {e}");
                }
            }
        }
    }
}
