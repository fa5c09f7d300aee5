use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pipeline::WorkflowState;
use crate::store::{KeyValueStore, STATUS_KEY, get_json, put_json};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorHint {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub stage: WorkflowState,
    pub message: String,
    pub color: ColorHint,
    pub fraction: f64,
}

impl ProgressEvent {
    pub fn new(stage: WorkflowState, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            color: ColorHint::Info,
            fraction: 0.0,
        }
    }

    pub fn with_color(mut self, color: ColorHint) -> Self {
        self.color = color;
        self
    }

    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Durable copy of the latest progress event (key `data`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSlot {
    #[serde(rename = "type")]
    pub kind: WorkflowState,
    pub text: String,
    pub color: ColorHint,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StatusSlot {
    fn from_event(event: &ProgressEvent, data: Option<serde_json::Value>) -> Self {
        Self {
            kind: event.stage,
            text: event.message.clone(),
            color: event.color,
            value: event.fraction,
            data,
        }
    }
}

/// Fire-and-forget relay from a running workflow to whoever is watching.
#[derive(Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
    store: Arc<dyn KeyValueStore>,
}

impl ProgressChannel {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, store }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub async fn emit(&self, event: ProgressEvent) {
        self.emit_with_data(event, None).await;
    }

    pub async fn emit_with_data(&self, event: ProgressEvent, data: Option<serde_json::Value>) {
        tracing::debug!(
            stage = ?event.stage,
            fraction = event.fraction,
            message = %event.message,
            "progress"
        );

        let slot = StatusSlot::from_event(&event, data);
        if let Err(err) = put_json(self.store.as_ref(), STATUS_KEY, &slot).await {
            tracing::warn!(?err, "failed to write status slot");
        }

        // No live subscriber is not an error.
        let _ = self.tx.send(event);
    }
}

/// Poller-side de-duplication state, reset whenever the status kind changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverState {
    pub last_status_kind: Option<WorkflowState>,
    pub repeat_count: u32,
}

pub struct StatusObserver {
    store: Arc<dyn KeyValueStore>,
    poll_interval: Duration,
    max_terminal_repeats: u32,
    state: ObserverState,
}

impl StatusObserver {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
    pub const DEFAULT_MAX_TERMINAL_REPEATS: u32 = 5;

    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_terminal_repeats: Self::DEFAULT_MAX_TERMINAL_REPEATS,
            state: ObserverState::default(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_terminal_repeats(mut self, max_terminal_repeats: u32) -> Self {
        self.max_terminal_repeats = max_terminal_repeats;
        self
    }

    pub fn state(&self) -> &ObserverState {
        &self.state
    }

    /// Feed one poll result. Returns `None` once a terminal status has been
    /// seen for more than `max_terminal_repeats` consecutive polls.
    pub fn observe(&mut self, slot: StatusSlot) -> Option<StatusSlot> {
        if self.state.last_status_kind == Some(slot.kind) {
            self.state.repeat_count = self.state.repeat_count.saturating_add(1);
        } else {
            self.state.last_status_kind = Some(slot.kind);
            self.state.repeat_count = 0;
        }

        if slot.kind.is_terminal() && self.state.repeat_count > self.max_terminal_repeats {
            return None;
        }
        Some(slot)
    }

    pub async fn poll_once(&mut self) -> anyhow::Result<Option<StatusSlot>> {
        let slot: Option<StatusSlot> = get_json(self.store.as_ref(), STATUS_KEY).await?;
        Ok(slot.and_then(|slot| self.observe(slot)))
    }

    /// Poll until a terminal status goes stale, handing each changed status
    /// to `on_status`.
    pub async fn watch<F>(&mut self, mut on_status: F) -> anyhow::Result<()>
    where
        F: FnMut(&StatusSlot),
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_shown: Option<StatusSlot> = None;

        loop {
            ticker.tick().await;
            let slot: Option<StatusSlot> = match get_json(self.store.as_ref(), STATUS_KEY).await {
                Ok(slot) => slot,
                Err(err) => {
                    tracing::debug!(?err, "status slot unreadable; retrying");
                    continue;
                }
            };
            let Some(slot) = slot else {
                continue;
            };
            let Some(slot) = self.observe(slot) else {
                return Ok(());
            };
            if last_shown.as_ref() != Some(&slot) {
                on_status(&slot);
                last_shown = Some(slot);
            }
        }
    }
}
