use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One row of a send run. `phone` is an opaque digits-only identifier used
/// solely to build the deep link; normalization happens in `ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub phone: String,
    pub message: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Per-recipient outcome emitted by the batch runner, one per input row.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub index: usize,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Which ladder rung (or the Enter fallback) triggered the send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Events emitted by an active monitor, polled through the HTTP layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorEvent {
    Recipient {
        index: usize,
        total: usize,
        phone: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Completed {
        total: usize,
        clicks: u64,
    },
}

/// Callback sink for monitor events. Invoked synchronously from the monitor
/// task; implementations must not block.
pub type EventSink = Arc<dyn Fn(MonitorEvent) + Send + Sync>;

/// Cooperative cancellation flag shared between a loop and its controller.
///
/// Loops observe the flag at their defined checkpoints; nothing is forcibly
/// interrupted mid-navigation or mid-wait.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live statistics of the monitor loop.
///
/// Mutated only from the monitor task; any number of status-polling callers
/// read it concurrently. Counter fields are atomics, the current-position
/// marker sits behind a short-lived lock that is never held across an await.
#[derive(Debug, Default)]
pub struct MonitorStats {
    running: AtomicBool,
    clicks: AtomicU64,
    /// Unix millis of the last successful click; 0 = never.
    last_click_ms: AtomicU64,
    current: std::sync::RwLock<Option<String>>,
}

impl MonitorStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn record_click(&self) {
        self.clicks.fetch_add(1, Ordering::SeqCst);
        self.last_click_ms
            .store(chrono::Utc::now().timestamp_millis() as u64, Ordering::SeqCst);
    }

    pub fn clicks(&self) -> u64 {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn set_current(&self, marker: impl Into<String>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(marker.into());
    }

    pub fn snapshot(&self) -> MonitorStatsSnapshot {
        let last = self.last_click_ms.load(Ordering::SeqCst);
        MonitorStatsSnapshot {
            running: self.is_running(),
            clicks: self.clicks(),
            last_click_ms: (last > 0).then_some(last),
            current: self
                .current
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

/// Point-in-time copy of [`MonitorStats`] for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatsSnapshot {
    pub running: bool,
    pub clicks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_click_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}
