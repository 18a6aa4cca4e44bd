use crate::core::types::MonitorEvent;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Most recent monitor events retained for status polling.
pub const EVENT_HISTORY_CAP: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<crate::core::jobs::JobRegistry>,
    pub monitor: Arc<crate::automation::monitor::MonitorRegistry>,
    /// Rolling buffer the monitor's event sink feeds; the aggregation and
    /// the history cap live here, outside the automation core.
    pub monitor_events: Arc<Mutex<VecDeque<MonitorEvent>>>,
    /// File-based config loaded from `wa-courier.json` (env-var fallback for all fields).
    pub config: Arc<crate::core::config::CourierConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("host", &self.config.resolve_host())
            .finish()
    }
}

impl AppState {
    pub fn new(config: crate::core::config::CourierConfig) -> Self {
        Self {
            jobs: Arc::new(crate::core::jobs::JobRegistry::new()),
            monitor: Arc::new(crate::automation::monitor::MonitorRegistry::new()),
            monitor_events: Arc::new(Mutex::new(VecDeque::with_capacity(EVENT_HISTORY_CAP))),
            config: Arc::new(config),
        }
    }

    /// Append to the rolling event buffer, dropping the oldest entry at cap.
    pub fn push_monitor_event(&self, event: MonitorEvent) {
        let mut events = self.monitor_events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == EVENT_HISTORY_CAP {
            events.pop_front();
        }
        events.push_back(event);
    }
}
