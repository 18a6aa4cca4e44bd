//! Monitor loop: a long-lived background task that walks a recipient list
//! (CSV sub-mode) or auto-clicks the send control whenever one appears
//! (watch sub-mode), with live stats and cooperative stop.
//!
//! At most one monitor exists process-wide. The registry's check-and-set
//! slot replaces a bare "current monitor" global: a second start while one
//! is active is an idempotent no-op, never a second session.

use crate::automation::actuator::{self, SendTuning};
use crate::automation::driver::ChatPage;
use crate::automation::session::{self, ChatSession, SessionProfile, SetupError};
use crate::core::config::CourierConfig;
use crate::core::types::{CancelFlag, EventSink, MonitorEvent, MonitorStats, Recipient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const WATCH_TICK: Duration = Duration::from_millis(500);

/// Minimum quiet window between two auto-clicks in watch mode. The tick
/// itself is the retry loop; the debounce keeps one composed message from
/// being double-triggered by adjacent ticks.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(1500);

#[derive(Clone)]
pub struct MonitorOptions {
    /// Recipient walk for CSV sub-mode; empty selects watch sub-mode.
    pub rows: Vec<Recipient>,
    pub delay: Duration,
    pub host: String,
    pub on_event: EventSink,
}

/// Live handle to the one active monitor: stats by reference plus the
/// cancellation capability. Held by the registry slot.
pub struct MonitorHandle {
    pub stats: Arc<MonitorStats>,
    cancel: CancelFlag,
    session: std::sync::RwLock<Option<Arc<ChatSession>>>,
    finished: AtomicBool,
}

impl MonitorHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            stats: MonitorStats::new(),
            cancel: CancelFlag::new(),
            session: std::sync::RwLock::new(None),
            finished: AtomicBool::new(false),
        })
    }

    pub fn is_active(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }

    fn current_session(&self) -> Option<Arc<ChatSession>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_session(&self, session: Arc<ChatSession>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StartOutcome {
    pub started: bool,
    pub already_running: bool,
}

enum SessionSource {
    Launch(Box<CourierConfig>),
    Existing(Arc<ChatSession>),
}

#[derive(Default)]
pub struct MonitorRegistry {
    slot: tokio::sync::Mutex<Option<Arc<MonitorHandle>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a monitor with its own monitor-profile session. Returns
    /// immediately; session launch, the login wait, and the loop itself all
    /// run on a detached task, observed through [`MonitorRegistry::stats`]
    /// and the event sink.
    pub async fn start(&self, cfg: &CourierConfig, opts: MonitorOptions) -> StartOutcome {
        self.start_inner(SessionSource::Launch(Box::new(cfg.clone())), opts)
            .await
    }

    /// Start a monitor on an already-open session. The login wait still
    /// runs against it.
    pub async fn start_with_session(
        &self,
        session: Arc<ChatSession>,
        opts: MonitorOptions,
    ) -> StartOutcome {
        self.start_inner(SessionSource::Existing(session), opts).await
    }

    async fn start_inner(&self, source: SessionSource, opts: MonitorOptions) -> StartOutcome {
        let mut slot = self.slot.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.is_active() {
                info!("monitor: start requested while already running, ignoring");
                return StartOutcome {
                    started: false,
                    already_running: true,
                };
            }
        }

        let handle = MonitorHandle::new();
        handle.stats.set_running(true);
        handle.stats.set_current("starting");
        *slot = Some(Arc::clone(&handle));
        drop(slot);

        tokio::spawn(run_monitor(source, opts, handle));
        StartOutcome {
            started: true,
            already_running: false,
        }
    }

    /// Request a cooperative stop and close the session. Returns `false`
    /// when no monitor was running. Safe to call while the loop is
    /// mid-navigation or mid-wait; the loop observes the flag at its next
    /// checkpoint.
    pub async fn stop(&self) -> bool {
        let taken = self.slot.lock().await.take();
        let Some(handle) = taken else {
            return false;
        };
        let was_active = handle.is_active();
        handle.cancel.cancel();
        handle.stats.set_running(false);
        if let Some(session) = handle.current_session() {
            session.close().await;
        }
        if was_active {
            info!("monitor: stop requested");
        }
        was_active
    }

    /// Stats of the active (or most recently finished, not yet replaced)
    /// monitor.
    pub async fn stats(&self) -> Option<Arc<MonitorStats>> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|h| Arc::clone(&h.stats))
    }

    /// PNG of the monitor session's current page, or `None` when no page is
    /// open: a defined empty result, not an error (the caller typically
    /// wants to see a pending login QR code).
    pub async fn screenshot(&self) -> Option<Vec<u8>> {
        let handle = self.slot.lock().await.as_ref().cloned()?;
        let session = handle.current_session()?;
        if session.is_closed() {
            return None;
        }
        session.page().screenshot().await.ok()
    }
}

/// Detached monitor body: obtain the session, gate on login, branch into
/// the sub-mode, and clean up.
async fn run_monitor(source: SessionSource, opts: MonitorOptions, handle: Arc<MonitorHandle>) {
    let session = match source {
        SessionSource::Existing(session) => session,
        SessionSource::Launch(cfg) => {
            match session::open_session(&cfg, SessionProfile::Monitor).await {
                Ok(session) => session,
                Err(e) => {
                    error!("monitor: session launch failed: {}", e);
                    handle.stats.set_current(format!("setup failed: {}", e));
                    handle.stats.set_running(false);
                    handle.finished.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }
    };
    handle.set_session(Arc::clone(&session));

    handle.stats.set_current("waiting for login");
    match session.wait_for_ready(&handle.cancel).await {
        Ok(()) => {
            let page = session.page();
            if opts.rows.is_empty() {
                handle.stats.set_current("watching for send control");
                run_watch(&*page, &handle.stats, &handle.cancel).await;
            } else {
                run_csv_walk(
                    &*page,
                    &opts.host,
                    &opts.rows,
                    opts.delay,
                    &handle.stats,
                    &handle.cancel,
                    &opts.on_event,
                )
                .await;
            }
        }
        Err(SetupError::Cancelled) => {
            debug!("monitor: stopped during login wait");
        }
        Err(e) => {
            error!("monitor: login wait failed: {}", e);
            handle.stats.set_current(format!("setup failed: {}", e));
        }
    }

    // Close is idempotent; after a stop() this is a no-op.
    session.close().await;
    handle.stats.set_running(false);
    handle.finished.store(true, Ordering::SeqCst);
}

/// CSV sub-mode: walk the recipient list with the same per-recipient state
/// machine as the batch path (longer settle), reporting every outcome.
/// Cancellation is checked at the top of each iteration and again before
/// the inter-recipient sleep; the sleep after the final recipient is
/// skipped entirely.
pub async fn run_csv_walk(
    page: &dyn ChatPage,
    host: &str,
    rows: &[Recipient],
    delay: Duration,
    stats: &MonitorStats,
    cancel: &CancelFlag,
    on_event: &EventSink,
) {
    let ladder = actuator::default_ladder();
    let tuning = SendTuning::csv_walk();
    let total = rows.len();

    for (index, recipient) in rows.iter().enumerate() {
        if cancel.is_cancelled() {
            return;
        }
        stats.set_current(format!("{}/{} — {}", index + 1, total, recipient.phone));

        let event = match actuator::send_single(page, host, recipient, &ladder, &tuning).await {
            Ok(_) => {
                stats.record_click();
                MonitorEvent::Recipient {
                    index,
                    total,
                    phone: recipient.phone.clone(),
                    ok: true,
                    error: None,
                }
            }
            Err(e) => MonitorEvent::Recipient {
                index,
                total,
                phone: recipient.phone.clone(),
                ok: false,
                error: Some(e.to_string()),
            },
        };
        on_event(event);

        if index + 1 < total {
            if cancel.is_cancelled() {
                return;
            }
            tokio::time::sleep(delay).await;
        }
    }

    stats.set_running(false);
    stats.set_current(format!("completed {}/{}", total, total));
    on_event(MonitorEvent::Completed {
        total,
        clicks: stats.clicks(),
    });
    info!("monitor: csv walk complete ({} recipients)", total);
}

/// Watch sub-mode: on every tick, if the debounce window since the last
/// successful click has passed, run exactly one ladder pass. Absence of a
/// clickable send control is the expected steady state, and any tick error
/// (e.g. the page mid-navigation) is swallowed: this loop only ends via
/// an explicit stop.
pub async fn run_watch(page: &dyn ChatPage, stats: &MonitorStats, cancel: &CancelFlag) {
    let ladder = actuator::default_ladder();
    let mut last_click: Option<tokio::time::Instant> = None;

    while !cancel.is_cancelled() {
        let due = last_click
            .map(|at| at.elapsed() > WATCH_DEBOUNCE)
            .unwrap_or(true);
        if due {
            match actuator::run_ladder(page, &ladder).await {
                Ok(Some(strategy)) => {
                    last_click = Some(tokio::time::Instant::now());
                    stats.record_click();
                    debug!("watch: clicked send control via {}", strategy);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("watch: tick error ignored: {}", e);
                }
            }
        }
        tokio::time::sleep(WATCH_TICK).await;
    }
}
