//! Monitor loop: cooperative stop, watch debounce, idempotent start.

mod common;

use common::MockPage;
use std::sync::Arc;
use std::time::Duration;
use wa_courier::monitor::{self, MonitorOptions, MonitorRegistry};
use wa_courier::session::ChatSession;
use wa_courier::types::{CancelFlag, MonitorEvent, MonitorStats, Recipient};

fn rows(phones: &[&str]) -> Vec<Recipient> {
    phones
        .iter()
        .map(|p| Recipient {
            phone: (*p).to_string(),
            message: "scripted hello".to_string(),
            name: None,
        })
        .collect()
}

fn clickable_page() -> Arc<MockPage> {
    let page = MockPage::new();
    common::add_composer(&page);
    page.add_selector(common::SEND_ICON);
    page
}

// ── CSV sub-mode ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn csv_walk_reports_every_recipient_and_emits_terminal_event() {
    let page = clickable_page();
    // Middle recipient's conversation never loads; the walk must go on.
    page.fail_navigations_containing("49222");

    let stats = MonitorStats::new();
    stats.set_running(true);
    let cancel = CancelFlag::new();
    let (sink, log) = common::event_log();

    monitor::run_csv_walk(
        &*page,
        "web.whatsapp.com",
        &rows(&["49111", "49222", "49333"]),
        Duration::from_millis(800),
        &stats,
        &cancel,
        &sink,
    )
    .await;

    let events = log.lock().unwrap();
    assert_eq!(events.len(), 4);
    for (i, event) in events.iter().take(3).enumerate() {
        match event {
            MonitorEvent::Recipient { index, total, ok, .. } => {
                assert_eq!(*index, i);
                assert_eq!(*total, 3);
                assert_eq!(*ok, i != 1);
            }
            other => panic!("expected recipient event, got {:?}", other),
        }
    }
    match &events[3] {
        MonitorEvent::Completed { total, clicks } => {
            assert_eq!(*total, 3);
            assert_eq!(*clicks, 2);
        }
        other => panic!("expected terminal event, got {:?}", other),
    }

    let snap = stats.snapshot();
    assert!(!snap.running);
    assert_eq!(snap.current.as_deref(), Some("completed 3/3"));
    assert_eq!(snap.clicks, 2);
}

#[tokio::test(start_paused = true)]
async fn csv_walk_stops_cooperatively_after_current_recipient() {
    let page = clickable_page();
    let stats = MonitorStats::new();
    stats.set_running(true);
    let cancel = CancelFlag::new();

    // Request the stop from inside the first recipient's progress event,
    // i.e. after recipient 0 is processed but before the trailing sleep.
    let (sink, log) = {
        let cancel = cancel.clone();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let sink: wa_courier::types::EventSink = Arc::new(move |event| {
            sink_log.lock().unwrap().push(event);
            cancel.cancel();
        });
        (sink, log)
    };

    monitor::run_csv_walk(
        &*page,
        "web.whatsapp.com",
        &rows(&["49111", "49222", "49333"]),
        Duration::from_secs(2),
        &stats,
        &cancel,
        &sink,
    )
    .await;

    let events = log.lock().unwrap();
    // Recipient 0 only: no later recipients, no terminal event.
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        MonitorEvent::Recipient { index: 0, .. }
    ));
    assert_eq!(page.navigation_count(), 1);
}

// ── Watch sub-mode ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn watch_mode_debounces_adjacent_send_control_appearances() {
    // The send control is visible on every tick; the debounce window must
    // collapse adjacent appearances into one click per window.
    let page = clickable_page();
    let stats = MonitorStats::new();
    let cancel = CancelFlag::new();

    let task = {
        let page = Arc::clone(&page);
        let stats = Arc::clone(&stats);
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor::run_watch(&*page, &stats, &cancel).await })
    };

    // Clicks land at t=0 and t=2.0s; the 0.5s/1.0s/1.5s ticks fall inside
    // the 1.5s window of the first click.
    tokio::time::sleep(Duration::from_millis(2600)).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(stats.clicks(), 2);
}

#[tokio::test(start_paused = true)]
async fn watch_mode_swallows_tick_errors_and_keeps_running() {
    struct FlakyPage {
        inner: Arc<MockPage>,
        fail_ticks: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl wa_courier::driver::ChatPage for FlakyPage {
        async fn navigate(&self, url: &str) -> Result<(), wa_courier::driver::PageError> {
            self.inner.navigate(url).await
        }
        async fn selector_exists(&self, s: &str) -> Result<bool, wa_courier::driver::PageError> {
            self.inner.selector_exists(s).await
        }
        async fn eval_click(&self, s: &str) -> Result<bool, wa_courier::driver::PageError> {
            if self.fail_ticks.fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |n| n.checked_sub(1),
            ).is_ok()
            {
                return Err(wa_courier::driver::PageError::Script(
                    "Execution context was destroyed".to_string(),
                ));
            }
            self.inner.eval_click(s).await
        }
        async fn click_visible(&self, s: &str) -> Result<bool, wa_courier::driver::PageError> {
            self.inner.click_visible(s).await
        }
        async fn press_key(&self, k: &str) -> Result<(), wa_courier::driver::PageError> {
            self.inner.press_key(k).await
        }
        async fn screenshot(&self) -> Result<Vec<u8>, wa_courier::driver::PageError> {
            self.inner.screenshot().await
        }
    }

    // First two ticks blow up mid-navigation style; the loop must survive
    // and click once the page settles.
    let page = Arc::new(FlakyPage {
        inner: clickable_page(),
        fail_ticks: std::sync::atomic::AtomicU32::new(2),
    });
    let stats = MonitorStats::new();
    let cancel = CancelFlag::new();

    let task = {
        let page = Arc::clone(&page);
        let stats = Arc::clone(&stats);
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor::run_watch(&*page, &stats, &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(1300)).await;
    cancel.cancel();
    task.await.unwrap();

    // Ticks 1 and 2 errored (swallowed); tick 3 clicked.
    assert_eq!(stats.clicks(), 1);
}

// ── Registry ─────────────────────────────────────────────────────────────────

fn watch_options() -> MonitorOptions {
    let (sink, _log) = common::event_log();
    MonitorOptions {
        rows: Vec::new(),
        delay: Duration::from_secs(1),
        host: "web.whatsapp.com".to_string(),
        on_event: sink,
    }
}

fn ready_session() -> (Arc<MockPage>, Arc<ChatSession>) {
    let page = clickable_page();
    page.add_selector(common::READY_SELECTOR);
    let session = ChatSession::detached(page.clone());
    (page, session)
}

#[tokio::test(start_paused = true)]
async fn second_start_is_an_idempotent_no_op() {
    let registry = MonitorRegistry::new();

    let (_page1, session1) = ready_session();
    let first = registry.start_with_session(session1, watch_options()).await;
    assert!(first.started);
    assert!(!first.already_running);

    // Let the detached task claim the session and pass the login gate.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats_before = registry.stats().await.unwrap();
    let clicks_before = stats_before.clicks();

    let (page2, session2) = ready_session();
    let second = registry.start_with_session(session2, watch_options()).await;
    assert!(!second.started);
    assert!(second.already_running);

    // Same monitor, same stats object, and the second session was never touched.
    let stats_after = registry.stats().await.unwrap();
    assert!(Arc::ptr_eq(&stats_before, &stats_after));
    assert_eq!(page2.navigation_count(), 0);
    assert!(stats_after.clicks() >= clicks_before);

    assert!(registry.stop().await);
}

#[tokio::test(start_paused = true)]
async fn stop_marks_not_running_and_allows_a_fresh_start() {
    let registry = MonitorRegistry::new();

    let (_page, session) = ready_session();
    assert!(registry.start_with_session(session, watch_options()).await.started);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(registry.stop().await);
    // Stop is observed at the next checkpoint; the slot is free immediately.
    assert!(registry.stats().await.is_none());
    assert!(!registry.stop().await);

    let (_page2, session2) = ready_session();
    let restarted = registry.start_with_session(session2, watch_options()).await;
    assert!(restarted.started);
    assert!(registry.stop().await);
}

#[tokio::test]
async fn screenshot_is_unavailable_without_an_open_session() {
    let registry = MonitorRegistry::new();
    assert!(registry.screenshot().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn screenshot_returns_bytes_while_the_monitor_session_is_open() {
    let registry = MonitorRegistry::new();
    let (_page, session) = ready_session();
    registry.start_with_session(session, watch_options()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let png = registry.screenshot().await.expect("session page is open");
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

    registry.stop().await;
    assert!(registry.screenshot().await.is_none());
}
