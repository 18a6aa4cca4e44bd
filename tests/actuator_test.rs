//! Send actuator: click-ladder fallbacks and the per-recipient state machine.

mod common;

use async_trait::async_trait;
use common::MockPage;
use std::sync::{Arc, Mutex};
use wa_courier::actuator::{
    self, ClickStrategy, SendError, SendMethod, SendTuning,
};
use wa_courier::driver::{ChatPage, PageError};
use wa_courier::types::Recipient;

fn recipient(phone: &str) -> Recipient {
    Recipient {
        phone: phone.to_string(),
        message: "hi".to_string(),
        name: None,
    }
}

/// Scripted ladder rung that records the order it was probed in.
struct FakeStrategy {
    name: &'static str,
    script_hit: bool,
    driver_hit: bool,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ClickStrategy for FakeStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn try_script(&self, _page: &dyn ChatPage) -> Result<bool, PageError> {
        self.log.lock().unwrap().push(format!("{}.script", self.name));
        Ok(self.script_hit)
    }

    async fn try_driver(&self, _page: &dyn ChatPage) -> Result<bool, PageError> {
        self.log.lock().unwrap().push(format!("{}.driver", self.name));
        Ok(self.driver_hit)
    }
}

fn fake(
    name: &'static str,
    script_hit: bool,
    driver_hit: bool,
    log: &Arc<Mutex<Vec<String>>>,
) -> Box<dyn ClickStrategy> {
    Box::new(FakeStrategy {
        name,
        script_hit,
        driver_hit,
        log: Arc::clone(log),
    })
}

#[tokio::test]
async fn ladder_runs_full_script_pass_before_driver_pass() {
    let page = MockPage::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let ladder = vec![
        fake("first", false, true, &log),
        fake("second", false, false, &log),
    ];

    let winner = actuator::run_ladder(&*page, &ladder).await.unwrap();
    assert_eq!(winner, Some("first"));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["first.script", "second.script", "first.driver"]
    );
}

#[tokio::test]
async fn ladder_short_circuits_on_first_script_hit() {
    let page = MockPage::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let ladder = vec![
        fake("first", true, false, &log),
        fake("second", false, true, &log),
    ];

    let winner = actuator::run_ladder(&*page, &ladder).await.unwrap();
    assert_eq!(winner, Some("first"));
    assert_eq!(*log.lock().unwrap(), vec!["first.script"]);
}

#[tokio::test]
async fn icon_structural_fallback_succeeds_without_direct_selector_match() {
    // Only the bare send icon exists: no known selector, no labeled button.
    let page = MockPage::new();
    common::add_composer(&page);
    page.add_selector(common::SEND_ICON);

    let ladder = actuator::default_ladder();
    let winner = actuator::run_ladder(&*page, &ladder).await.unwrap();
    assert_eq!(winner, Some("send-icon"));
    assert_eq!(
        *page.clicked.lock().unwrap(),
        vec![common::SEND_ICON.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_ladder_submits_via_enter_without_error() {
    // Composer present, but no discoverable send control at all.
    let page = MockPage::new();
    common::add_composer(&page);

    let ladder = actuator::default_ladder();
    let outcome = actuator::send_single(
        &*page,
        "web.whatsapp.com",
        &recipient("919999999999"),
        &ladder,
        &SendTuning::default(),
    )
    .await
    .expect("enter fallback must not raise");

    assert_eq!(outcome.method, SendMethod::EnterFallback);
    assert_eq!(page.key_presses(), vec!["Enter".to_string()]);
    assert_eq!(page.navigation_count(), 1);
    assert!(page.navigations.lock().unwrap()[0].contains("phone=919999999999"));
}

#[tokio::test(start_paused = true)]
async fn click_on_first_attempt_reports_strategy_and_skips_enter() {
    let page = MockPage::new();
    common::add_composer(&page);
    page.add_selector(common::SEND_ICON);

    let ladder = actuator::default_ladder();
    let outcome = actuator::send_single(
        &*page,
        "web.whatsapp.com",
        &recipient("4915550001"),
        &ladder,
        &SendTuning::default(),
    )
    .await
    .unwrap();

    match outcome.method {
        SendMethod::Click { strategy, attempt } => {
            assert_eq!(strategy, "send-icon");
            assert_eq!(attempt, 1);
        }
        other => panic!("expected ladder click, got {:?}", other),
    }
    assert!(page.key_presses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_composer_is_a_hard_failure_for_the_recipient() {
    let page = MockPage::new();

    let ladder = actuator::default_ladder();
    let err = actuator::send_single(
        &*page,
        "web.whatsapp.com",
        &recipient("4915550001"),
        &ladder,
        &SendTuning::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SendError::ComposerTimeout(_)));
    // Never clicked, never pressed Enter.
    assert!(page.clicked.lock().unwrap().is_empty());
    assert!(page.key_presses().is_empty());
}
