#![allow(dead_code)]

//! Shared test doubles for the automation core.
//!
//! `MockPage` is a scripted stand-in for the browser driver: tests declare
//! which selectors exist/are visible, and the mock records navigations and
//! key presses. Real click-ladder strategies exercise their driver-native
//! pass against it; in-page script evaluation always reports "no match"
//! unless a test flips `script_click_result`.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use wa_courier::driver::{ChatPage, PageError};
use wa_courier::types::{EventSink, MonitorEvent};

#[derive(Default)]
pub struct MockPage {
    /// Selectors treated as present and visible.
    present: Mutex<HashSet<String>>,
    pub navigations: Mutex<Vec<String>>,
    pub keys: Mutex<Vec<String>>,
    pub clicked: Mutex<Vec<String>>,
    /// Navigations whose URL contains this substring fail.
    fail_nav_containing: Mutex<Option<String>>,
    /// Forced result of in-page script click attempts.
    script_click_result: Mutex<bool>,
}

impl MockPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_selector(&self, selector: &str) {
        self.present.lock().unwrap().insert(selector.to_string());
    }

    pub fn remove_selector(&self, selector: &str) {
        self.present.lock().unwrap().remove(selector);
    }

    pub fn fail_navigations_containing(&self, needle: &str) {
        *self.fail_nav_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn set_script_click_result(&self, result: bool) {
        *self.script_click_result.lock().unwrap() = result;
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.lock().unwrap().len()
    }

    pub fn key_presses(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPage for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        if let Some(needle) = self.fail_nav_containing.lock().unwrap().as_deref() {
            if url.contains(needle) {
                return Err(PageError::Navigation(format!("net::ERR_ABORTED loading {url}")));
            }
        }
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn selector_exists(&self, selector: &str) -> Result<bool, PageError> {
        Ok(self.present.lock().unwrap().contains(selector))
    }

    async fn eval_click(&self, _script: &str) -> Result<bool, PageError> {
        Ok(*self.script_click_result.lock().unwrap())
    }

    async fn click_visible(&self, selector: &str) -> Result<bool, PageError> {
        if self.present.lock().unwrap().contains(selector) {
            self.clicked.lock().unwrap().push(selector.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn press_key(&self, key: &str) -> Result<(), PageError> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// Collecting event sink for monitor tests.
pub fn event_log() -> (EventSink, Arc<Mutex<Vec<MonitorEvent>>>) {
    let log: Arc<Mutex<Vec<MonitorEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_log = Arc::clone(&log);
    let sink: EventSink = Arc::new(move |event| sink_log.lock().unwrap().push(event));
    (sink, log)
}

/// The product's own "chat list loaded" marker; adding it makes a
/// `MockPage` pass the login wait immediately.
pub const READY_SELECTOR: &str = "#pane-side";

/// Composer marker understood by the actuator's bounded wait.
pub fn add_composer(page: &MockPage) {
    page.add_selector(wa_courier::actuator::COMPOSER_SELECTORS[0]);
}

/// A send icon only discoverable by the structural driver-pass fallback.
pub const SEND_ICON: &str = "span[data-icon=\"send\"]";
