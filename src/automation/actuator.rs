//! Send actuator: drives one recipient from deep link to a triggered send.
//!
//! The platform's DOM is unstable and unversioned from our side, so no
//! single selector is trusted. The click goes through an ordered ladder of
//! locator strategies, most-specific first, each tried as an in-page script
//! and again through the driver's own locate/click primitives. A recipient
//! whose ladder never lands still exits through the Enter-key fallback -
//! "no visible send control" is common transient UI state, not proof of
//! failure.

use crate::automation::driver::{ChatPage, PageError};
use crate::core::types::Recipient;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Composer signatures: any match means the target conversation view loaded
/// with the message pre-filled.
pub const COMPOSER_SELECTORS: &[&str] = &[
    "footer div[contenteditable=\"true\"]",
    "div[contenteditable=\"true\"][data-tab]",
    "[data-testid=\"conversation-compose-box-input\"]",
];

const COMPOSER_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum SendError {
    #[error("composer did not appear within {0:?}")]
    ComposerTimeout(Duration),

    #[error(transparent)]
    Page(#[from] PageError),
}

/// Timing knobs of the per-recipient state machine.
#[derive(Debug, Clone)]
pub struct SendTuning {
    /// Hard bound on the composer appearing after the deep-link navigation.
    pub composer_timeout: Duration,
    /// Fixed pause after the composer loads, letting the send control
    /// render. Too short risks clicking nothing; too long wastes time
    /// across a large batch.
    pub settle: Duration,
    pub click_attempts: u32,
    pub attempt_gap: Duration,
    /// Pause after the Enter fallback so the submit takes effect.
    pub submit_grace: Duration,
}

impl Default for SendTuning {
    fn default() -> Self {
        Self {
            composer_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(2),
            click_attempts: 5,
            attempt_gap: Duration::from_secs(1),
            submit_grace: Duration::from_secs(1),
        }
    }
}

impl SendTuning {
    /// The monitor's CSV walk settles slightly longer between navigation
    /// and clicking than the one-shot batch path.
    pub fn csv_walk() -> Self {
        Self {
            settle: Duration::from_millis(2500),
            ..Self::default()
        }
    }
}

/// Build the deep link opening `recipient`'s conversation with the message
/// pre-filled in the composer.
pub fn deep_link(host: &str, recipient: &Recipient) -> String {
    format!(
        "https://{}/send?phone={}&text={}",
        host,
        utf8_percent_encode(&recipient.phone, NON_ALPHANUMERIC),
        utf8_percent_encode(&recipient.message, NON_ALPHANUMERIC),
    )
}

// ── Click ladder ─────────────────────────────────────────────────────────────

/// One rung of the click ladder. Each strategy can attempt the click as an
/// in-page script (fast, survives overlay/focus quirks) and as a
/// driver-native element interaction (a real pointer event, for pages where
/// a scripted `click()` doesn't register).
#[async_trait]
pub trait ClickStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_script(&self, page: &dyn ChatPage) -> Result<bool, PageError>;

    async fn try_driver(&self, page: &dyn ChatPage) -> Result<bool, PageError>;
}

/// Shared in-page visibility helper; mirrors what the driver-native pass
/// checks via bounding boxes.
const JS_IS_VISIBLE: &str = "const isVisible = el => { \
     if (!el) return false; \
     const r = el.getBoundingClientRect(); \
     const s = window.getComputedStyle(el); \
     return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; };";

/// Rung 1: the short list of known stable selectors for the send control.
pub struct KnownSelectorStrategy;

const SEND_SELECTORS: &[&str] = &[
    "button[aria-label=\"Send\"]",
    "[data-testid=\"send\"]",
    "[data-testid=\"compose-btn-send\"]",
];

#[async_trait]
impl ClickStrategy for KnownSelectorStrategy {
    fn name(&self) -> &'static str {
        "send-button"
    }

    async fn try_script(&self, page: &dyn ChatPage) -> Result<bool, PageError> {
        let sels = serde_json::to_string(SEND_SELECTORS).expect("static selector list");
        let script = format!(
            "(() => {{ {JS_IS_VISIBLE} \
             for (const sel of {sels}) {{ \
               const el = document.querySelector(sel); \
               if (isVisible(el)) {{ el.click(); return true; }} \
             }} \
             return false; }})()"
        );
        page.eval_click(&script).await
    }

    async fn try_driver(&self, page: &dyn ChatPage) -> Result<bool, PageError> {
        for sel in SEND_SELECTORS {
            if page.click_visible(sel).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Rung 2: structural fallback: find an icon element tagged as "send" and
/// click its nearest enclosing clickable ancestor.
pub struct SendIconStrategy;

const SEND_ICON_SELECTOR: &str =
    "span[data-icon=\"send\"], span[data-icon=\"send-light\"], span[data-icon=\"wds-ic-send-filled\"]";

#[async_trait]
impl ClickStrategy for SendIconStrategy {
    fn name(&self) -> &'static str {
        "send-icon"
    }

    async fn try_script(&self, page: &dyn ChatPage) -> Result<bool, PageError> {
        let icon = serde_json::to_string(SEND_ICON_SELECTOR).expect("static selector");
        let script = format!(
            "(() => {{ {JS_IS_VISIBLE} \
             const icon = document.querySelector({icon}); \
             if (!isVisible(icon)) return false; \
             const target = icon.closest('button, [role=\"button\"]') || icon.parentElement; \
             if (!target) return false; \
             target.click(); return true; }})()"
        );
        page.eval_click(&script).await
    }

    async fn try_driver(&self, page: &dyn ChatPage) -> Result<bool, PageError> {
        // :has() lets the driver click the enclosing button directly; the
        // bare icon is the last resort.
        for sel in [
            "button:has(span[data-icon=\"send\"])",
            "[role=\"button\"]:has(span[data-icon=\"send\"])",
            "span[data-icon=\"send\"]",
        ] {
            if page.click_visible(sel).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Rung 3: heuristic: any visible clickable control whose accessible label
/// contains the word "send" (case-insensitive).
pub struct SendLabelStrategy;

#[async_trait]
impl ClickStrategy for SendLabelStrategy {
    fn name(&self) -> &'static str {
        "send-label"
    }

    async fn try_script(&self, page: &dyn ChatPage) -> Result<bool, PageError> {
        let script = format!(
            "(() => {{ {JS_IS_VISIBLE} \
             const candidates = document.querySelectorAll('button, [role=\"button\"]'); \
             for (const el of candidates) {{ \
               if (!isVisible(el)) continue; \
               const label = (el.getAttribute('aria-label') || el.getAttribute('title') || '').toLowerCase(); \
               if (label.includes('send')) {{ el.click(); return true; }} \
             }} \
             return false; }})()"
        );
        page.eval_click(&script).await
    }

    async fn try_driver(&self, page: &dyn ChatPage) -> Result<bool, PageError> {
        for sel in [
            "button[aria-label*=\"Send\"]",
            "button[aria-label*=\"send\"]",
            "[role=\"button\"][aria-label*=\"Send\"]",
        ] {
            if page.click_visible(sel).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// The production ladder, ordered most-specific to least-specific.
pub fn default_ladder() -> Vec<Box<dyn ClickStrategy>> {
    vec![
        Box::new(KnownSelectorStrategy),
        Box::new(SendIconStrategy),
        Box::new(SendLabelStrategy),
    ]
}

/// Run one full pass of the ladder: every strategy as an in-page script,
/// then, if none matched, every strategy through the driver's own locate
/// and click primitives. Short-circuits on the first success and returns
/// the winning strategy's name.
pub async fn run_ladder(
    page: &dyn ChatPage,
    ladder: &[Box<dyn ClickStrategy>],
) -> Result<Option<&'static str>, PageError> {
    for strategy in ladder {
        if strategy.try_script(page).await? {
            debug!("ladder: {} matched (script)", strategy.name());
            return Ok(Some(strategy.name()));
        }
    }
    for strategy in ladder {
        if strategy.try_driver(page).await? {
            debug!("ladder: {} matched (driver)", strategy.name());
            return Ok(Some(strategy.name()));
        }
    }
    Ok(None)
}

// ── Per-recipient state machine ──────────────────────────────────────────────

/// How a send was ultimately triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMethod {
    Click {
        strategy: &'static str,
        attempt: u32,
    },
    EnterFallback,
}

impl SendMethod {
    pub fn label(&self) -> String {
        match self {
            SendMethod::Click { strategy, .. } => (*strategy).to_string(),
            SendMethod::EnterFallback => "enter-key".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub method: SendMethod,
}

enum SendPhase {
    Navigating,
    AwaitingComposer,
    Settling,
    Clicking { attempt: u32 },
    Submitted(SendMethod),
}

/// Wait (bounded) for the message composer, the structural signal that the
/// correct conversation view has loaded.
async fn await_composer(page: &dyn ChatPage, timeout: Duration) -> Result<(), SendError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        for selector in COMPOSER_SELECTORS {
            if page.selector_exists(selector).await? {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SendError::ComposerTimeout(timeout));
        }
        tokio::time::sleep(COMPOSER_POLL).await;
    }
}

/// Attempt to send one message: navigate the deep link, wait for the
/// composer, settle, then run the click ladder up to
/// `tuning.click_attempts` times with `tuning.attempt_gap` between passes.
/// If the ladder never lands, submit via the Enter key: that path
/// completes without error.
pub async fn send_single(
    page: &dyn ChatPage,
    host: &str,
    recipient: &Recipient,
    ladder: &[Box<dyn ClickStrategy>],
    tuning: &SendTuning,
) -> Result<SendOutcome, SendError> {
    let url = deep_link(host, recipient);
    let mut phase = SendPhase::Navigating;

    loop {
        phase = match phase {
            SendPhase::Navigating => {
                page.navigate(&url).await?;
                SendPhase::AwaitingComposer
            }
            SendPhase::AwaitingComposer => {
                await_composer(page, tuning.composer_timeout).await?;
                SendPhase::Settling
            }
            SendPhase::Settling => {
                tokio::time::sleep(tuning.settle).await;
                SendPhase::Clicking { attempt: 1 }
            }
            SendPhase::Clicking { attempt } => match run_ladder(page, ladder).await {
                Ok(Some(strategy)) => SendPhase::Submitted(SendMethod::Click { strategy, attempt }),
                outcome => {
                    if let Err(e) = outcome {
                        debug!(
                            "send: ladder attempt {}/{} errored for {}: {}",
                            attempt, tuning.click_attempts, recipient.phone, e
                        );
                    }
                    if attempt < tuning.click_attempts {
                        tokio::time::sleep(tuning.attempt_gap).await;
                        SendPhase::Clicking {
                            attempt: attempt + 1,
                        }
                    } else {
                        info!(
                            "send: no send control found for {} after {} attempts, submitting via Enter",
                            recipient.phone, tuning.click_attempts
                        );
                        page.press_key("Enter").await?;
                        tokio::time::sleep(tuning.submit_grace).await;
                        SendPhase::Submitted(SendMethod::EnterFallback)
                    }
                }
            },
            SendPhase::Submitted(method) => {
                debug!("send: {} submitted via {}", recipient.phone, method.label());
                return Ok(SendOutcome { method });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(phone: &str, message: &str) -> Recipient {
        Recipient {
            phone: phone.to_string(),
            message: message.to_string(),
            name: None,
        }
    }

    #[test]
    fn deep_link_percent_encodes_both_query_values() {
        let link = deep_link(
            "web.whatsapp.com",
            &recipient("919999999999", "hi there & welcome"),
        );
        assert_eq!(
            link,
            "https://web.whatsapp.com/send?phone=919999999999&text=hi%20there%20%26%20welcome"
        );
    }

    #[test]
    fn default_ladder_is_ordered_most_specific_first() {
        let names: Vec<&str> = default_ladder().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["send-button", "send-icon", "send-label"]);
    }

    #[test]
    fn csv_walk_tuning_only_changes_the_settle() {
        let base = SendTuning::default();
        let walk = SendTuning::csv_walk();
        assert_eq!(walk.settle, Duration::from_millis(2500));
        assert_eq!(walk.click_attempts, base.click_attempts);
        assert_eq!(walk.composer_timeout, base.composer_timeout);
    }
}
