//! Driver seam between the automation core and the CDP browser.
//!
//! The batch runner, monitor loop, and send actuator only ever talk to a
//! [`ChatPage`]; the chromiumoxide-backed [`CdpChatPage`] is the production
//! implementation. Keeping the seam here lets the state machines be
//! exercised against a scripted page with no browser attached.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("element interaction failed: {0}")]
    Element(String),

    #[error("input dispatch failed: {0}")]
    Input(String),

    #[error("screenshot capture failed: {0}")]
    Screenshot(String),
}

/// The capability set the automation core consumes from the browser driver.
#[async_trait]
pub trait ChatPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// `true` when `document.querySelector(selector)` matches.
    async fn selector_exists(&self, selector: &str) -> Result<bool, PageError>;

    /// Run an in-page script that attempts a click and reports whether it
    /// found a target. The script must evaluate to a boolean.
    async fn eval_click(&self, script: &str) -> Result<bool, PageError>;

    /// Driver-native pass: locate `selector`, check it is visible, and click
    /// it with a real pointer event. `Ok(false)` when nothing matched.
    async fn click_visible(&self, selector: &str) -> Result<bool, PageError>;

    async fn press_key(&self, key: &str) -> Result<(), PageError>;

    /// Current viewport rendered as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, PageError>;
}

// ── chromiumoxide implementation ─────────────────────────────────────────────

pub struct CdpChatPage {
    page: Page,
}

impl CdpChatPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval_bool(&self, script: &str) -> Result<bool, PageError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| PageError::Script(e.to_string()))?;
        // `undefined` / non-bool results deserialize to an error; for the
        // probe scripts that simply means "no match".
        Ok(result.into_value::<bool>().unwrap_or(false))
    }
}

#[async_trait]
impl ChatPage for CdpChatPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        debug!("page: navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| PageError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn selector_exists(&self, selector: &str) -> Result<bool, PageError> {
        let quoted =
            serde_json::to_string(selector).map_err(|e| PageError::Script(e.to_string()))?;
        self.eval_bool(&format!("!!document.querySelector({quoted})"))
            .await
    }

    async fn eval_click(&self, script: &str) -> Result<bool, PageError> {
        self.eval_bool(script).await
    }

    async fn click_visible(&self, selector: &str) -> Result<bool, PageError> {
        let quoted =
            serde_json::to_string(selector).map_err(|e| PageError::Script(e.to_string()))?;
        let visible = self
            .eval_bool(&format!(
                "(() => {{ const el = document.querySelector({quoted}); \
                 if (!el) return false; \
                 const r = el.getBoundingClientRect(); \
                 return r.width > 0 && r.height > 0; }})()"
            ))
            .await?;
        if !visible {
            return Ok(false);
        }

        let element = match self.page.find_element(selector).await {
            Ok(el) => el,
            // Raced against a re-render between the probe and the lookup.
            Err(_) => return Ok(false),
        };
        element
            .click()
            .await
            .map_err(|e| PageError::Element(e.to_string()))?;
        Ok(true)
    }

    async fn press_key(&self, key: &str) -> Result<(), PageError> {
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key.to_string())
            .build()
            .map_err(PageError::Input)?;
        self.page
            .execute(down)
            .await
            .map_err(|e| PageError::Input(e.to_string()))?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key.to_string())
            .build()
            .map_err(PageError::Input)?;
        self.page
            .execute(up)
            .await
            .map_err(|e| PageError::Input(e.to_string()))?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| PageError::Screenshot(e.to_string()))
    }
}
