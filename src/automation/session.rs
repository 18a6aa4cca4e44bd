//! Persistent browser session management.
//!
//! Each mode (batch vs monitor) owns its own profile directory under the
//! configured session root, so the two login states never share or corrupt
//! each other. Profiles are created on first use, reused across runs, and
//! never deleted here: the profile tree's format belongs to the browser.

use crate::automation::driver::{CdpChatPage, ChatPage, PageError};
use crate::core::config::CourierConfig;
use crate::core::types::CancelFlag;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Selectors that prove the chat list is rendered, i.e. the operator is
/// logged in. Checked in order; any match counts.
const READY_SELECTORS: &[&str] = &[
    "#pane-side",
    "[data-testid=\"chat-list\"]",
    "div[aria-label=\"Chat list\"]",
];

const READY_POLL: Duration = Duration::from_millis(500);

/// Consecutive probe failures tolerated during the login wait. The client
/// reloads itself right after a QR scan, which makes individual probes fail
/// transiently; only a persistently dead page aborts the wait.
const READY_MAX_PROBE_ERRORS: u32 = 30;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no usable browser executable found (set CHROME_EXECUTABLE or install Chrome/Chromium/Brave)")]
    BrowserMissing,

    #[error("session profile directory error: {0}")]
    Profile(#[from] std::io::Error),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to messaging client failed: {0}")]
    Navigation(String),

    #[error("page kept failing during login wait: {0}")]
    Ready(#[from] PageError),

    #[error("login wait cancelled")]
    Cancelled,
}

/// Which persistent profile a session binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProfile {
    Batch,
    Monitor,
}

impl SessionProfile {
    pub fn dir_name(self) -> &'static str {
        match self {
            SessionProfile::Batch => "batch",
            SessionProfile::Monitor => "monitor",
        }
    }
}

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build the launch config for a persistent messaging session.
///
/// Flags disable GPU, extensions, and background networking to keep the
/// resident footprint small: these sessions stay alive for the whole run
/// and are often deployed under tight memory ceilings.
fn build_session_config(
    exe: &str,
    profile_dir: &Path,
    headless: bool,
) -> Result<BrowserConfig, SetupError> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(profile_dir)
        .viewport(Viewport {
            width: 1280,
            height: 900,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1280, 900)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg(format!("--user-agent={}", ua));

    if !headless {
        // Headless is the library default; the visible window is what shows
        // the login QR code to the operator.
        builder = builder.with_head();
    }

    builder.build().map_err(SetupError::Launch)
}

// ── ChatSession ──────────────────────────────────────────────────────────────

struct SessionBackend {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
}

/// A live browser session bound to one persistent profile, holding the one
/// page the automation loops drive.
pub struct ChatSession {
    page: Arc<dyn ChatPage>,
    backend: Mutex<Option<SessionBackend>>,
    closed: AtomicBool,
}

impl ChatSession {
    /// Wrap a page whose browser process is managed elsewhere. Used by the
    /// loop tests and by embedders that bring their own driver.
    pub fn detached(page: Arc<dyn ChatPage>) -> Arc<Self> {
        Arc::new(Self {
            page,
            backend: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn page(&self) -> Arc<dyn ChatPage> {
        Arc::clone(&self.page)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Block until the logged-in selector appears.
    ///
    /// Intentionally unbounded: if the operator has not scanned the QR code
    /// yet this simply does not return until they do. The only exits are a
    /// match, a cancel request, or a page that fails every probe for a
    /// sustained stretch.
    pub async fn wait_for_ready(&self, cancel: &CancelFlag) -> Result<(), SetupError> {
        info!("session: waiting for chat list (scan the QR code if prompted)");
        let mut consecutive_errors: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SetupError::Cancelled);
            }

            let mut matched = false;
            let mut probe_error: Option<PageError> = None;
            for selector in READY_SELECTORS {
                match self.page.selector_exists(selector).await {
                    Ok(true) => {
                        matched = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        probe_error = Some(e);
                        break;
                    }
                }
            }

            if matched {
                info!("session: chat list loaded, session ready");
                return Ok(());
            }

            match probe_error {
                Some(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= READY_MAX_PROBE_ERRORS {
                        return Err(SetupError::Ready(e));
                    }
                    debug!("session: ready probe failed ({}), still waiting", e);
                }
                None => consecutive_errors = 0,
            }

            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// Close the session, swallowing close errors. Safe to call twice.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.backend.lock().await;
        if let Some(mut backend) = guard.take() {
            if let Err(e) = backend.browser.close().await {
                warn!("session: browser close error (non-fatal): {}", e);
            }
            let _ = backend.browser.wait().await;
            backend.handler_task.abort();
            info!("session: closed");
        }
    }
}

/// Launch a persistent browser context bound to the profile directory for
/// `profile`, with the page already pointed at the messaging client root.
///
/// No retry at this layer: launch and navigation errors propagate so the
/// caller decides whether to abort the whole run.
pub async fn open_session(
    cfg: &CourierConfig,
    profile: SessionProfile,
) -> Result<Arc<ChatSession>, SetupError> {
    let profile_dir = cfg.resolve_session_root().join(profile.dir_name());
    std::fs::create_dir_all(&profile_dir)?;

    let exe = find_chrome_executable().ok_or(SetupError::BrowserMissing)?;
    let config = build_session_config(&exe, &profile_dir, cfg.resolve_headless())?;

    info!(
        "session: launching {} profile at {} ({})",
        profile.dir_name(),
        profile_dir.display(),
        exe
    );
    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| SetupError::Launch(e.to_string()))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("session CDP handler error: {}", e);
            }
        }
    });

    let root_url = format!("https://{}/", cfg.resolve_host());
    let page = match browser.new_page(root_url.as_str()).await {
        Ok(p) => p,
        Err(e) => {
            handler_task.abort();
            return Err(SetupError::Navigation(e.to_string()));
        }
    };

    Ok(Arc::new(ChatSession {
        page: Arc::new(CdpChatPage::new(page)),
        backend: Mutex::new(Some(SessionBackend {
            browser,
            handler_task,
        })),
        closed: AtomicBool::new(false),
    }))
}
