use std::path::PathBuf;

// ---------------------------------------------------------------------------
// CourierConfig: file-based config loader (wa-courier.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Top-level config loaded from `wa-courier.json`.
///
/// Every field is optional; the `resolve_*` accessors apply the env-var
/// fallback and the built-in default, so a missing or empty file is fully
/// usable.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct CourierConfig {
    /// Messaging web client host, e.g. `web.whatsapp.com`.
    pub host: Option<String>,
    /// Run the browser without a visible window. Defaults to `false`: a
    /// visible window is how the operator scans the login QR code.
    pub headless: Option<bool>,
    /// Root directory for the persistent browser profiles. The batch and
    /// monitor profiles live in separate subdirectories underneath it.
    pub session_root: Option<String>,
    /// Pause between recipients when the caller doesn't specify one.
    pub default_delay_ms: Option<u64>,
    /// Directory of static UI assets served at `/`.
    pub static_dir: Option<String>,
    pub port: Option<u16>,
}

impl CourierConfig {
    /// Host: JSON field → `WA_COURIER_HOST` env var → `web.whatsapp.com`.
    pub fn resolve_host(&self) -> String {
        if let Some(h) = &self.host {
            if !h.trim().is_empty() {
                return h.trim().to_string();
            }
        }
        std::env::var("WA_COURIER_HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "web.whatsapp.com".to_string())
    }

    /// Headless: JSON field → `WA_COURIER_HEADLESS` env var ("1"/"true") → false.
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        std::env::var("WA_COURIER_HEADLESS")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }

    /// Session root: JSON field → `WA_COURIER_SESSION_ROOT` env var →
    /// `~/.wa-courier/sessions` (falling back to `./.wa-courier/sessions`
    /// when no home directory is resolvable).
    pub fn resolve_session_root(&self) -> PathBuf {
        if let Some(dir) = &self.session_root {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("WA_COURIER_SESSION_ROOT") {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wa-courier")
            .join("sessions")
    }

    /// Default inter-message delay: JSON field → `WA_COURIER_DELAY_MS` → 4000 ms.
    pub fn resolve_default_delay_ms(&self) -> u64 {
        if let Some(ms) = self.default_delay_ms {
            return ms;
        }
        std::env::var("WA_COURIER_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4000)
    }

    /// Static assets dir: JSON field → `WA_COURIER_STATIC_DIR` → `static`.
    pub fn resolve_static_dir(&self) -> PathBuf {
        if let Some(dir) = &self.static_dir {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        std::env::var("WA_COURIER_STATIC_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("static"))
    }
}

/// Load `wa-courier.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `WA_COURIER_CONFIG` env var path
/// 2. `./wa-courier.json` (process cwd)
/// 3. `../wa-courier.json` (repo root when running from a subdirectory)
///
/// Missing file → `CourierConfig::default()` (silent, env-var fallbacks apply).
/// Parse error → log a warning, return `CourierConfig::default()`.
pub fn load_config() -> CourierConfig {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("wa-courier.json"),
            PathBuf::from("../wa-courier.json"),
        ];
        if let Ok(env_path) = std::env::var("WA_COURIER_CONFIG") {
            v.insert(0, PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<CourierConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("config: loaded {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "config: {} is not valid JSON ({}), ignoring",
                        path.display(),
                        e
                    );
                }
            },
            Err(_) => continue,
        }
    }

    CourierConfig::default()
}
