use std::time::Duration;

/// Default age after which a Last Selection Record is considered stale
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Default pause between injecting the page agent and retrying a message
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Default bound on extracted display text, in characters
pub const DEFAULT_TEXT_LIMIT: usize = 500;

/// URL prefixes of pages the agent may never be injected into
pub const DEFAULT_RESTRICTED_PREFIXES: [&str; 5] = [
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "moz-extension://",
];

/// Platform flavour, only used to render the confirm-key hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    Other,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Other
        }
    }

    /// Human-readable confirm chord shown in the picker overlay
    pub fn confirm_hint(&self) -> &'static str {
        match self {
            Platform::Mac => "⌘⇧E",
            Platform::Other => "Ctrl+Shift+E",
        }
    }
}

/// Tunables shared by every execution context
#[derive(Debug, Clone)]
pub struct SyringeConfig {
    /// Maximum age of a Last Selection Record that recovery will still apply
    pub freshness_window: Duration,

    /// Delay between agent injection and the single retry
    pub settle_delay: Duration,

    /// Maximum number of characters of extracted text
    pub text_limit: usize,

    /// Platform used for key hints
    pub platform: Platform,

    /// URL prefixes treated as restricted surfaces
    pub restricted_prefixes: Vec<String>,
}

impl Default for SyringeConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            settle_delay: DEFAULT_SETTLE_DELAY,
            text_limit: DEFAULT_TEXT_LIMIT,
            platform: Platform::current(),
            restricted_prefixes: DEFAULT_RESTRICTED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl SyringeConfig {
    /// Create config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set freshness window
    pub fn freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Builder: set settle delay
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Builder: set text limit
    pub fn text_limit(mut self, limit: usize) -> Self {
        self.text_limit = limit;
        self
    }

    /// Builder: set platform
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Builder: add a restricted URL prefix
    pub fn restrict_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.restricted_prefixes.push(prefix.into());
        self
    }

    /// Whether a page URL is a surface the agent must never touch.
    ///
    /// A tab without a known URL is treated as restricted.
    pub fn is_restricted(&self, url: Option<&str>) -> bool {
        match url {
            Some(url) => self
                .restricted_prefixes
                .iter()
                .any(|prefix| url.starts_with(prefix.as_str())),
            None => true,
        }
    }
}
