use crate::browser::config::{ConnectionOptions, LaunchOptions};
use crate::dom::{self, DomTree};
use crate::error::{Result, SyringeError};
use crate::protocol::PageInfo;
use headless_chrome::{Browser, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

/// Browser session that manages a Chrome/Chromium instance
pub struct BrowserSession {
    browser: Browser,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Pages may behave differently when they detect automation
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // Keep the browser alive between slow CLI steps (default is 30 seconds)
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.path = options.chrome_path;
        launch_opts.user_data_dir = options.user_data_dir;
        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| SyringeError::LaunchFailed(e.to_string()))?;

        browser
            .new_tab()
            .map_err(|e| SyringeError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        Ok(Self { browser })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser = Browser::connect_with_timeout(options.ws_url, Duration::from_millis(options.timeout))
            .map_err(|e| SyringeError::ConnectionFailed(e.to_string()))?;

        Ok(Self { browser })
    }

    /// Launch a browser with default options
    pub fn new() -> Result<Self> {
        Self::launch(LaunchOptions::default())
    }

    /// Get the active tab
    pub fn tab(&self) -> Result<Arc<Tab>> {
        self.get_active_tab()
    }

    pub fn new_tab(&self) -> Result<Arc<Tab>> {
        self.browser
            .new_tab()
            .map_err(|e| SyringeError::TabOperationFailed(format!("Failed to create tab: {}", e)))
    }

    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| SyringeError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// Find an open tab by its DevTools target id
    pub fn tab_by_target(&self, target_id: &str) -> Result<Arc<Tab>> {
        self.get_tabs()?
            .into_iter()
            .find(|t| t.get_target_id() == target_id)
            .ok_or_else(|| SyringeError::TabOperationFailed(format!("Tab {} is no longer open", target_id)))
    }

    /// Get the currently active tab by checking the document visibility and focus state
    pub fn get_active_tab(&self) -> Result<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        // Visible and focused is the strongest signal, visible alone the fallback
        for probe in [
            "document.visibilityState === 'visible' && document.hasFocus()",
            "document.visibilityState === 'visible'",
        ] {
            for tab in &tabs {
                match tab.evaluate(probe, false) {
                    Ok(remote_object) => {
                        if remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                            return Ok(tab.clone());
                        }
                    }
                    Err(e) => log::debug!("Failed to check tab status: {}", e),
                }
            }
        }

        // A headless browser with a single page reports no focus at all
        tabs.last()
            .cloned()
            .ok_or_else(|| SyringeError::TabOperationFailed("No active tab found".to_string()))
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Navigate the active tab to a URL
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab()?
            .navigate_to(url)
            .map_err(|e| SyringeError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        Ok(())
    }

    /// Wait for navigation to complete
    pub fn wait_for_navigation(&self) -> Result<()> {
        self.tab()?
            .wait_until_navigated()
            .map_err(|e| SyringeError::NavigationFailed(format!("Navigation timeout: {}", e)))?;

        Ok(())
    }

    /// Snapshot the active tab's document
    pub fn snapshot_dom(&self) -> Result<DomTree> {
        dom::snapshot_dom(&self.tab()?)
    }

    /// URL and title of a tab
    pub fn page_info(tab: &Arc<Tab>) -> Result<PageInfo> {
        let title = tab
            .get_title()
            .map_err(|e| SyringeError::TabOperationFailed(format!("Failed to read title: {}", e)))?;
        Ok(PageInfo {
            url: tab.get_url(),
            title,
        })
    }

    /// Close every tab; the browser process exits when the session is dropped
    pub fn close(&self) -> Result<()> {
        for tab in self.get_tabs()? {
            let _ = tab.close(false);
        }
        Ok(())
    }
}
