//! Headless Chrome rendering engine.
//!
//! Every session is a separate browser process, so concurrent renders share
//! nothing. The tab is parked on `about:blank` and the document is pushed
//! into its main frame with `Page.setDocumentContent`, so its size is not
//! bound by URL limits. It is considered ready once `document.readyState`
//! leaves `loading`; external resources referenced by the template may
//! still be in flight when the PDF is taken.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Page::SetDocumentContent;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::error::RenderError;
use crate::renderer::{RenderOptions, RenderSession, SessionLauncher};

/// Environment variable naming a Chrome/Chromium binary.
pub const CHROME_PATH_ENV: &str = "DOCKET_CHROME_PATH";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(25);

const BLANK_PAGE: &str = "about:blank";

/// True once the pushed document has been parsed.
const READY_EXPRESSION: &str =
    "document.documentElement !== null && document.readyState !== 'loading'";

/// Launches one headless browser per rendering session.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    /// Explicit browser binary; falls back to [`CHROME_PATH_ENV`], then to
    /// auto-detection.
    pub chrome_path: Option<PathBuf>,
    /// Run Chrome's sandbox (disable inside unprivileged containers).
    pub sandbox: bool,
    /// Kill the browser if it stays idle this long.
    pub idle_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self {
            chrome_path: env::var_os(CHROME_PATH_ENV).map(PathBuf::from),
            sandbox: true,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    fn name(&self) -> &'static str {
        "chrome"
    }

    fn launch(&self) -> Result<ChromeSession, RenderError> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(self.sandbox)
            .path(self.chrome_path.clone())
            .idle_browser_timeout(self.idle_timeout)
            .build()
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| RenderError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Launch(format!("could not open tab: {e}")))?;

        Ok(ChromeSession {
            browser: Some(browser),
            tab,
        })
    }
}

/// A browser process with a single tab.
pub struct ChromeSession {
    // Dropping the browser kills the process.
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl RenderSession for ChromeSession {
    fn load(&mut self, html: &str, timeout: Duration) -> Result<(), RenderError> {
        self.tab
            .navigate_to(BLANK_PAGE)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| RenderError::Load(e.to_string()))?;

        // The main frame of a page target shares the target's id.
        let frame_id = self.tab.get_target_id().clone();
        self.tab
            .call_method(document_content(frame_id, html))
            .map_err(|e| RenderError::Load(e.to_string()))?;

        let tab = Arc::clone(&self.tab);
        wait_until_ready(timeout, READY_POLL_INTERVAL, || {
            tab.evaluate(READY_EXPRESSION, false)
                .map(|ready| ready.value == Some(serde_json::Value::Bool(true)))
                .map_err(|e| e.to_string())
        })
    }

    fn emulate_screen_media(&mut self) -> Result<(), RenderError> {
        self.tab
            .call_method(Emulation::SetEmulatedMedia {
                media: Some("screen".to_string()),
                features: None,
            })
            .map(|_| ())
            .map_err(|e| RenderError::Emulation(e.to_string()))
    }

    fn print_pdf(&mut self, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
        let (width, height) = options.page_format.size_in();
        let params = PrintToPdfOptions {
            print_background: Some(options.print_background),
            scale: Some(options.scale),
            paper_width: Some(width),
            paper_height: Some(height),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        self.tab
            .print_to_pdf(Some(params))
            .map_err(|e| RenderError::Capture(e.to_string()))
    }

    fn close(mut self) -> Result<(), RenderError> {
        let closed = self.tab.close(false).map(|_| ());
        self.browser.take();
        closed.map_err(|e| RenderError::Teardown(format!("closing tab: {e}")))
    }
}

fn document_content(frame_id: String, html: &str) -> SetDocumentContent {
    SetDocumentContent {
        frame_id,
        html: html.to_string(),
    }
}

/// Poll `check` until it reports ready or `timeout` elapses. Errors count as
/// "not ready yet": the execution context is replaced while the new document
/// commits, and evaluations against the old one fail.
fn wait_until_ready(
    timeout: Duration,
    interval: Duration,
    mut check: impl FnMut() -> Result<bool, String>,
) -> Result<(), RenderError> {
    let deadline = Instant::now() + timeout;
    loop {
        match check() {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => log::debug!("chrome: document not ready: {e}"),
        }
        if Instant::now() >= deadline {
            return Err(RenderError::Timeout(timeout));
        }
        thread::sleep(interval);
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if self.browser.take().is_some() {
            log::debug!("chrome: browser process released");
        }
    }
}
