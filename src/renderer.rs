//! Document renderer – turns substituted HTML into PDF bytes.
//!
//! Rendering is split into a capability ([`Renderer`]) and the engines that
//! provide it. An engine only has to know how to open a [`RenderSession`];
//! [`DocumentRenderer`] owns the orchestration and guarantees that every
//! session it opens is closed again, whatever happens in between:
//!
//! 1. launch an isolated session
//! 2. load the HTML and wait for DOM content loaded
//! 3. emulate `screen` media
//! 4. print to PDF
//! 5. close the session

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocketError, RenderError, ValidationError};

/// Scale bounds accepted by browser print pipelines.
pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 2.0;

/// Check that `scale` is finite and within [`MIN_SCALE`, `MAX_SCALE`].
pub fn validate_scale(scale: f64) -> Result<f64, ValidationError> {
    if scale.is_finite() && (MIN_SCALE..=MAX_SCALE).contains(&scale) {
        Ok(scale)
    } else {
        Err(ValidationError::InvalidScale(scale))
    }
}

/// Paper sizes understood by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageFormat {
    /// `(width, height)` in millimetres, portrait.
    pub fn size_mm(self) -> (f32, f32) {
        match self {
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A5 => (148.0, 210.0),
            PageFormat::Letter => (215.9, 279.4),
            PageFormat::Legal => (215.9, 355.6),
            PageFormat::Tabloid => (279.4, 431.8),
        }
    }

    /// `(width, height)` in PDF points.
    pub fn size_pt(self) -> (f32, f32) {
        let (w, h) = self.size_mm();
        (w / 25.4 * 72.0, h / 25.4 * 72.0)
    }

    /// `(width, height)` in inches.
    pub fn size_in(self) -> (f64, f64) {
        let (w, h) = self.size_mm();
        (f64::from(w) / 25.4, f64::from(h) / 25.4)
    }

    pub fn name(self) -> &'static str {
        match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "Letter",
            PageFormat::Legal => "Legal",
            PageFormat::Tabloid => "Tabloid",
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PageFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            "tabloid" => Ok(PageFormat::Tabloid),
            _ => Err(ValidationError::UnknownPageFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for PageFormat {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PageFormat> for String {
    fn from(format: PageFormat) -> Self {
        format.name().to_string()
    }
}

/// Output parameters for a single render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Paint background colours and images (default: true).
    pub print_background: bool,
    pub page_format: PageFormat,
    /// Print scale factor (default: 1).
    pub scale: f64,
    /// Upper bound on waiting for DOM content loaded (default: 30 s).
    pub load_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            print_background: true,
            page_format: PageFormat::A4,
            scale: 1.0,
            load_timeout: Duration::from_secs(30),
        }
    }
}

/// Anything that can turn HTML into PDF bytes.
pub trait Renderer: Send + Sync {
    fn render(&self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, DocketError>;
}

/// Opens isolated rendering sessions. One session serves exactly one render.
pub trait SessionLauncher: Send + Sync {
    type Session: RenderSession;

    /// Engine name used in log lines.
    fn name(&self) -> &'static str;

    fn launch(&self) -> Result<Self::Session, RenderError>;
}

/// A live rendering session.
///
/// Implementations must also release their resources on `Drop`, so a panic
/// between launch and close cannot leak a session.
pub trait RenderSession {
    /// Load `html` and wait until its DOM content has loaded.
    fn load(&mut self, html: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Make `screen` (not `print`) stylesheets govern the output.
    fn emulate_screen_media(&mut self) -> Result<(), RenderError>;

    fn print_pdf(&mut self, options: &RenderOptions) -> Result<Vec<u8>, RenderError>;

    /// Tear the session down.
    fn close(self) -> Result<(), RenderError>;
}

/// The [`Renderer`] built on top of a [`SessionLauncher`].
#[derive(Debug, Clone, Default)]
pub struct DocumentRenderer<L> {
    launcher: L,
}

impl<L: SessionLauncher> DocumentRenderer<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run one load → emulate → print cycle in a fresh session.
    pub fn generate(&self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, DocketError> {
        validate_scale(options.scale)?;

        let engine = self.launcher.name();
        log::debug!("{engine}: launching rendering session");
        let mut session = self.launcher.launch()?;

        let captured = capture(&mut session, html, options);

        match session.close() {
            Ok(()) => log::debug!("{engine}: rendering session closed"),
            Err(e) => log::warn!("{engine}: failed to close rendering session cleanly: {e}"),
        }

        let bytes = captured?;
        if bytes.is_empty() {
            return Err(RenderError::EmptyOutput.into());
        }
        if !bytes.starts_with(b"%PDF-") {
            return Err(RenderError::Capture("output is not a PDF document".to_string()).into());
        }
        log::debug!("{engine}: captured {} bytes", bytes.len());
        Ok(bytes)
    }
}

impl<L: SessionLauncher> Renderer for DocumentRenderer<L> {
    fn render(&self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, DocketError> {
        self.generate(html, options)
    }
}

fn capture<S: RenderSession>(
    session: &mut S,
    html: &str,
    options: &RenderOptions,
) -> Result<Vec<u8>, RenderError> {
    session.load(html, options.load_timeout)?;
    session.emulate_screen_media()?;
    session.print_pdf(options)
}
