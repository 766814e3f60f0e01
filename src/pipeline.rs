//! Pipeline – ties together substitution and rendering into a single call,
//! driven by one serializable options record.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dates::DEFAULT_DATE_FORMAT;
use crate::error::{DocketError, ValidationError};
use crate::invoice::Invoice;
use crate::native::NativeLauncher;
use crate::renderer::{DocumentRenderer, PageFormat, RenderOptions, Renderer};
use crate::template::{
    ContentOptions, FieldValue, RenderedHtml, Template, TemplateOptions, UnresolvedPolicy,
};

/// MIME type of generated documents.
pub const CONTENT_TYPE: &str = "application/pdf";

/// Every knob of the pipeline. Deserializes from camelCase JSON; missing
/// keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocketOptions {
    /// dayjs-style pattern for `{{date}}` (default: `YYYY-MM-DD`).
    pub date_format: String,
    pub custom_fields: BTreeMap<String, FieldValue>,
    /// Print scale (default: 1).
    pub scale: f64,
    /// Paper size (default: A4).
    pub page_format: PageFormat,
    /// Paint backgrounds (default: true).
    pub print_background: bool,
    /// Download name; defaults to the invoice date, `YYYY-MM-DD.pdf`.
    pub filename: Option<String>,
    /// HTML-escape interpolated text (default: true).
    pub escape_html: bool,
    pub unresolved: UnresolvedPolicy,
    /// Upper bound on document loading (default: 30000).
    pub load_timeout_ms: u64,
}

impl Default for DocketOptions {
    fn default() -> Self {
        let render = RenderOptions::default();
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            custom_fields: BTreeMap::new(),
            scale: render.scale,
            page_format: render.page_format,
            print_background: render.print_background,
            filename: None,
            escape_html: true,
            unresolved: UnresolvedPolicy::default(),
            load_timeout_ms: render.load_timeout.as_millis() as u64,
        }
    }
}

impl DocketOptions {
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Payload(format!("options: {e}")))
    }

    pub fn template_options(&self) -> TemplateOptions {
        TemplateOptions {
            scale: self.scale,
            filename: self.filename.clone(),
        }
    }

    pub fn content_options(&self) -> ContentOptions {
        ContentOptions {
            date_format: self.date_format.clone(),
            custom_fields: self.custom_fields.clone(),
            escape_html: self.escape_html,
            unresolved: self.unresolved,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            print_background: self.print_background,
            page_format: self.page_format,
            scale: self.scale,
            load_timeout: Duration::from_millis(self.load_timeout_ms),
        }
    }

    /// Build a template from `source`: verbatim, or wrapped in the page shell
    /// when `fragment` is set.
    pub fn template(&self, source: &str, fragment: bool) -> Result<Template, DocketError> {
        let template = if fragment {
            Template::fragment(source, &self.template_options())?
        } else {
            Template::parse(source)?
        };
        Ok(match &self.filename {
            Some(name) => template.with_filename(name.clone()),
            None => template,
        })
    }
}

/// Rendering engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Headless Chrome (needs the `chrome` feature and a browser binary).
    Chrome,
    /// In-process printpdf renderer.
    Native,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "chrome") {
            Backend::Chrome
        } else {
            Backend::Native
        }
    }
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Chrome => "chrome",
            Backend::Native => "native",
        }
    }

    pub fn renderer(self) -> Result<Box<dyn Renderer>, DocketError> {
        match self {
            Backend::Native => Ok(Box::new(DocumentRenderer::new(NativeLauncher::new()))),
            #[cfg(feature = "chrome")]
            Backend::Chrome => Ok(Box::new(DocumentRenderer::new(
                crate::chrome::ChromeLauncher::default(),
            ))),
            #[cfg(not(feature = "chrome"))]
            Backend::Chrome => Err(crate::error::RenderError::Launch(
                "chrome backend not compiled in (enable the `chrome` feature)".to_string(),
            )
            .into()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(Backend::Chrome),
            "native" => Ok(Backend::Native),
            other => Err(ValidationError::Payload(format!("unknown backend: {other}"))),
        }
    }
}

/// A finished document ready to be served or written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocketPdf {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl DocketPdf {
    /// `attachment; filename="…"` header value. Control characters are
    /// dropped so a caller-supplied name cannot break out of the header.
    pub fn content_disposition(&self) -> String {
        let name: String = self
            .filename
            .chars()
            .filter(|c| !c.is_control())
            .map(|c| if c == '"' { '\'' } else { c })
            .collect();
        format!("attachment; filename=\"{name}\"")
    }
}

/// Substitution only: the HTML a renderer would receive.
pub fn render_invoice_html(
    template: &Template,
    invoice: &Invoice,
    options: &DocketOptions,
) -> Result<RenderedHtml, DocketError> {
    let mut rendered = template.set_content(invoice, &options.content_options())?;
    if let Some(name) = &options.filename {
        rendered.filename = name.clone();
    }
    Ok(rendered)
}

/// Full pipeline: template + invoice → PDF bytes and download name.
pub fn generate_invoice_pdf(
    template: &Template,
    invoice: &Invoice,
    options: &DocketOptions,
    renderer: &dyn Renderer,
) -> Result<DocketPdf, DocketError> {
    let rendered = render_invoice_html(template, invoice, options)?;
    let bytes = renderer.render(&rendered.html, &options.render_options())?;
    log::info!("generated {} ({} bytes)", rendered.filename, bytes.len());
    Ok(DocketPdf {
        bytes,
        filename: rendered.filename,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::InvoiceDate;
    use crate::invoice::{Client, LineItem};

    fn invoice() -> Invoice {
        Invoice::new(7u64, InvoiceDate::parse("2024-05-01").unwrap(), Client::new("Acme", "1 Road"))
            .with_billable(LineItem::new("Design", "Mockups", 2.0, 50.0))
    }

    const TEMPLATE: &str = "<h1>{{id}}</h1><table><!--BILLABLE-->\
        <tr><td>{{title}}</td><td>{{utils.subtotal}}</td></tr>\
        <!--BILLABLE--></table><p>{{utils.total}} {{custom.tax}}</p>";

    #[test]
    fn options_from_camel_case_json() {
        let options = DocketOptions::from_json(
            r#"{"dateFormat":"Do MMM","customFields":{"tax":5},"scale":0.8,"pageFormat":"letter","printBackground":false,"loadTimeoutMs":500,"unresolved":"deny"}"#,
        )
        .unwrap();
        assert_eq!(options.date_format, "Do MMM");
        assert_eq!(options.custom_fields["tax"], FieldValue::from(5));
        assert_eq!(options.page_format, PageFormat::Letter);
        assert!(!options.print_background);
        assert!(options.escape_html);
        assert_eq!(options.unresolved, UnresolvedPolicy::Deny);

        let render = options.render_options();
        assert_eq!(render.scale, 0.8);
        assert_eq!(render.load_timeout, Duration::from_millis(500));
    }

    #[test]
    fn empty_options_are_defaults() {
        assert_eq!(DocketOptions::from_json("{}").unwrap(), DocketOptions::default());
        assert_eq!(DocketOptions::default().render_options(), RenderOptions::default());
    }

    #[test]
    fn bad_options_are_payload_errors() {
        assert!(matches!(
            DocketOptions::from_json(r#"{"pageFormat":"B7"}"#),
            Err(ValidationError::Payload(_))
        ));
    }

    #[test]
    fn backend_names() {
        assert_eq!("Native".parse::<Backend>().unwrap(), Backend::Native);
        assert_eq!(" chrome ".parse::<Backend>().unwrap(), Backend::Chrome);
        assert!("webkit".parse::<Backend>().is_err());
        assert!(Backend::Native.renderer().is_ok());
    }

    #[test]
    fn pipeline_basic() {
        let template = Template::parse(TEMPLATE).unwrap();
        let options = DocketOptions::default();
        let renderer = DocumentRenderer::new(NativeLauncher::new());
        let pdf = generate_invoice_pdf(&template, &invoice(), &options, &renderer).unwrap();
        assert_eq!(&pdf.bytes[0..5], b"%PDF-");
        assert_eq!(pdf.filename, "2024-05-01.pdf");
        assert_eq!(pdf.content_disposition(), "attachment; filename=\"2024-05-01.pdf\"");
    }

    #[test]
    fn content_disposition_strips_control_characters() {
        let pdf = DocketPdf {
            bytes: Vec::new(),
            filename: "a.pdf\r\nX-Evil: 1\t\"x\"".to_string(),
        };
        assert_eq!(pdf.content_disposition(), "attachment; filename=\"a.pdfX-Evil: 1'x'\"");
    }

    #[test]
    fn filename_override_wins() {
        let options = DocketOptions {
            filename: Some("acme-7.pdf".into()),
            ..DocketOptions::default()
        };
        let template = options.template(TEMPLATE, false).unwrap();
        assert_eq!(template.filename(), "acme-7.pdf");
        let rendered = render_invoice_html(&template, &invoice(), &options).unwrap();
        assert_eq!(rendered.filename, "acme-7.pdf");
    }

    #[test]
    fn fragment_templates_get_a_page_shell() {
        let template = DocketOptions::default().template(TEMPLATE, true).unwrap();
        let rendered =
            render_invoice_html(&template, &invoice(), &DocketOptions::default()).unwrap();
        assert!(rendered.html.starts_with("<html>"));
        assert!(rendered.html.contains("<td>Design</td><td>100</td>"));
        assert_eq!(rendered.unresolved, vec!["custom.tax".to_string()]);
    }
}
