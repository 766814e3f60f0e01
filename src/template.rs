//! Template engine – ordered placeholder substitution over an invoice.
//!
//! A template is split once, at construction, into three immutable segments
//! around the billable block:
//!
//! ```text
//! head <!--BILLABLE--> row <!--BILLABLE--> tail
//! ```
//!
//! [`Template::set_content`] then runs four passes, each producing fresh
//! buffers from the previous ones:
//!
//! 1. **Scalars** – `id`, `date`, `client.name`, `client.address` in every
//!    segment.
//! 2. **Billables** – `row` is instantiated once per line item and the
//!    results replace the whole marker span.
//! 3. **Utilities** – `utils.total`.
//! 4. **Custom** – `custom.<key>` for every caller-supplied key.
//!
//! Every pass replaces all occurrences of a placeholder.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dates::DEFAULT_DATE_FORMAT;
use crate::error::{DocketError, TemplateError};
use crate::fields::{
    placeholder, FieldKind, ScalarContext, BILLABLE_MARKER, CUSTOM_PREFIX, LINE_FIELDS,
    SCALAR_FIELDS, UTILITY_FIELDS,
};
use crate::invoice::{format_json_number, format_number, Invoice, PricedLine};
use crate::renderer::validate_scale;

/// A4 page size in CSS pixels at 96 dpi.
const PAGE_WIDTH_PX: f64 = 793.0;
const PAGE_HEIGHT_PX: f64 = 1120.0;

/// What to do with placeholders still present after every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Leave them in the output silently.
    Ignore,
    /// Leave them in the output, log a warning and report them.
    #[default]
    Warn,
    /// Fail with [`TemplateError::UnresolvedPlaceholders`].
    Deny,
}

/// Value of a caller-supplied custom field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => f.write_str(&format_json_number(n)),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(n.into())
    }
}

/// Options applied when the template is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOptions {
    /// Print scale the page shell compensates for (default: 1).
    pub scale: f64,
    /// Overrides the file name derived from the invoice date.
    pub filename: Option<String>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            filename: None,
        }
    }
}

/// Options applied to a single substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentOptions {
    /// dayjs-style pattern for `{{date}}` (default: `YYYY-MM-DD`).
    pub date_format: String,
    /// Values for `{{custom.<key>}}` placeholders.
    pub custom_fields: BTreeMap<String, FieldValue>,
    /// HTML-escape interpolated text (default: true).
    pub escape_html: bool,
    pub unresolved: UnresolvedPolicy,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            custom_fields: BTreeMap::new(),
            escape_html: true,
            unresolved: UnresolvedPolicy::Warn,
        }
    }
}

impl ContentOptions {
    pub fn with_custom_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }
}

/// Result of a substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHtml {
    pub html: String,
    /// Suggested download name, e.g. `2024-05-01.pdf`.
    pub filename: String,
    /// Placeholder paths left in `html`, in order of first appearance.
    pub unresolved: Vec<String>,
}

/// A parsed invoice template. Immutable and shareable across threads.
#[derive(Debug, Clone)]
pub struct Template {
    head: String,
    row: String,
    tail: String,
    filename: Option<String>,
    default_filename: String,
}

impl Template {
    /// Parse a complete template, used verbatim.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let found = source.matches(BILLABLE_MARKER).count();
        let (first, last) = match (source.find(BILLABLE_MARKER), source.rfind(BILLABLE_MARKER)) {
            (Some(first), Some(last)) if found >= 2 => (first, last),
            _ => {
                return Err(TemplateError::MalformedTemplate {
                    marker: BILLABLE_MARKER,
                    found,
                })
            }
        };
        if found > 2 {
            log::debug!("template has {found} billable markers; using the outermost pair");
        }

        Ok(Self {
            head: source[..first].to_string(),
            row: source[first + BILLABLE_MARKER.len()..last].trim().to_string(),
            tail: source[last + BILLABLE_MARKER.len()..].to_string(),
            filename: None,
            default_filename: format!("{}.pdf", chrono::Local::now().format("%Y-%m-%d")),
        })
    }

    /// Wrap an HTML fragment in a full page shell sized for `options.scale`.
    pub fn fragment(fragment: &str, options: &TemplateOptions) -> Result<Self, DocketError> {
        let scale = validate_scale(options.scale)?;
        let mut template = Self::parse(&page_shell(fragment, scale))?;
        template.filename = options.filename.clone();
        Ok(template)
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// File name before any invoice is applied: the override, or today's
    /// date.
    pub fn filename(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.default_filename)
    }

    /// Substitute `invoice` into the template.
    ///
    /// Hours and rates are validated before any text is produced.
    pub fn set_content(
        &self,
        invoice: &Invoice,
        options: &ContentOptions,
    ) -> Result<RenderedHtml, DocketError> {
        let lines = invoice.priced_lines()?;
        let escape = options.escape_html;

        let ctx = ScalarContext {
            invoice,
            date_format: &options.date_format,
        };
        let scalars: Vec<(String, String)> = SCALAR_FIELDS
            .iter()
            .map(|(path, kind, accessor)| {
                (placeholder(path), interpolate(accessor(&ctx), *kind, escape))
            })
            .collect();
        let head = replace_all(&self.head, &scalars);
        let row = replace_all(&self.row, &scalars);
        let tail = replace_all(&self.tail, &scalars);
        log::debug!("scalar pass done for invoice {}", invoice.id);

        let rows = expand_rows(&row, &lines, escape);
        let html = format!("{head}{rows}{tail}");
        log::debug!("expanded {} billable rows", lines.len());

        let utilities: Vec<(String, String)> = UTILITY_FIELDS
            .iter()
            .map(|(path, accessor)| (placeholder(path), accessor(lines.as_slice())))
            .collect();
        let html = replace_all(&html, &utilities);

        let custom: Vec<(String, String)> = options
            .custom_fields
            .iter()
            .map(|(key, value)| {
                (
                    placeholder(&format!("{CUSTOM_PREFIX}{key}")),
                    interpolate(value.to_string(), FieldKind::Text, escape),
                )
            })
            .collect();
        let html = replace_all(&html, &custom);

        let unresolved = unresolved_placeholders(&html);
        if !unresolved.is_empty() {
            match options.unresolved {
                UnresolvedPolicy::Ignore => {}
                UnresolvedPolicy::Warn => {
                    log::warn!("unresolved placeholders left in output: {}", unresolved.join(", "));
                }
                UnresolvedPolicy::Deny => {
                    return Err(TemplateError::UnresolvedPlaceholders(unresolved).into());
                }
            }
        }

        let filename = self
            .filename
            .clone()
            .unwrap_or_else(|| format!("{}.pdf", invoice.date.iso_date()));

        Ok(RenderedHtml {
            html,
            filename,
            unresolved,
        })
    }
}

/// `<html><body><style>…</style>FRAGMENT</body></html>` with the page box
/// enlarged by `2 - scale` so it fills the sheet once printed at `scale`.
pub fn page_shell(fragment: &str, scale: f64) -> String {
    let px = |n: f64| format!("{}px", format_number(n * (1.0 + (1.0 - scale))));
    let styles = format!(
        "html,body{{margin:0;padding:0;width:{};height:{};position:relative;}}",
        px(PAGE_WIDTH_PX),
        px(PAGE_HEIGHT_PX)
    );
    format!("<html><body><style>{styles}</style>{fragment}</body></html>")
}

fn expand_rows(row: &str, lines: &[PricedLine<'_>], escape: bool) -> String {
    let mut out = String::new();
    for line in lines {
        let values: Vec<(String, String)> = LINE_FIELDS
            .iter()
            .map(|(path, kind, accessor)| {
                (placeholder(path), interpolate(accessor(line), *kind, escape))
            })
            .collect();
        out.push_str(&replace_all(row, &values));
    }
    out
}

fn replace_all(buffer: &str, substitutions: &[(String, String)]) -> String {
    substitutions
        .iter()
        .fold(buffer.to_string(), |acc, (token, value)| acc.replace(token.as_str(), value))
}

fn interpolate(value: String, kind: FieldKind, escape: bool) -> String {
    match kind {
        FieldKind::Text if escape => escape_html(&value),
        _ => value,
    }
}

/// Escape text for insertion into HTML. Braces are escaped too so that an
/// interpolated value can never form a placeholder for a later pass.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            c => out.push(c),
        }
    }
    out
}

/// Placeholder paths still present in `html`, deduplicated.
pub fn unresolved_placeholders(html: &str) -> Vec<String> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern is valid"));

    let mut found: Vec<String> = Vec::new();
    for caps in re.captures_iter(html) {
        let path = caps[1].to_string();
        if !found.contains(&path) {
            found.push(path);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::InvoiceDate;
    use crate::error::ValidationError;
    use crate::invoice::{Client, LineItem};

    fn invoice() -> Invoice {
        Invoice::new(
            1u64,
            InvoiceDate::parse("2022-09-01").unwrap(),
            Client::new("Acme", "1 Main St"),
        )
    }

    fn billed() -> Invoice {
        invoice()
            .with_billable(LineItem::new("Design", "Mockups", 2u32, 50u32))
            .with_billable(LineItem::new("Build", "Code", 1u32, 75u32))
    }

    #[test]
    fn markers_and_empty_block_are_consumed() {
        let t = Template::parse("{{id}} {{client.name}} <!--BILLABLE--><!--BILLABLE-->").unwrap();
        let out = t.set_content(&invoice(), &ContentOptions::default()).unwrap();
        assert_eq!(out.html, "1 Acme ");
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn single_marker_is_malformed() {
        let err = Template::parse("<p>{{id}}</p><!--BILLABLE--><tr></tr>").unwrap_err();
        assert_eq!(
            err,
            TemplateError::MalformedTemplate {
                marker: BILLABLE_MARKER,
                found: 1
            }
        );
    }

    #[test]
    fn missing_markers_are_malformed() {
        assert!(matches!(
            Template::parse("<p>{{id}}</p>"),
            Err(TemplateError::MalformedTemplate { found: 0, .. })
        ));
    }

    #[test]
    fn rows_subtotals_and_total() {
        let t = Template::parse(
            "<table><!--BILLABLE-->\n  <tr>{{title}}:{{hours}}x{{rate}}={{utils.subtotal}}</tr>\n<!--BILLABLE--></table>Total {{utils.total}}",
        )
        .unwrap();
        let out = t.set_content(&billed(), &ContentOptions::default()).unwrap();
        assert_eq!(
            out.html,
            "<table><tr>Design:2x50=100</tr><tr>Build:1x75=75</tr></table>Total 175"
        );
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let t = Template::parse(
            "{{id}}/{{id}}/{{date}}<!--BILLABLE-->{{title}}{{title}}<!--BILLABLE-->\
             {{utils.total}}{{utils.total}}",
        )
        .unwrap();
        let inv = invoice().with_billable(LineItem::new("x", "", 1u32, 2u32));
        let out = t.set_content(&inv, &ContentOptions::default()).unwrap();
        assert_eq!(out.html, "1/1/2022-09-01xx22");
    }

    #[test]
    fn scalars_resolve_inside_rows() {
        let t = Template::parse("<!--BILLABLE--><i>{{id}}-{{title}}</i><!--BILLABLE-->").unwrap();
        let out = t.set_content(&billed(), &ContentOptions::default()).unwrap();
        assert_eq!(out.html, "<i>1-Design</i><i>1-Build</i>");
    }

    #[test]
    fn date_format_is_applied() {
        let t = Template::parse("{{date}}<!--BILLABLE--><!--BILLABLE-->").unwrap();
        let options = ContentOptions {
            date_format: "Do MMMM[, ]YYYY".to_string(),
            ..ContentOptions::default()
        };
        let out = t.set_content(&invoice(), &options).unwrap();
        assert_eq!(out.html, "1st September, 2022");
    }

    #[test]
    fn custom_fields_and_missing_keys() {
        let t =
            Template::parse("Tax {{custom.tax}} {{custom.missing}}<!--BILLABLE--><!--BILLABLE-->")
                .unwrap();
        let options = ContentOptions::default()
            .with_custom_field("tax", 100)
            .with_custom_field("unused", "ignored");
        let out = t.set_content(&invoice(), &options).unwrap();
        assert_eq!(out.html, "Tax 100 {{custom.missing}}");
        assert_eq!(out.unresolved, vec!["custom.missing".to_string()]);
    }

    #[test]
    fn deny_policy_fails_on_leftovers() {
        let t = Template::parse("{{custom.missing}}<!--BILLABLE--><!--BILLABLE-->").unwrap();
        let options = ContentOptions {
            unresolved: UnresolvedPolicy::Deny,
            ..ContentOptions::default()
        };
        let err = t.set_content(&invoice(), &options).unwrap_err();
        match err {
            DocketError::Template(TemplateError::UnresolvedPlaceholders(paths)) => {
                assert_eq!(paths, ["custom.missing".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn text_is_escaped_by_default() {
        let mut inv = invoice();
        inv.client.name = "<script>alert('x')</script> & {{custom.tax}}".to_string();
        let t = Template::parse("{{client.name}}<!--BILLABLE--><!--BILLABLE-->").unwrap();
        let options = ContentOptions::default().with_custom_field("tax", 5);
        let out = t.set_content(&inv, &options).unwrap();
        assert_eq!(
            out.html,
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; &#123;&#123;custom.tax&#125;&#125;"
        );
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn escaping_can_be_disabled() {
        let mut inv = invoice();
        inv.client.name = "<b>Acme</b>".to_string();
        let t = Template::parse("{{client.name}}<!--BILLABLE--><!--BILLABLE-->").unwrap();
        let options = ContentOptions {
            escape_html: false,
            ..ContentOptions::default()
        };
        assert_eq!(t.set_content(&inv, &options).unwrap().html, "<b>Acme</b>");
    }

    #[test]
    fn invalid_hours_fail_before_substitution() {
        let t = Template::parse("<!--BILLABLE-->{{hours}}<!--BILLABLE-->").unwrap();
        let inv = invoice().with_billable(LineItem::new("x", "", "lots", 1u32));
        let err = t.set_content(&inv, &ContentOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            DocketError::Validation(ValidationError::NotANumber { index: 0, field: "hours", .. })
        ));
    }

    #[test]
    fn filename_follows_invoice_date_unless_overridden() {
        let t = Template::parse("<!--BILLABLE--><!--BILLABLE-->").unwrap();
        assert!(t.filename().ends_with(".pdf"));
        let out = t.set_content(&invoice(), &ContentOptions::default()).unwrap();
        assert_eq!(out.filename, "2022-09-01.pdf");

        let t = t.with_filename("acme.pdf");
        assert_eq!(t.filename(), "acme.pdf");
        let out = t.set_content(&invoice(), &ContentOptions::default()).unwrap();
        assert_eq!(out.filename, "acme.pdf");
    }

    #[test]
    fn fragment_is_wrapped_in_scaled_shell() {
        let options = TemplateOptions {
            scale: 0.5,
            filename: Some("x.pdf".to_string()),
        };
        let t =
            Template::fragment("<p>{{id}}</p><!--BILLABLE--><!--BILLABLE-->", &options).unwrap();
        let out = t.set_content(&invoice(), &ContentOptions::default()).unwrap();
        assert_eq!(
            out.html,
            "<html><body><style>html,body{margin:0;padding:0;width:1189.5px;height:1680px;position:relative;}</style><p>1</p></body></html>"
        );
        assert_eq!(out.filename, "x.pdf");
    }

    #[test]
    fn fragment_rejects_bad_scale() {
        let options = TemplateOptions {
            scale: 0.0,
            filename: None,
        };
        assert!(matches!(
            Template::fragment("<!--BILLABLE--><!--BILLABLE-->", &options),
            Err(DocketError::Validation(ValidationError::InvalidScale(_)))
        ));
    }

    #[test]
    fn template_is_reusable_across_threads() {
        let t = Template::parse("#{{id}}<!--BILLABLE-->[{{title}}]<!--BILLABLE-->").unwrap();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8u64)
                .map(|i| {
                    let t = &t;
                    s.spawn(move || {
                        let date = InvoiceDate::parse("2024-01-01").unwrap();
                        let inv = Invoice::new(i, date, Client::new("c", "a"))
                            .with_billable(LineItem::new(format!("item{i}"), "", 1u32, 1u32));
                        t.set_content(&inv, &ContentOptions::default()).unwrap().html
                    })
                })
                .collect();
            for (i, h) in handles.into_iter().enumerate() {
                assert_eq!(h.join().unwrap(), format!("#{i}[item{i}]"));
            }
        });
    }
}
