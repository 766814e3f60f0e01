//! Placeholder accessor tables.
//!
//! Each placeholder the engine understands maps to a typed accessor, so a
//! dotted path such as `client.name` is resolved by table lookup instead of
//! walking the record at runtime. Table order is substitution order.

use crate::invoice::{format_number, total_of, Invoice, PricedLine};

/// Literal that opens and closes the repeated billable block.
pub const BILLABLE_MARKER: &str = "<!--BILLABLE-->";

/// Whether an accessor yields caller text (escaped) or a formatted number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

/// Inputs available to the top-level scalar accessors.
pub struct ScalarContext<'a> {
    pub invoice: &'a Invoice,
    pub date_format: &'a str,
}

pub type ScalarAccessor = fn(&ScalarContext<'_>) -> String;
pub type LineAccessor = fn(&PricedLine<'_>) -> String;
pub type UtilityAccessor = fn(&[PricedLine<'_>]) -> String;

pub const SCALAR_FIELDS: [(&str, FieldKind, ScalarAccessor); 4] = [
    ("id", FieldKind::Text, invoice_id),
    ("date", FieldKind::Text, invoice_date),
    ("client.name", FieldKind::Text, client_name),
    ("client.address", FieldKind::Text, client_address),
];

pub const LINE_FIELDS: [(&str, FieldKind, LineAccessor); 5] = [
    ("title", FieldKind::Text, line_title),
    ("description", FieldKind::Text, line_description),
    ("hours", FieldKind::Number, line_hours),
    ("rate", FieldKind::Number, line_rate),
    ("utils.subtotal", FieldKind::Number, line_subtotal),
];

pub const UTILITY_FIELDS: [(&str, UtilityAccessor); 1] = [("utils.total", utils_total)];

/// Prefix of caller-supplied custom placeholders.
pub const CUSTOM_PREFIX: &str = "custom.";

/// `{{path}}`
pub fn placeholder(path: &str) -> String {
    format!("{{{{{path}}}}}")
}

fn invoice_id(ctx: &ScalarContext<'_>) -> String {
    ctx.invoice.id.to_string()
}

fn invoice_date(ctx: &ScalarContext<'_>) -> String {
    ctx.invoice.date.format(ctx.date_format)
}

fn client_name(ctx: &ScalarContext<'_>) -> String {
    ctx.invoice.client.name.clone()
}

fn client_address(ctx: &ScalarContext<'_>) -> String {
    ctx.invoice.client.address.clone()
}

fn line_title(line: &PricedLine<'_>) -> String {
    line.item.title.clone()
}

fn line_description(line: &PricedLine<'_>) -> String {
    line.item.description.clone()
}

fn line_hours(line: &PricedLine<'_>) -> String {
    format_number(line.hours)
}

fn line_rate(line: &PricedLine<'_>) -> String {
    format_number(line.rate)
}

fn line_subtotal(line: &PricedLine<'_>) -> String {
    format_number(line.subtotal())
}

fn utils_total(lines: &[PricedLine<'_>]) -> String {
    format_number(total_of(lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_wraps_path_in_braces() {
        assert_eq!(placeholder("client.name"), "{{client.name}}");
    }

    #[test]
    fn tables_cover_the_fixed_grammar() {
        let scalars: Vec<_> = SCALAR_FIELDS.iter().map(|(name, _, _)| *name).collect();
        assert_eq!(scalars, ["id", "date", "client.name", "client.address"]);

        let lines: Vec<_> = LINE_FIELDS.iter().map(|(name, _, _)| *name).collect();
        assert_eq!(lines, ["title", "description", "hours", "rate", "utils.subtotal"]);

        assert_eq!(UTILITY_FIELDS[0].0, "utils.total");
    }
}
