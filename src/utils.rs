//! Helpers for invoice dashboards: line and invoice totals, USD currency
//! formatting and per-period revenue statistics.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::dates::{format_pattern, InvoiceDate};
use crate::error::ValidationError;
use crate::invoice::{Invoice, LineItem};

/// `hours × rate` of a single line item.
pub fn subtotal(item: &LineItem) -> Result<f64, ValidationError> {
    Ok(item.hours.value(0, "hours")? * item.rate.value(0, "rate")?)
}

/// Sum of all line subtotals.
pub fn total(invoice: &Invoice) -> Result<f64, ValidationError> {
    invoice.total()
}

/// Format an invoice date with a dayjs-style pattern.
pub fn format_date(date: &InvoiceDate, pattern: &str) -> String {
    format_pattern(&date.datetime(), pattern)
}

/// en-US dollar amount: `$1,234.50`, `-$5.00`.
pub fn format_currency(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-$∞" } else { "$∞" }.to_string();
    }

    let cents = (value.abs() * 100.0).round() as u128;
    let (dollars, cents) = (cents / 100, cents % 100);
    let digits = dollars.to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && (dollars > 0 || cents > 0) { "-" } else { "" };
    format!("{sign}${grouped}.{cents:02}")
}

/// Revenue of the invoices dated in the same calendar year and month as
/// `today`, formatted as currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub year: String,
    pub month: String,
}

pub fn statistics(invoices: &[Invoice], today: NaiveDate) -> Result<Statistics, ValidationError> {
    let mut year = 0.0;
    let mut month = 0.0;
    for invoice in invoices {
        let date = invoice.date.date();
        if date.year() != today.year() {
            continue;
        }
        let total = invoice.total()?;
        year += total;
        if date.month() == today.month() {
            month += total;
        }
    }
    log::debug!("statistics over {} invoices: year={year} month={month}", invoices.len());
    Ok(Statistics {
        year: format_currency(year),
        month: format_currency(month),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::Client;

    fn invoice(date: &str, hours: f64, rate: f64) -> Invoice {
        Invoice::new(1u64, InvoiceDate::parse(date).unwrap(), Client::new("Acme", ""))
            .with_billable(LineItem::new("Work", "", hours, rate))
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(5.0), "$5.00");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(-5.0), "-$5.00");
        assert_eq!(format_currency(-0.001), "$0.00");
    }

    #[test]
    fn subtotal_and_total() {
        let inv = invoice("2024-05-01", 2.0, 50.0)
            .with_billable(LineItem::new("More", "", 1.5, 50.0));
        assert_eq!(subtotal(&inv.billables[1]).unwrap(), 75.0);
        assert_eq!(total(&inv).unwrap(), 175.0);
    }

    #[test]
    fn subtotal_rejects_text() {
        let item = LineItem::new("Work", "", "many", 10.0);
        assert!(subtotal(&item).is_err());
    }

    #[test]
    fn statistics_by_period() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        let invoices = vec![
            invoice("2024-05-01", 10.0, 100.0),
            invoice("2024-01-15", 1.0, 250.0),
            invoice("2023-05-01", 1.0, 9999.0),
        ];
        let stats = statistics(&invoices, today).unwrap();
        assert_eq!(stats.year, "$1,250.00");
        assert_eq!(stats.month, "$1,000.00");
    }

    #[test]
    fn statistics_of_nothing() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        let stats = statistics(&[], today).unwrap();
        assert_eq!(stats.year, "$0.00");
        assert_eq!(stats.month, "$0.00");
    }

    #[test]
    fn date_helper_uses_patterns() {
        let date = InvoiceDate::parse("2024-05-01").unwrap();
        assert_eq!(format_date(&date, "Do MMMM[, ]YYYY"), "1st May, 2024");
    }
}
