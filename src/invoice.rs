//! Invoice records as they arrive from the transport layer.
//!
//! The payload is loosely typed: ids may be numbers or strings and
//! hours/rates may be numbers or numeric strings. Everything is accepted at
//! deserialisation time and checked by [`Invoice::priced_lines`] before any
//! value reaches a document.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dates::InvoiceDate;
use crate::error::ValidationError;

/// A billing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub date: InvoiceDate,
    pub client: Client,
    #[serde(default)]
    pub billables: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub name: String,
    pub address: String,
}

/// A single billable task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub hours: Amount,
    pub rate: Amount,
}

/// Invoice identifier: numeric or free-form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvoiceId {
    Number(serde_json::Number),
    Text(String),
}

/// A quantity that may arrive as a number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

/// A line item whose numeric fields have been checked.
#[derive(Debug, Clone, Copy)]
pub struct PricedLine<'a> {
    pub item: &'a LineItem,
    pub hours: f64,
    pub rate: f64,
}

impl PricedLine<'_> {
    pub fn subtotal(&self) -> f64 {
        self.hours * self.rate
    }
}

impl Invoice {
    pub fn new(id: impl Into<InvoiceId>, date: InvoiceDate, client: Client) -> Self {
        Self {
            id: id.into(),
            date,
            client,
            billables: Vec::new(),
        }
    }

    pub fn with_billable(mut self, item: LineItem) -> Self {
        self.billables.push(item);
        self
    }

    /// Parse an invoice from its JSON transport form.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Payload(e.to_string()))
    }

    /// Coerce every billable's hours and rate, in order.
    pub fn priced_lines(&self) -> Result<Vec<PricedLine<'_>>, ValidationError> {
        self.billables
            .iter()
            .enumerate()
            .map(|(index, item)| {
                Ok(PricedLine {
                    item,
                    hours: item.hours.value(index, "hours")?,
                    rate: item.rate.value(index, "rate")?,
                })
            })
            .collect()
    }

    /// Sum of hours × rate across all billables.
    pub fn total(&self) -> Result<f64, ValidationError> {
        Ok(total_of(&self.priced_lines()?))
    }
}

pub(crate) fn total_of(lines: &[PricedLine<'_>]) -> f64 {
    lines.iter().fold(0.0, |acc, line| acc + line.subtotal())
}

impl LineItem {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        hours: impl Into<Amount>,
        rate: impl Into<Amount>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            hours: hours.into(),
            rate: rate.into(),
        }
    }
}

impl Client {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl Amount {
    /// The finite numeric value, or a validation error naming the billable.
    pub fn value(&self, index: usize, field: &'static str) -> Result<f64, ValidationError> {
        let value = match self {
            Amount::Number(n) => *n,
            Amount::Text(s) => s.trim().parse::<f64>().map_err(|_| ValidationError::NotANumber {
                index,
                field,
                value: s.clone(),
            })?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ValidationError::NotFinite { index, field })
        }
    }
}

impl From<f64> for Amount {
    fn from(n: f64) -> Self {
        Amount::Number(n)
    }
}

impl From<u32> for Amount {
    fn from(n: u32) -> Self {
        Amount::Number(n as f64)
    }
}

impl From<&str> for Amount {
    fn from(s: &str) -> Self {
        Amount::Text(s.to_string())
    }
}

impl From<u64> for InvoiceId {
    fn from(n: u64) -> Self {
        InvoiceId::Number(n.into())
    }
}

impl From<&str> for InvoiceId {
    fn from(s: &str) -> Self {
        InvoiceId::Text(s.to_string())
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceId::Number(n) => f.write_str(&format_json_number(n)),
            InvoiceId::Text(s) => f.write_str(s),
        }
    }
}

/// Shortest round-trip decimal form, without a trailing `.0` and without
/// negative zero: `175`, `12.5`, `0.30000000000000004`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{value}")
    }
}

/// A JSON number in the same form as [`format_number`]: integers verbatim,
/// floats without a trailing `.0`, so `7.0` prints as `7`.
pub fn format_json_number(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(value) if n.is_f64() => format_number(value),
        _ => n.to_string(),
    }
}
