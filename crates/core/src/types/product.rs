//! Catalog product records.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::Barcode;

/// A product as held in the local catalog.
///
/// The barcode is the record's identity. Catalog downloads may contain
/// entries without a usable barcode; those deserialize with `barcode: None`
/// and are skipped by bulk saves rather than failing the whole batch.
///
/// Any display fields beyond name and price (unit, department, image URL, ...)
/// are preserved verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Unique key of the record.
    #[serde(
        default,
        deserialize_with = "lenient_barcode",
        skip_serializing_if = "Option::is_none"
    )]
    pub barcode: Option<Barcode>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Shelf price in the store's currency.
    #[serde(default)]
    pub price: Decimal,
    /// Remaining display fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProductRecord {
    /// Create a record with no extra display fields.
    #[must_use]
    pub fn new(barcode: Barcode, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            barcode: Some(barcode),
            name: name.into(),
            price,
            extra: Map::new(),
        }
    }

    /// Attach an extra display field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The record's key, if it has one.
    #[must_use]
    pub const fn key(&self) -> Option<&Barcode> {
        self.barcode.as_ref()
    }
}

/// Blank, null, or otherwise unusable barcodes become `None`.
fn lenient_barcode<'de, D>(deserializer: D) -> Result<Option<Barcode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => Barcode::parse(&s).ok(),
        // Some backends emit numeric barcodes
        Some(Value::Number(n)) => Barcode::parse(&n.to_string()).ok(),
        _ => None,
    })
}
