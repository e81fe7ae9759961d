//! Guest-cart merge at login.
//!
//! Anonymous visitors keep their cart on the client. At login the client
//! sends it along as loosely typed JSON and each entry is reconciled with
//! the user's persisted cart independently. Bad entries are skipped, never
//! fatal.

mod merger;

pub use merger::GuestCartMerger;

use common::ProductId;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Why a guest-cart entry could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuestLineError {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("{0} is not a whole number")]
    NotNumeric(&'static str),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

/// A validated guest-cart entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestCartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl GuestCartLine {
    /// Parses one `{product_id, quantity}` entry.
    ///
    /// Clients send numbers as JSON integers, as floats with no fractional
    /// part, or as numeric strings; all three are accepted.
    pub fn parse(entry: &Value) -> Result<Self, GuestLineError> {
        let object = entry.as_object().ok_or(GuestLineError::NotAnObject)?;

        let product_id = positive_integer(object.get("product_id"), "product_id")?;
        let quantity = positive_integer(object.get("quantity"), "quantity")?;

        Ok(Self {
            product_id: ProductId::new(product_id),
            quantity: u32::try_from(quantity).map_err(|_| GuestLineError::OutOfRange("quantity"))?,
        })
    }
}

fn positive_integer(value: Option<&Value>, field: &'static str) -> Result<i64, GuestLineError> {
    let value = match value {
        None | Some(Value::Null) => return Err(GuestLineError::Missing(field)),
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if n.is_u64() {
                return Err(GuestLineError::OutOfRange(field));
            } else {
                float_to_integer(n.as_f64(), field)?
            }
        }
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => i,
                Err(_) => float_to_integer(s.parse::<f64>().ok(), field)?,
            }
        }
        _ => return Err(GuestLineError::NotNumeric(field)),
    };

    if parsed <= 0 {
        return Err(GuestLineError::NotPositive(field));
    }
    Ok(parsed)
}

fn float_to_integer(value: Option<f64>, field: &'static str) -> Result<i64, GuestLineError> {
    let f = value
        .filter(|f| f.is_finite() && f.fract() == 0.0)
        .ok_or(GuestLineError::NotNumeric(field))?;
    if f <= 0.0 {
        return Err(GuestLineError::NotPositive(field));
    }
    if f > i64::MAX as f64 {
        return Err(GuestLineError::OutOfRange(field));
    }
    Ok(f as i64)
}

/// Why an entry was left out of the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Malformed { detail: String },
    ProductUnavailable { product_id: ProductId },
    ExceedsStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
    StoreFailure { detail: String },
}

impl SkipReason {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Malformed { .. } => "malformed",
            SkipReason::ProductUnavailable { .. } => "product_unavailable",
            SkipReason::ExceedsStock { .. } => "exceeds_stock",
            SkipReason::StoreFailure { .. } => "store_failure",
        }
    }
}

/// What happened to one guest-cart entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Added to an existing line; `quantity` is the new line total.
    Merged { product_id: ProductId, quantity: u32 },
    /// Inserted as a new line.
    Inserted { product_id: ProductId, quantity: u32 },
    /// Left out; the entry index refers to the submitted array.
    Skipped {
        index: usize,
        #[serde(flatten)]
        reason: SkipReason,
    },
}

/// Per-entry results of a guest-cart merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub outcomes: Vec<MergeOutcome>,
}

impl MergeReport {
    pub fn merged(&self) -> usize {
        self.count(|o| matches!(o, MergeOutcome::Merged { .. }))
    }

    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, MergeOutcome::Inserted { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MergeOutcome::Skipped { .. }))
    }

    fn count(&self, predicate: impl Fn(&MergeOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(o)).count()
    }
}
