//! Normalization of loosely typed numeric fields.
//!
//! Description documents come from exporters of varying quality. Numbers may be missing, quoted,
//! or arrays may have the wrong length. None of this fails a build: every value is coerced to a
//! finite number and the fallback is reported with `tracing::warn!` (`debug!` for absent fields).

use num_traits::ToPrimitive;
use serde_json::Value;
use tracing::{debug, warn};

/// Numeric conversion of a single JSON value. `None` if there is no sensible number.
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                Some(0.0)
            } else {
                text.parse::<f64>().ok()
            }
        }
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Why a triple was replaced as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeFallback {
    /// Absent field, reported at debug level
    Missing,
    Malformed,
}

fn shape_fallback(value: &Value) -> ShapeFallback {
    if value.is_null() {
        ShapeFallback::Missing
    } else {
        ShapeFallback::Malformed
    }
}

/// Coerces a value claimed to be a 3-component numeric triple.
///
/// A non-array or an array of the wrong length yields `[0, 0, 0]`. Otherwise each component is
/// converted independently and replaced by `0` if it is not a finite number.
pub fn coerce_triple(value: &Value, field: &str) -> [f64; 3] {
    let Some(items) = value.as_array().filter(|items| items.len() == 3) else {
        match shape_fallback(value) {
            ShapeFallback::Missing => debug!(field, "missing triple, defaulting to [0, 0, 0]"),
            ShapeFallback::Malformed => warn!(field, %value, "expected a numeric triple, defaulting to [0, 0, 0]"),
        }
        return [0.0; 3];
    };

    let mut result = [0.0; 3];
    for (axis, (target, item)) in result.iter_mut().zip(items).enumerate() {
        match to_number(item).filter(|x| x.is_finite()) {
            Some(x) => *target = x,
            None => warn!(field, axis, %item, "non-finite component, defaulting to 0"),
        }
    }
    result
}

/// Coerces a single scalar. Missing values default to `0` without a diagnostic.
pub fn coerce_scalar(value: &Value, field: &str) -> f64 {
    match to_number(value).filter(|x| x.is_finite()) {
        Some(x) => x,
        None => {
            warn!(field, %value, "non-finite scalar, defaulting to 0");
            0.0
        }
    }
}

/// Coerces already typed values (e.g., read from XML attributes) with the same rules as
/// [coerce_triple].
pub fn coerce_numbers<T: ToPrimitive>(values: &[T], field: &str) -> [f64; 3] {
    if values.len() != 3 {
        warn!(field, len = values.len(), "expected 3 components, defaulting to [0, 0, 0]");
        return [0.0; 3];
    }
    let mut result = [0.0; 3];
    for (axis, (target, item)) in result.iter_mut().zip(values).enumerate() {
        match item.to_f64().filter(|x| x.is_finite()) {
            Some(x) => *target = x,
            None => warn!(field, axis, "non-finite component, defaulting to 0"),
        }
    }
    result
}
