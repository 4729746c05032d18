//! Row decoder: picks a per-column scan target from Oracle column metadata
//! before a read starts, then turns the scanned nullable scalar into the
//! `serde_json::Value` that ends up on the row item / entity property.

use oracle::sql_type::OracleType;
use serde_json::Value;

use crate::config::OutgoingPropertyMapping;

/// What Rust type a column should be scanned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Bool,
    Float,
    Str,
}

/// A scanned, possibly-null scalar, tagged by the kind it was scanned as.
#[derive(Debug, Clone, PartialEq)]
pub enum Scanned {
    Bool(Option<bool>),
    Float(Option<f64>),
    Str(Option<String>),
}

/// Mirrors the decimal-size metadata Oracle exposes for a `NUMBER` column.
/// `NUMBER(1,0)` is the conventional boolean encoding; `NUMBER(38,255)` is
/// how some drivers report the native `BOOLEAN` type introduced in newer
/// Oracle versions. Scale is widened to `i32` so both can be compared
/// uniformly regardless of how narrow the underlying driver type is.
fn is_boolean_shaped_number(precision: u8, scale: i32) -> bool {
    (precision == 1 && scale == 0) || (precision == 38 && scale == 255)
}

/// Decides the scan target for one column.
///
/// `mapping` is the outgoing property mapping configured for this column, if
/// any — its `is_deleted` flag or a `datatype` starting with `"bool"` force
/// boolean decoding for `NUMBER` columns that aren't shaped like
/// [`is_boolean_shaped_number`], per the dual detection strategy documented
/// in the design notes.
pub fn decide_scan_kind(column_type: &OracleType, mapping: Option<&OutgoingPropertyMapping>) -> ScanKind {
    match column_type {
        OracleType::Number(precision, scale) => {
            if is_boolean_shaped_number(*precision, *scale as i32) {
                return ScanKind::Bool;
            }
            if let Some(m) = mapping {
                let hint_says_bool = m.is_deleted
                    || m
                        .datatype
                        .as_deref()
                        .map(|d| d.starts_with("bool"))
                        .unwrap_or(false);
                if hint_says_bool {
                    return ScanKind::Bool;
                }
            }
            ScanKind::Float
        }
        OracleType::BinaryFloat | OracleType::BinaryDouble | OracleType::Float(_) => ScanKind::Float,
        _ => ScanKind::Str,
    }
}

/// Converts a scanned value to the JSON representation used on entities:
/// SQL NULL becomes an absent property (`None`) for every kind except
/// boolean, which may carry an explicit `false`.
pub fn scanned_to_property(scanned: &Scanned) -> Option<Value> {
    match scanned {
        Scanned::Bool(Some(b)) => Some(Value::Bool(*b)),
        Scanned::Bool(None) => Some(Value::Bool(false)),
        Scanned::Float(Some(f)) => serde_json::Number::from_f64(*f).map(Value::Number),
        Scanned::Float(None) => None,
        Scanned::Str(Some(s)) => Some(Value::String(s.clone())),
        Scanned::Str(None) => None,
    }
}

/// Same policy as [`scanned_to_property`], but for storing on a [`RowItem`]
/// (`crate::entity::RowItem`), where every column slot needs a value: an
/// absent property becomes `Value::Null` instead of being omitted.
pub fn scanned_to_value(scanned: &Scanned) -> Value {
    scanned_to_property(scanned).unwrap_or(Value::Null)
}
