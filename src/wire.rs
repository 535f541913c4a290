//!
//! QuayDB wire codec
//! ------------------
//! Scalar values cross the protocol boundary as strings tagged with a wire
//! type token, `TAG:literal`. SQL NULL is never absence: it travels as a
//! `NULL_`-prefixed tag carrying the intended target type (`NULL_INTEGER:`),
//! and inside result cells as the literal `NULL`. Everything in this module
//! is a pure function over strings; no state, no IO.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{ClientError, ClientResult};

/// Cell sentinel for SQL NULL in tabular payloads, matched case-insensitively.
pub const NULL_LITERAL: &str = "NULL";

/// One token per SQL type understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varchar,
    Char,
    Integer,
    Bigint,
    Smallint,
    Double,
    Float,
    Decimal,
    Boolean,
    Date,
    Time,
    Timestamp,
    Blob,
    Clob,
}

impl WireType {
    pub fn tag(self) -> &'static str {
        match self {
            WireType::Varchar => "VARCHAR",
            WireType::Char => "CHAR",
            WireType::Integer => "INTEGER",
            WireType::Bigint => "BIGINT",
            WireType::Smallint => "SMALLINT",
            WireType::Double => "DOUBLE",
            WireType::Float => "FLOAT",
            WireType::Decimal => "DECIMAL",
            WireType::Boolean => "BOOLEAN",
            WireType::Date => "DATE",
            WireType::Time => "TIME",
            WireType::Timestamp => "TIMESTAMP",
            WireType::Blob => "BLOB",
            WireType::Clob => "CLOB",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "VARCHAR" => WireType::Varchar,
            "CHAR" => WireType::Char,
            "INTEGER" => WireType::Integer,
            "BIGINT" => WireType::Bigint,
            "SMALLINT" => WireType::Smallint,
            "DOUBLE" => WireType::Double,
            "FLOAT" => WireType::Float,
            "DECIMAL" => WireType::Decimal,
            "BOOLEAN" => WireType::Boolean,
            "DATE" => WireType::Date,
            "TIME" => WireType::Time,
            "TIMESTAMP" => WireType::Timestamp,
            "BLOB" => WireType::Blob,
            "CLOB" => WireType::Clob,
            _ => return None,
        })
    }
}

/// A wire-encoded statement parameter: a type tag plus an optional literal.
/// `literal == None` is the typed NULL marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: WireType,
    pub literal: Option<String>,
}

impl Param {
    pub fn new(ty: WireType, literal: impl Into<String>) -> Self {
        Self { ty, literal: Some(literal.into()) }
    }

    /// Typed NULL for the given target type.
    pub fn null(ty: WireType) -> Self {
        Self { ty, literal: None }
    }

    pub fn is_null(&self) -> bool {
        self.literal.is_none()
    }

    /// Render the form-field token sent on the wire.
    pub fn to_field(&self) -> String {
        match &self.literal {
            Some(lit) => format!("{}:{}", self.ty.tag(), lit),
            None => format!("NULL_{}:", self.ty.tag()),
        }
    }

    /// Parse a form-field token back into a parameter. Used by tests and the
    /// mock server; the driver itself only encodes.
    pub fn from_field(field: &str) -> ClientResult<Self> {
        let (tag, lit) = field
            .split_once(':')
            .ok_or_else(|| ClientError::protocol(format!("untagged parameter: {field:?}")))?;
        if let Some(target) = tag.strip_prefix("NULL_") {
            let ty = WireType::from_tag(target)
                .ok_or_else(|| ClientError::protocol(format!("unknown wire type: {target}")))?;
            return Ok(Param::null(ty));
        }
        let ty = WireType::from_tag(tag)
            .ok_or_else(|| ClientError::protocol(format!("unknown wire type: {tag}")))?;
        Ok(Param::new(ty, lit))
    }
}

pub fn encode_str(v: &str) -> Param {
    Param::new(WireType::Varchar, v)
}

pub fn encode_i32(v: i32) -> Param {
    Param::new(WireType::Integer, v.to_string())
}

pub fn encode_i64(v: i64) -> Param {
    Param::new(WireType::Bigint, v.to_string())
}

pub fn encode_f64(v: f64) -> Param {
    Param::new(WireType::Double, v.to_string())
}

pub fn encode_bool(v: bool) -> Param {
    Param::new(WireType::Boolean, if v { "true" } else { "false" })
}

/// Timestamps travel as epoch milliseconds.
pub fn encode_timestamp(v: DateTime<Utc>) -> Param {
    Param::new(WireType::Timestamp, v.timestamp_millis().to_string())
}

/// Blob parameters carry the client-minted object identifier, not the bytes;
/// the bytes go out of band through the transfer engine.
pub fn encode_blob_id(id: &str) -> Param {
    Param::new(WireType::Blob, id)
}

pub fn is_null_literal(cell: &str) -> bool {
    cell.eq_ignore_ascii_case(NULL_LITERAL)
}

pub fn decode_i32(cell: &str) -> ClientResult<i32> {
    cell.trim().parse().map_err(|_| ClientError::conversion(cell, "INTEGER"))
}

pub fn decode_i64(cell: &str) -> ClientResult<i64> {
    cell.trim().parse().map_err(|_| ClientError::conversion(cell, "BIGINT"))
}

pub fn decode_f64(cell: &str) -> ClientResult<f64> {
    cell.trim().parse().map_err(|_| ClientError::conversion(cell, "DOUBLE"))
}

/// `true`/`false`, case-insensitive; anything else fails.
pub fn decode_bool(cell: &str) -> ClientResult<bool> {
    let t = cell.trim();
    if t.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if t.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ClientError::conversion(cell, "BOOLEAN"))
    }
}

/// Validate a DECIMAL literal and hand it back verbatim. The driver carries
/// no arbitrary-precision type; callers wanting a number use `decode_f64`.
pub fn decode_decimal(cell: &str) -> ClientResult<String> {
    let t = cell.trim();
    if t.parse::<f64>().is_ok() {
        Ok(t.to_string())
    } else {
        Err(ClientError::conversion(cell, "DECIMAL"))
    }
}

/// DATE/TIME/TIMESTAMP cells are epoch milliseconds.
pub fn decode_epoch_millis(cell: &str) -> ClientResult<DateTime<Utc>> {
    let millis = cell
        .trim()
        .parse::<i64>()
        .map_err(|_| ClientError::conversion(cell, "TIMESTAMP"))?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ClientError::conversion(cell, "TIMESTAMP"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_integer() {
        let p = encode_i32(-42);
        assert_eq!(p.to_field(), "INTEGER:-42");
        let back = Param::from_field(&p.to_field()).unwrap();
        assert_eq!(decode_i32(back.literal.as_deref().unwrap()).unwrap(), -42);
    }

    #[test]
    fn round_trip_varchar() {
        let p = encode_str("O'Malley: 100%");
        let back = Param::from_field(&p.to_field()).unwrap();
        assert_eq!(back.ty, WireType::Varchar);
        assert_eq!(back.literal.as_deref(), Some("O'Malley: 100%"));
    }

    #[test]
    fn round_trip_timestamp() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        let p = encode_timestamp(ts);
        let back = Param::from_field(&p.to_field()).unwrap();
        assert_eq!(decode_epoch_millis(back.literal.as_deref().unwrap()).unwrap(), ts);
    }

    #[test]
    fn round_trip_double() {
        let p = encode_f64(-2.5e10);
        let back = Param::from_field(&p.to_field()).unwrap();
        assert_eq!(decode_f64(back.literal.as_deref().unwrap()).unwrap(), -2.5e10);
    }

    #[test]
    fn round_trip_blob_identifier() {
        let p = encode_blob_id("3b1f8a");
        assert_eq!(p.to_field(), "BLOB:3b1f8a");
        let back = Param::from_field("BLOB:3b1f8a").unwrap();
        assert_eq!(back.ty, WireType::Blob);
        assert_eq!(back.literal.as_deref(), Some("3b1f8a"));
    }

    #[test]
    fn null_marker_carries_target_type() {
        let p = Param::null(WireType::Timestamp);
        assert_eq!(p.to_field(), "NULL_TIMESTAMP:");
        let back = Param::from_field("NULL_TIMESTAMP:").unwrap();
        assert!(back.is_null());
        assert_eq!(back.ty, WireType::Timestamp);
    }

    #[test]
    fn null_literal_is_case_insensitive() {
        assert!(is_null_literal("NULL"));
        assert!(is_null_literal("null"));
        assert!(is_null_literal("Null"));
        assert!(!is_null_literal("NULLABLE"));
        assert!(!is_null_literal(""));
    }

    #[test]
    fn bool_decoding_accepts_only_true_false() {
        assert!(decode_bool("TRUE").unwrap());
        assert!(!decode_bool("False").unwrap());
        match decode_bool("1") {
            Err(ClientError::TypeConversion { literal, target }) => {
                assert_eq!(literal, "1");
                assert_eq!(target, "BOOLEAN");
            }
            other => panic!("expected conversion error, got {other:?}"),
        }
    }

    #[test]
    fn conversion_error_names_literal_and_target() {
        match decode_i32("twelve") {
            Err(ClientError::TypeConversion { literal, target }) => {
                assert_eq!(literal, "twelve");
                assert_eq!(target, "INTEGER");
            }
            other => panic!("expected conversion error, got {other:?}"),
        }
    }

    #[test]
    fn decimal_passes_through_verbatim() {
        assert_eq!(decode_decimal(" 1234.5600 ").unwrap(), "1234.5600");
        assert!(decode_decimal("12,34").is_err());
    }
}
