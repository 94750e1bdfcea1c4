//! Decimal string codec for keys and sorted-set members.
//!
//! Keys and member payloads are `:`-joined tuples of decimal strings. The set
//! of encodable component types is closed: anything outside [`Field`] is
//! unrepresentable by construction. Parsing is positional; a component that
//! fails to parse coerces to zero and bumps a process-wide counter instead of
//! failing the read.

use num_bigint::BigInt;
use std::sync::atomic::{AtomicU64, Ordering};

static COERCIONS: AtomicU64 = AtomicU64::new(0);

/// A single key or member component.
#[derive(Debug, Clone)]
pub enum Field<'a> {
    /// Raw string segment.
    Str(&'a str),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Float, rendered with zero fraction digits.
    Float(f64),
    /// Boolean, rendered as `0`/`1`.
    Bool(bool),
    /// Arbitrary-precision integer, rendered base-10.
    Big(&'a BigInt),
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(v: &'a str) -> Self {
        Field::Str(v)
    }
}

impl<'a> From<&'a String> for Field<'a> {
    fn from(v: &'a String) -> Self {
        Field::Str(v)
    }
}

impl From<i64> for Field<'_> {
    fn from(v: i64) -> Self {
        Field::Int(v)
    }
}

impl From<u64> for Field<'_> {
    fn from(v: u64) -> Self {
        Field::Uint(v)
    }
}

impl From<f64> for Field<'_> {
    fn from(v: f64) -> Self {
        Field::Float(v)
    }
}

impl From<bool> for Field<'_> {
    fn from(v: bool) -> Self {
        Field::Bool(v)
    }
}

impl<'a> From<&'a BigInt> for Field<'a> {
    fn from(v: &'a BigInt) -> Self {
        Field::Big(v)
    }
}

/// Join components into a `:`-separated decimal string.
pub fn join(fields: &[Field<'_>]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        match field {
            Field::Str(s) => out.push_str(s),
            Field::Int(n) => out.push_str(&n.to_string()),
            Field::Uint(n) => out.push_str(&n.to_string()),
            Field::Float(x) => out.push_str(&format!("{:.0}", x)),
            Field::Bool(b) => out.push(if *b { '1' } else { '0' }),
            Field::Big(n) => out.push_str(&n.to_str_radix(10)),
        }
    }
    out
}

/// Parse a stored decimal, coercing malformed input to zero.
pub fn parse_i64(s: &str) -> i64 {
    s.parse().unwrap_or_else(|_| {
        COERCIONS.fetch_add(1, Ordering::Relaxed);
        0
    })
}

/// Parse a stored unsigned decimal, coercing malformed input to zero.
pub fn parse_u64(s: &str) -> u64 {
    s.parse().unwrap_or_else(|_| {
        COERCIONS.fetch_add(1, Ordering::Relaxed);
        0
    })
}

/// Parse a stored float, coercing malformed input to zero.
pub fn parse_f64(s: &str) -> f64 {
    s.parse().unwrap_or_else(|_| {
        COERCIONS.fetch_add(1, Ordering::Relaxed);
        0.0
    })
}

/// Parse a stored boolean (`0`/`1` plus the usual spellings), coercing
/// anything unrecognized to `false`.
pub fn parse_bool(s: &str) -> bool {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => true,
        "0" | "f" | "F" | "false" | "FALSE" | "False" => false,
        _ => {
            COERCIONS.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

/// Number of parse coercions since process start.
///
/// Malformed stored data is treated as zero contribution rather than an
/// error; operators watch this counter instead of a log stream.
pub fn coercions() -> u64 {
    COERCIONS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_all_types() {
        let big = BigInt::parse_bytes(b"5000000000000000000", 10).unwrap();
        let s = join(&[
            Field::from("eth"),
            Field::from(-7i64),
            Field::from(42u64),
            Field::from(3.0f64),
            Field::from(true),
            Field::from(false),
            Field::from(&big),
        ]);
        assert_eq!(s, "eth:-7:42:3:1:0:5000000000000000000");
    }

    #[test]
    fn test_float_drops_fraction() {
        assert_eq!(join(&[Field::from(99.9f64)]), "100");
        assert_eq!(join(&[Field::from(0.2f64)]), "0");
    }

    #[test]
    fn test_parse_coerces_to_zero() {
        let before = coercions();
        assert_eq!(parse_i64("123"), 123);
        assert_eq!(parse_i64("bogus"), 0);
        assert_eq!(parse_u64(""), 0);
        assert!(!parse_bool("maybe"));
        assert_eq!(coercions(), before + 3);
    }

    #[test]
    fn test_parse_bool_spellings() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("false"));
    }
}
