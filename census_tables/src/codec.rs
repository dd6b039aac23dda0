//! Text form of the cell values.
//!
//! The census publishes confidential figures as a marker (`C`) appended to
//! the part of the figure that could be published:
//!
//! | text          | value                  |
//! |---------------|------------------------|
//! | `12.5`        | `Numeric(12.5)`        |
//! | `C`           | `Censored(0, 1)`       |
//! | `3C`          | `Censored(0, 3)`       |
//! | `40 + C`      | `Censored(40, 1)`      |
//! | `40 + 2C`     | `Censored(40, 2)`      |
//! | `N/A`, empty  | `Absent`               |
//!
//! Older exports use `n` instead of `C`; both are accepted on input, only `C`
//! is written.

use std::error::Error;
use std::fmt::Display;

use log::debug;

use crate::config::*;

pub const CENSORED_MARKER: char = 'C';
const LEGACY_MARKER: char = 'n';
pub const NOT_APPLICABLE: &str = "N/A";

/// Decimal places written for values.
pub const VALUE_DECIMALS: usize = 3;
/// Decimal places written for ratios.
pub const RATIO_DECIMALS: usize = 6;

/// Largest suppressed count accepted in a single cell. Sums of cells may go
/// above it.
pub const MAX_CENSORED_COUNT: u64 = u32::MAX as u64;

const NAN_LITERALS: [&str; 4] = ["nan", "none", "null", "<na>"];

/// Text that does not follow the cell grammar.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UnparsableAnnotation {
    pub text: String,
}

impl Error for UnparsableAnnotation {}

impl Display for UnparsableAnnotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot read cell value {:?}", self.text)
    }
}

/// Parses a cell, rejecting text outside of the grammar.
pub fn parse_strict(text: &str) -> Result<AnnotatedValue, UnparsableAnnotation> {
    let s = text.trim();
    let unparsable = || UnparsableAnnotation {
        text: text.to_string(),
    };

    if s.is_empty() || NAN_LITERALS.iter().any(|l| s.eq_ignore_ascii_case(l)) {
        return Ok(AnnotatedValue::Absent);
    }
    if let Some(x) = parse_number(s) {
        return Ok(AnnotatedValue::Numeric(x));
    }
    if s.eq_ignore_ascii_case(NOT_APPLICABLE) {
        return Ok(AnnotatedValue::Absent);
    }

    match s.split_once('+') {
        // <number> + <count><marker>
        Some((base_s, rest)) => {
            let base = parse_number(base_s.trim()).ok_or_else(unparsable)?;
            let compact: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
            let count = parse_marker(&compact).ok_or_else(unparsable)?;
            Ok(AnnotatedValue::censored(base, count))
        }
        // <marker> or <count><marker>
        None => {
            let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            let count = parse_marker(&compact).ok_or_else(unparsable)?;
            Ok(AnnotatedValue::censored(0.0, count))
        }
    }
}

/// Parses a cell. Text outside of the grammar contributes nothing.
pub fn parse(text: &str) -> AnnotatedValue {
    match parse_strict(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("parse: {}", e);
            AnnotatedValue::Absent
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let x = match s.parse::<f64>() {
        Ok(x) => x,
        Err(_) if s.contains(',') => s.replace(',', "").parse::<f64>().ok()?,
        Err(_) => return None,
    };
    if x.is_finite() {
        Some(x)
    } else {
        None
    }
}

// "C" -> 1, "4C" -> 4
fn parse_marker(s: &str) -> Option<u64> {
    let coef = s
        .strip_suffix(|c: char| c.eq_ignore_ascii_case(&CENSORED_MARKER) || c == LEGACY_MARKER)?;
    if coef.is_empty() {
        Some(1)
    } else if coef.chars().all(|c| c.is_ascii_digit()) {
        coef.parse::<u64>().ok().filter(|n| *n <= MAX_CENSORED_COUNT)
    } else {
        None
    }
}

/// Canonical text of a value.
pub fn format(value: &AnnotatedValue) -> String {
    match value {
        AnnotatedValue::Absent => String::new(),
        AnnotatedValue::Numeric(x) => format_decimal(*x, VALUE_DECIMALS),
        AnnotatedValue::Censored { base, count } => {
            let base_s = format_decimal(*base, VALUE_DECIMALS);
            match count {
                0 => base_s,
                1 => format!("{} + {}", base_s, CENSORED_MARKER),
                n => format!("{} + {}{}", base_s, n, CENSORED_MARKER),
            }
        }
    }
}

/// Fixed decimals, trailing zeros removed: `12.500` is written `12.5`.
pub fn format_decimal(x: f64, places: usize) -> String {
    let s = format!("{:.*}", places, x);
    let s = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    };
    if s == "-0" {
        "0".to_string()
    } else {
        s
    }
}

pub fn format_ratio(cell: &RatioCell) -> String {
    match cell {
        RatioCell::Ratio(x) => format_decimal(*x, RATIO_DECIMALS),
        RatioCell::Undefined => String::new(),
    }
}

pub fn parse_ratio(text: &str) -> RatioCell {
    match parse_number(text.trim()) {
        Some(x) => RatioCell::Ratio(x),
        None => RatioCell::Undefined,
    }
}

/// Parses cells and keeps track of the text that could not be understood.
#[derive(Debug, Default)]
pub struct ValueReader {
    unparsable: usize,
    samples: Vec<String>,
}

impl ValueReader {
    const MAX_SAMPLES: usize = 10;

    pub fn new() -> ValueReader {
        ValueReader::default()
    }

    pub fn read(&mut self, text: &str) -> AnnotatedValue {
        match parse_strict(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("ValueReader: {}", e);
                self.unparsable += 1;
                if self.samples.len() < ValueReader::MAX_SAMPLES {
                    self.samples.push(e.text);
                }
                AnnotatedValue::Absent
            }
        }
    }

    /// Number of cells read as absent because they did not follow the grammar.
    pub fn unparsable(&self) -> usize {
        self.unparsable
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AnnotatedValue::*;

    fn same(a: &AnnotatedValue, b: &AnnotatedValue) -> bool {
        match (a, b) {
            (Absent, Absent) => true,
            (Numeric(x), Numeric(y)) => (x - y).abs() < 5e-4,
            (Censored { base: x, count: c1 }, Censored { base: y, count: c2 }) => {
                (x - y).abs() < 5e-4 && c1 == c2
            }
            _ => false,
        }
    }

    #[test]
    fn parse_grammar() {
        assert_eq!(parse(""), Absent);
        assert_eq!(parse("   "), Absent);
        assert_eq!(parse("NaN"), Absent);
        assert_eq!(parse("nan"), Absent);
        assert_eq!(parse("12.5"), Numeric(12.5));
        assert_eq!(parse(" -3 "), Numeric(-3.0));
        assert_eq!(parse("1,234.5"), Numeric(1234.5));
        assert_eq!(parse("N/A"), Absent);
        assert_eq!(parse("n/a"), Absent);
        assert_eq!(parse("C"), Censored { base: 0.0, count: 1 });
        assert_eq!(parse("c"), Censored { base: 0.0, count: 1 });
        assert_eq!(parse("3C"), Censored { base: 0.0, count: 3 });
        assert_eq!(parse("40 + C"), Censored { base: 40.0, count: 1 });
        assert_eq!(parse("40.25 + 12C"), Censored { base: 40.25, count: 12 });
        assert_eq!(parse("40+2 c"), Censored { base: 40.0, count: 2 });
    }

    #[test]
    fn parse_legacy_marker() {
        assert_eq!(parse("n"), Censored { base: 0.0, count: 1 });
        assert_eq!(parse("7 + 2n"), Censored { base: 7.0, count: 2 });
    }

    #[test]
    fn zero_count_is_numeric() {
        assert_eq!(parse("0C"), Numeric(0.0));
        assert_eq!(parse("5 + 0C"), Numeric(5.0));
        assert_eq!(AnnotatedValue::censored(2.0, 0), Numeric(2.0));
    }

    #[test]
    fn unparsable_is_absent() {
        assert_eq!(parse("abc"), Absent);
        assert_eq!(parse("inf"), Absent);
        assert_eq!(parse("5 + X"), Absent);
        assert_eq!(parse("x + C"), Absent);
        assert!(parse_strict("5 + X").is_err());
        assert!(parse_strict("4294967296C").is_err());
        assert!(parse_strict("").is_ok());

        let mut reader = ValueReader::new();
        assert_eq!(reader.read("12"), Numeric(12.0));
        assert_eq!(reader.read("??"), Absent);
        assert_eq!(reader.read(""), Absent);
        assert_eq!(reader.unparsable(), 1);
        assert_eq!(reader.samples(), &["??".to_string()]);
    }

    #[test]
    fn format_values() {
        assert_eq!(format(&Absent), "");
        assert_eq!(format(&Numeric(12.5)), "12.5");
        assert_eq!(format(&Numeric(12.0)), "12");
        assert_eq!(format(&Numeric(0.12345)), "0.123");
        assert_eq!(format(&Numeric(-0.0001)), "0");
        assert_eq!(format(&Censored { base: 15.0, count: 1 }), "15 + C");
        assert_eq!(format(&Censored { base: 0.0, count: 4 }), "0 + 4C");
        assert_eq!(format(&Censored { base: 1.5, count: 0 }), "1.5");
    }

    #[test]
    fn format_then_parse() {
        let values = [
            Absent,
            Numeric(0.0),
            Numeric(-17.25),
            Numeric(1234567.891),
            Numeric(2.0 / 3.0),
            Censored { base: 0.0, count: 1 },
            Censored { base: 99.999, count: 7 },
            Censored { base: -2.5, count: 2 },
        ];
        for v in values.iter() {
            let back = parse_strict(&format(v)).unwrap();
            assert!(same(v, &back), "{:?} -> {:?} -> {:?}", v, format(v), back);
        }
    }

    #[test]
    fn ratio_text() {
        assert_eq!(format_ratio(&RatioCell::Ratio(0.5)), "0.5");
        assert_eq!(format_ratio(&RatioCell::Ratio(1.0 / 3.0)), "0.333333");
        assert_eq!(format_ratio(&RatioCell::Undefined), "");
        assert_eq!(parse_ratio("0.25"), RatioCell::Ratio(0.25));
        assert_eq!(parse_ratio(""), RatioCell::Undefined);
        assert_eq!(parse_ratio("nan"), RatioCell::Undefined);
    }
}
