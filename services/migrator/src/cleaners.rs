//! Cell cleaners shared by every record shape.
//!
//! All three are total: null-like or malformed input becomes `None`, never an
//! error. One null vocabulary is used everywhere so "absent" means the same
//! thing in `metrics_input` and in `orders`.

use crate::sheet::CellValue;

/// Placeholder tokens treated as an absent cell (compared case-insensitively, trimmed)
pub const NULL_TOKENS: &[&str] = &["nan", "null", "none", "n/a", "#n/a", "-", "--"];

pub fn is_null_like(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || NULL_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

/// Finite float, or `None`. An explicit zero stays `Some(0.0)`.
pub fn clean_numeric(cell: &CellValue) -> Option<f64> {
    let value = match cell {
        CellValue::Empty => return None,
        CellValue::Number(n) => *n,
        CellValue::Text(s) => {
            if is_null_like(s) {
                return None;
            }
            s.trim().parse::<f64>().ok()?
        }
    };
    value.is_finite().then_some(value)
}

/// Whole number truncated toward zero, or `None`
pub fn clean_integer(cell: &CellValue) -> Option<i64> {
    let value = clean_numeric(cell)?.trunc();
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// Trimmed text, or `None`. Numbers are stringified.
pub fn clean_string(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Empty => None,
        CellValue::Text(s) if is_null_like(s) => None,
        CellValue::Text(s) => Some(s.trim().to_string()),
        CellValue::Number(n) if n.is_finite() => Some(n.to_string()),
        CellValue::Number(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    const NULL_SAMPLES: &[&str] = &[
        "", "nan", "NaN", "NULL", "None", "none", "n/a", "N/A", "#N/A", "-", "--", "   ",
        "  null  ", "\tN/A\n",
    ];

    #[test]
    fn test_null_tokens_are_absent_for_every_cleaner() {
        for token in NULL_SAMPLES {
            let cell = text(token);
            assert_eq!(clean_numeric(&cell), None, "numeric {token:?}");
            assert_eq!(clean_integer(&cell), None, "integer {token:?}");
            assert_eq!(clean_string(&cell), None, "string {token:?}");
        }
    }

    #[test]
    fn test_empty_cell_is_absent() {
        assert_eq!(clean_numeric(&CellValue::Empty), None);
        assert_eq!(clean_integer(&CellValue::Empty), None);
        assert_eq!(clean_string(&CellValue::Empty), None);
    }

    #[test]
    fn test_numeric_parses_finite_strings() {
        assert_eq!(clean_numeric(&text("0.87")), Some(0.87));
        assert_eq!(clean_numeric(&text(" 0.91 ")), Some(0.91));
        assert_eq!(clean_numeric(&text("-12.5")), Some(-12.5));
        assert_eq!(clean_numeric(&text("87")), Some(87.0));
        assert_eq!(clean_numeric(&text("1e3")), Some(1000.0));
    }

    #[test]
    fn test_numeric_passes_numbers_through() {
        assert_eq!(clean_numeric(&CellValue::Number(0.8765)), Some(0.8765));
        assert_eq!(clean_numeric(&CellValue::Number(-3.0)), Some(-3.0));
    }

    #[test]
    fn test_numeric_non_finite_is_absent() {
        assert_eq!(clean_numeric(&CellValue::Number(f64::NAN)), None);
        assert_eq!(clean_numeric(&CellValue::Number(f64::INFINITY)), None);
        assert_eq!(clean_numeric(&CellValue::Number(f64::NEG_INFINITY)), None);
        assert_eq!(clean_numeric(&text("inf")), None);
        assert_eq!(clean_numeric(&text("-Infinity")), None);
    }

    #[test]
    fn test_numeric_parse_failure_is_absent() {
        assert_eq!(clean_numeric(&text("abc")), None);
        assert_eq!(clean_numeric(&text("1,000")), None);
        assert_eq!(clean_numeric(&text("12%")), None);
    }

    #[test]
    fn test_numeric_zero_is_kept() {
        assert_eq!(clean_numeric(&CellValue::Number(0.0)), Some(0.0));
        assert_eq!(clean_numeric(&text("0")), Some(0.0));
        assert_eq!(clean_integer(&text("0")), Some(0));
    }

    #[test]
    fn test_integer_truncates() {
        assert_eq!(clean_integer(&text("1250")), Some(1250));
        assert_eq!(clean_integer(&text("1250.9")), Some(1250));
        assert_eq!(clean_integer(&text("-3.7")), Some(-3));
        assert_eq!(clean_integer(&CellValue::Number(890.0)), Some(890));
    }

    #[test]
    fn test_integer_non_finite_or_huge_is_absent() {
        assert_eq!(clean_integer(&CellValue::Number(f64::NAN)), None);
        assert_eq!(clean_integer(&CellValue::Number(f64::INFINITY)), None);
        assert_eq!(clean_integer(&CellValue::Number(1e30)), None);
        assert_eq!(clean_integer(&text("x12")), None);
    }

    #[test]
    fn test_string_trims() {
        assert_eq!(clean_string(&text("  Polanco ")), Some("Polanco".to_string()));
        assert_eq!(clean_string(&text("MX")), Some("MX".to_string()));
    }

    #[test]
    fn test_string_stringifies_numbers() {
        assert_eq!(clean_string(&CellValue::Number(5.0)), Some("5".to_string()));
        assert_eq!(clean_string(&CellValue::Number(0.87)), Some("0.87".to_string()));
        assert_eq!(clean_string(&CellValue::Number(f64::NAN)), None);
    }

    #[test]
    fn test_string_keeps_words_containing_tokens() {
        assert_eq!(clean_string(&text("Nonwealthy")), Some("Nonwealthy".to_string()));
        assert_eq!(clean_string(&text("Non Wealthy")), Some("Non Wealthy".to_string()));
    }
}
