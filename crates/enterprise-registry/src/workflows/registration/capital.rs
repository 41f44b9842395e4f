use std::str::FromStr;

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapitalParseError {
    #[error("capital amount is empty")]
    Empty,
    #[error("capital amount '{0}' is not a number")]
    NotANumber(String),
    #[error("capital amount '{0}' is negative")]
    Negative(String),
}

/// Normalise a free-text capital such as `"1 500 000 MRU"`, `"1,500,000.50"` or
/// `"1.500.000,50 €"` into a decimal.
pub fn parse_capital(raw: &str) -> Result<Decimal, CapitalParseError> {
    let not_a_number = || CapitalParseError::NotANumber(raw.trim().to_string());

    let compact: String = raw
        .chars()
        .filter(|ch| !ch.is_whitespace() && !matches!(ch, '\'' | '_' | '\u{2019}'))
        .collect();
    let numeric = compact.trim_matches(|ch: char| !(ch.is_ascii_digit() || ch == '-'));
    if numeric.is_empty() {
        return if compact.is_empty() {
            Err(CapitalParseError::Empty)
        } else {
            Err(not_a_number())
        };
    }

    let (negative, digits) = match numeric.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, numeric),
    };
    if !digits
        .chars()
        .all(|ch| ch.is_ascii_digit() || ch == ',' || ch == '.')
    {
        return Err(not_a_number());
    }

    let normalized = normalize_separators(digits).ok_or_else(not_a_number)?;
    let value = Decimal::from_str(&normalized).map_err(|_| not_a_number())?;
    if negative && !value.is_zero() {
        return Err(CapitalParseError::Negative(raw.trim().to_string()));
    }
    Ok(value.normalize())
}

/// Rewrite `digits` (ASCII digits, `,` and `.` only) to use `.` as the sole decimal point.
/// Grouped amounts must use groups of exactly three digits after the first.
fn normalize_separators(digits: &str) -> Option<String> {
    let (grouping, decimal) = match (digits.rfind(','), digits.rfind('.')) {
        (None, None) => return Some(digits.to_string()),
        (Some(comma), Some(dot)) if comma > dot => (Some('.'), Some(',')),
        (Some(_), Some(_)) => (Some(','), Some('.')),
        (Some(_), None) => lone_separator_role(digits, ','),
        (None, Some(_)) => lone_separator_role(digits, '.'),
    };

    let (whole, fraction) = match decimal {
        Some(separator) => {
            let (whole, fraction) = digits.split_once(separator)?;
            if fraction.is_empty() || !fraction.chars().all(|ch| ch.is_ascii_digit()) {
                return None;
            }
            (whole, Some(fraction))
        }
        None => (digits, None),
    };

    let mut out = match grouping {
        Some(separator) => ungroup(whole, separator)?,
        None if whole.chars().all(|ch| ch.is_ascii_digit()) => whole.to_string(),
        None => return None,
    };
    match fraction {
        Some(fraction) => {
            if out.is_empty() {
                out.push('0');
            }
            out.push('.');
            out.push_str(fraction);
        }
        None if out.is_empty() => return None,
        None => {}
    }
    Some(out)
}

/// Join `1,234,567`-style groups: a leading group of one to three digits, then groups of three.
fn ungroup(whole: &str, separator: char) -> Option<String> {
    let mut groups = whole.split(separator);
    let leading = groups.next()?;
    if !(1..=3).contains(&leading.len()) || !leading.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }

    let mut out = leading.to_string();
    for group in groups {
        if group.len() != 3 || !group.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

/// With a single separator kind present, returns `(grouping, decimal)`: repeated, or once
/// followed by exactly three digits, it groups thousands; otherwise it marks decimals.
fn lone_separator_role(digits: &str, separator: char) -> (Option<char>, Option<char>) {
    let repeated = digits.matches(separator).count() > 1;
    let trailing = digits.rsplit(separator).next().map_or(0, str::len);
    if repeated || trailing == 3 {
        (Some(separator), None)
    } else {
        (None, Some(separator))
    }
}
