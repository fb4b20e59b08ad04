//! ISBN-10 / ISBN-13 parsing, validation, and conversion.
//!
//! Pure and total: every function here either returns a value or a typed
//! [`IsbnError`]; none of them perform I/O or panic on malformed input.

use thiserror::Error;

/// Reasons [`parse`] can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsbnError {
    #[error("ISBN is empty")]
    Empty,
    #[error("wrong length: expected 10 or 13 digits, got {actual}")]
    WrongLength { actual: usize },
    #[error("non-numeric character in ISBN body")]
    NonNumeric,
    #[error("bad check digit: expected '{expected}', got '{actual}'")]
    BadCheckDigit { expected: char, actual: char },
}

/// A successfully parsed and validated ISBN, in both forms where derivable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIsbn {
    /// Canonical 13-digit form, no separators.
    pub isbn13: String,
    /// 10-digit form, when the ISBN-13 prefix is "978"; `None` for "979-*".
    pub isbn10: Option<String>,
    /// Canonical hyphenated ISBN-13, e.g. "978-0-306-40615-7".
    ///
    /// The hyphen positions used here are illustrative (group-1/publisher-3/
    /// title-5/check-1) rather than GS1-registrant-range-accurate; callers
    /// needing publisher-range-correct hyphenation should consult a range
    /// table, which is out of scope for this crate.
    pub hyphenated: String,
}

/// Strip whitespace and hyphens, leaving only the candidate digits/`X`.
fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Parse and validate any ISBN-10 or ISBN-13 shaped input.
///
/// Accepts hyphens and surrounding/interspersed whitespace. Returns the
/// canonical ISBN-13 form plus, when derivable, the ISBN-10 form.
pub fn parse(raw: &str) -> Result<ParsedIsbn, IsbnError> {
    let stripped = strip_separators(raw);
    if stripped.is_empty() {
        return Err(IsbnError::Empty);
    }

    match stripped.len() {
        10 => parse_isbn10(&stripped),
        13 => parse_isbn13(&stripped),
        n => Err(IsbnError::WrongLength { actual: n }),
    }
}

fn digit_value(c: char) -> Option<u32> {
    c.to_digit(10)
}

fn parse_isbn10(body: &str) -> Result<ParsedIsbn, IsbnError> {
    let chars: Vec<char> = body.chars().collect();
    // First 9 characters must be digits; the 10th may be a digit or 'X'.
    let mut digits = Vec::with_capacity(9);
    for &c in &chars[..9] {
        digits.push(digit_value(c).ok_or(IsbnError::NonNumeric)?);
    }
    let last = chars[9];
    let last_value = if last == 'X' || last == 'x' {
        10
    } else {
        digit_value(last).ok_or(IsbnError::NonNumeric)?
    };

    let expected = isbn10_check_digit(&digits);
    let expected_char = if expected == 10 { 'X' } else { char::from_digit(expected, 10).unwrap() };
    if expected != last_value {
        return Err(IsbnError::BadCheckDigit {
            expected: expected_char,
            actual: last.to_ascii_uppercase(),
        });
    }

    let isbn10: String = digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect::<String>()
        + &expected_char.to_string();
    let isbn13 = isbn10_to_isbn13_unchecked(&digits);
    let hyphenated = hyphenate(&isbn13);

    Ok(ParsedIsbn {
        isbn13,
        isbn10: Some(isbn10),
        hyphenated,
    })
}

fn parse_isbn13(body: &str) -> Result<ParsedIsbn, IsbnError> {
    let mut digits = Vec::with_capacity(13);
    for c in body.chars() {
        digits.push(digit_value(c).ok_or(IsbnError::NonNumeric)?);
    }

    let expected = isbn13_check_digit(&digits[..12]);
    let actual = digits[12];
    if expected != actual {
        return Err(IsbnError::BadCheckDigit {
            expected: char::from_digit(expected, 10).unwrap(),
            actual: char::from_digit(actual, 10).unwrap(),
        });
    }

    let isbn13: String = digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
    let isbn10 = isbn13_to_isbn10(&isbn13);
    let hyphenated = hyphenate(&isbn13);

    Ok(ParsedIsbn {
        isbn13,
        isbn10,
        hyphenated,
    })
}

/// `sum = Σ (10-i)·digit_i for i=0..8`; `check = (11 - sum mod 11) mod 11`.
fn isbn10_check_digit(first_nine: &[u32]) -> u32 {
    let sum: u32 = first_nine
        .iter()
        .enumerate()
        .map(|(i, d)| (10 - i as u32) * d)
        .sum();
    (11 - sum % 11) % 11
}

/// `sum = Σ weight_i·digit_i for i=0..11` where `weight_i = 1 if i even else 3`.
fn isbn13_check_digit(first_twelve: &[u32]) -> u32 {
    let sum: u32 = first_twelve
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { 3 * d })
        .sum();
    (10 - sum % 10) % 10
}

fn isbn10_to_isbn13_unchecked(first_nine: &[u32]) -> String {
    let prefix = [9u32, 7, 8];
    let twelve: Vec<u32> = prefix.iter().copied().chain(first_nine.iter().copied()).collect();
    let check = isbn13_check_digit(&twelve);
    let mut s: String = twelve.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
    s.push(char::from_digit(check, 10).unwrap());
    s
}

/// ISBN-10 -> ISBN-13: prepend "978" to the first 9 digits, recompute the check digit.
pub fn isbn10_to_isbn13(isbn10: &str) -> Result<String, IsbnError> {
    let parsed = parse(isbn10)?;
    Ok(parsed.isbn13)
}

/// ISBN-13 -> ISBN-10: only succeeds for the "978" prefix.
pub fn isbn13_to_isbn10(isbn13: &str) -> Option<String> {
    if !isbn13.starts_with("978") || isbn13.len() != 13 {
        return None;
    }
    let digits: Vec<u32> = isbn13.chars().filter_map(digit_value).collect();
    if digits.len() != 13 {
        return None;
    }
    let first_nine = &digits[3..12];
    let check = isbn10_check_digit(first_nine);
    let check_char = if check == 10 { 'X' } else { char::from_digit(check, 10).unwrap() };
    let mut s: String = first_nine.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
    s.push(check_char);
    Some(s)
}

fn hyphenate(isbn13: &str) -> String {
    if isbn13.len() != 13 {
        return isbn13.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &isbn13[0..3],
        &isbn13[3..4],
        &isbn13[4..7],
        &isbn13[7..12],
        &isbn13[12..13]
    )
}
