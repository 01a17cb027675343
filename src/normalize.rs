//! Band-name canonicalisation.
//!
//! Every identity in the graph goes through [`normalize`]. Two spellings that
//! differ only in accents, separators, quoting, spacing or case collapse to
//! the same key: `"  sigur   RÓS "` and `"Sigur-Ros"` both become
//! `"Sigur Ros"`.

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Characters removed outright.
const STRIPPED: &[char] = &['"', '\'', '(', ')', '[', ']', '{', '}', '<', '>'];

/// Characters whose runs collapse into a single space.
const SEPARATORS: &[char] = &['-', '_', '\u{2013}'];

/// Canonicalise a free-text band name. Total: never fails, may return "".
pub fn normalize(raw: &str) -> String {
    // NFKD splits "ó" into "o" + a combining accent. Separators are mapped
    // before the ASCII fold so an en-dash becomes a space instead of
    // vanishing; every remaining non-ASCII code point is dropped.
    let mut ascii = String::with_capacity(raw.len());
    let mut in_separator = false;
    for c in raw.nfkd() {
        if SEPARATORS.contains(&c) {
            if !in_separator {
                ascii.push(' ');
            }
            in_separator = true;
            continue;
        }
        in_separator = false;
        if c.is_ascii() && !STRIPPED.contains(&c) {
            ascii.push(c);
        }
    }

    let collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");
    title_case(&collapsed)
}

/// Normalise a loosely typed JSON value; anything but a string yields "".
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(s) => normalize(s),
        _ => String::new(),
    }
}

/// Upper-case a letter that follows a non-letter, lower-case the rest.
/// "ac/dc" → "Ac/Dc", "3inches" → "3Inches".
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
