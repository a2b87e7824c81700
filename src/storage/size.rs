//! Human-friendly size strings for descriptors.
//!
//! Descriptors carry sizes like `"150M"` or `"1.5T"`. Parsing uses binary
//! multiples. Formatting picks the largest unit that divides the value
//! exactly, so a written descriptor reloads to the same byte count.

use serde::{Deserialize, Deserializer, Serializer};

const UNITS: [(char, u64); 5] = [
    ('P', 1 << 50),
    ('T', 1 << 40),
    ('G', 1 << 30),
    ('M', 1 << 20),
    ('K', 1 << 10),
];

/// Parse a size string into bytes.
///
/// Accepts raw byte counts (`"4096"`), unit suffixes (`"150M"`, `"20G"`),
/// the `B`/`iB` forms (`"20GB"`, `"20GiB"`) and fractional values (`"1.5T"`).
/// An empty string is zero.
pub fn parse_size(text: &str) -> Result<u64, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid size '{}'", text))?;

    let suffix = suffix.trim().to_ascii_uppercase();
    let unit = suffix
        .strip_suffix("IB")
        .or_else(|| suffix.strip_suffix('B'))
        .unwrap_or(&suffix);

    let multiplier = match unit.chars().next() {
        None => 1,
        Some(c) if unit.len() == 1 => UNITS
            .iter()
            .find(|(symbol, _)| *symbol == c)
            .map(|(_, m)| *m)
            .ok_or_else(|| format!("Unknown size unit in '{}'", text))?,
        Some(_) => return Err(format!("Unknown size unit in '{}'", text)),
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(format!("Size '{}' is out of range", text));
    }

    Ok(bytes.round() as u64)
}

/// Format a byte count using the largest exact unit.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0".to_string();
    }

    UNITS
        .iter()
        .find(|(_, multiplier)| bytes % multiplier == 0)
        .map(|(symbol, multiplier)| format!("{}{}", bytes / multiplier, symbol))
        .unwrap_or_else(|| bytes.to_string())
}

/// Serde adapter: written as a size string, read from a string or an integer.
pub fn serialize<S: Serializer>(bytes: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_size(*bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bytes(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bytes(bytes) => Ok(bytes),
        Raw::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}
