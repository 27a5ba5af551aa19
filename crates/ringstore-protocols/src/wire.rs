//! Token helpers shared by the control and data codecs.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Next whitespace-delimited token, or a `MissingField` error.
pub(crate) fn field<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<&'a str> {
    match parts.next() {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(Error::MissingField(name)),
    }
}

/// Parse a token into a number (or any `FromStr`).
pub(crate) fn parse<T: FromStr>(token: &str, name: &'static str) -> Result<T> {
    token.parse().map_err(|_| Error::InvalidField {
        field: name,
        value: token.to_string(),
    })
}

/// Next token, parsed.
pub(crate) fn parsed<'a, T: FromStr>(
    parts: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<T> {
    parse(field(parts, name)?, name)
}

/// Encode a visited-id trail: comma-joined, `-` when empty.
pub(crate) fn encode_trail(ids: &[usize]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a visited-id trail.
pub(crate) fn decode_trail(token: &str) -> Result<Vec<usize>> {
    if token == "-" || token.is_empty() {
        return Ok(Vec::new());
    }
    token.split(',').map(|id| parse(id, "visited trail")).collect()
}
