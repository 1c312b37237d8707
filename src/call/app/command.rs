//! Decoding of caller keypresses into pixel commands.
//!
//! Callers enter `#<x>#<y>#<color>*`. Anything typed before the first `#` is
//! ignored, the color is a 1-based index into the configured catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const FIELD_SEPARATOR: char = '#';
pub const SEQUENCE_TERMINATOR: char = '*';

/// Draw `color` at (`x`, `y`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCommand {
    pub x: i64,
    pub y: i64,
    pub color: String,
}

impl fmt::Display for PixelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {}", self.x, self.y, self.color)
    }
}

/// Ordered list of color tokens a caller can pick from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorCatalog {
    colors: Vec<String>,
}

impl ColorCatalog {
    pub fn new(colors: Vec<String>) -> Self {
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Look up a caller-facing, 1-based index.
    pub fn resolve(&self, index: u32) -> Option<&str> {
        let slot = (index as usize).checked_sub(1)?;
        self.colors.get(slot).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.colors.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no '#' in input")]
    MissingPrefix,
    #[error("expected 3 fields, got {0}")]
    FieldCount(usize),
    #[error("color field does not end with '*'")]
    MissingTerminator,
    #[error("{field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("color {index} outside 1..={size}")]
    ColorOutOfRange { index: u32, size: usize },
}

/// Parse `raw` keypresses into a [`PixelCommand`].
///
/// Pure: the same input and catalog always produce the same result.
pub fn parse_pixel_input(raw: &str, catalog: &ColorCatalog) -> Result<PixelCommand, ParseError> {
    let start = raw.find(FIELD_SEPARATOR).ok_or(ParseError::MissingPrefix)?;
    let fields: Vec<&str> = raw[start + FIELD_SEPARATOR.len_utf8()..]
        .split(FIELD_SEPARATOR)
        .collect();
    let [x, y, color] = fields.as_slice() else {
        return Err(ParseError::FieldCount(fields.len()));
    };

    if !color.ends_with(SEQUENCE_TERMINATOR) {
        return Err(ParseError::MissingTerminator);
    }
    let color = color.trim_end_matches(SEQUENCE_TERMINATOR);

    let x = parse_number::<i64>("x", x)?;
    let y = parse_number::<i64>("y", y)?;
    let index = parse_number::<u32>("color", color)?;

    let color = catalog
        .resolve(index)
        .ok_or(ParseError::ColorOutOfRange {
            index,
            size: catalog.len(),
        })?
        .to_string();
    Ok(PixelCommand { x, y, color })
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
