use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One labeled cell of the terrain grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub block: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    InvalidJson(String),
    NotAnArray,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidJson(message) => {
                write!(f, "captured output is not valid JSON: {message}")
            }
            ParseError::NotAnArray => f.write_str("captured output is not a JSON array"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Decodes captured script output into an ordered block sequence.
///
/// The input must be a JSON array. Elements missing any of `x`, `y`, `z`
/// (or carrying a non-integer value) or with an empty/missing `block` label
/// are skipped; the relative order of retained elements is preserved. An
/// all-skipped (empty) result is valid.
pub fn parse_blocks(text: &str) -> Result<Vec<Block>, ParseError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| ParseError::InvalidJson(err.to_string()))?;
    let elements = value.as_array().ok_or(ParseError::NotAnArray)?;

    Ok(elements.iter().filter_map(extract_block).collect())
}

fn extract_block(element: &Value) -> Option<Block> {
    let x = element.get("x")?.as_i64()?;
    let y = element.get("y")?.as_i64()?;
    let z = element.get("z")?.as_i64()?;
    let block = element.get("block")?.as_str()?;
    if block.is_empty() {
        return None;
    }

    Some(Block {
        x,
        y,
        z,
        block: block.to_string(),
    })
}
