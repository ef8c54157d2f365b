use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::line::trim_delimiter;
use crate::record::{decode_item, Record};

/// Leading token of every outcome line.
pub const OUTCOME_PREFIX: &[u8] = b"error id=";

const OUTCOME_MSG_MARKER: &[u8] = b" msg=";

/// Outcome id reported for a successful command.
pub const OUTCOME_OK: &str = "0";

/// The trailing status record that closes every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Status code; `"0"` means success.
    pub id: String,
    /// Human-readable status, unescaped.
    pub msg: String,
    /// Every property of the line, including `id` and `msg`.
    pub fields: Record,
}

impl Outcome {
    /// Whether the command succeeded.
    pub fn is_ok(&self) -> bool {
        self.id == OUTCOME_OK
    }

    /// The id as a number, if it parses.
    pub fn code(&self) -> Option<u32> {
        self.id.parse().ok()
    }

    /// `extra_msg`, when the server supplied one.
    pub fn extra_msg(&self) -> Option<&str> {
        self.fields.get("extra_msg").filter(|msg| !msg.is_empty())
    }
}

/// Whether `line` matches the outcome grammar `error id=.. msg=..`.
pub fn is_outcome_line(line: &[u8]) -> bool {
    let line = trim_delimiter(line);
    line.starts_with(OUTCOME_PREFIX)
        && line[OUTCOME_PREFIX.len()..]
            .windows(OUTCOME_MSG_MARKER.len())
            .any(|w| w == OUTCOME_MSG_MARKER)
}

/// Decode an outcome line.
pub fn decode_outcome(line: &[u8]) -> Result<Outcome> {
    let line = trim_delimiter(line);
    if !is_outcome_line(line) {
        return Err(CodecError::MissingOutcome);
    }

    // Skip the leading "error" token; the rest is an ordinary item.
    let fields = decode_item(&line[b"error".len()..])?;
    let id = fields
        .get("id")
        .ok_or_else(|| CodecError::MalformedOutcome(String::from_utf8_lossy(line).into_owned()))?
        .to_string();
    let msg = fields.get("msg").unwrap_or_default().to_string();

    Ok(Outcome { id, msg, fields })
}
