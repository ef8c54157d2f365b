use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use serde::Serialize;
use ts3query_codec::{decode_item_list, decode_outcome, trim_delimiter, CodecError, Outcome, Record};

use crate::error::{QueryError, Result};

/// Outcome id for "already member of channel", e.g. when moving a batch of
/// clients that includes one already in the target.
pub const ALREADY_MEMBER_OF_CHANNEL: u32 = 770;
/// Outcome id for "database empty result set", returned by list commands
/// with nothing to list.
pub const DATABASE_EMPTY_RESULT: u32 = 1281;

/// Decoded view of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Parsed<'a> {
    pub items: &'a [Record],
    pub outcome: &'a Outcome,
}

type Memo<T> = OnceLock<std::result::Result<T, Arc<CodecError>>>;

/// The lines one command produced, ending with its outcome line.
///
/// The outcome and the body are decoded on first access and each result,
/// success or failure, is kept. A body that fails to decode does not hide
/// the outcome.
#[derive(Debug)]
pub struct Response {
    lines: Vec<Bytes>,
    outcome: Memo<Outcome>,
    items: Memo<Vec<Record>>,
}

impl Response {
    /// Build a response from raw lines; the last one must be the outcome.
    pub fn new(lines: Vec<Bytes>) -> Self {
        Self {
            lines,
            outcome: OnceLock::new(),
            items: OnceLock::new(),
        }
    }

    /// Raw lines as received, delimiters included.
    pub fn lines(&self) -> &[Bytes] {
        &self.lines
    }

    /// Outcome and items together; fails if either does not decode.
    pub fn parse(&self) -> Result<Parsed<'_>> {
        Ok(Parsed {
            items: self.items()?,
            outcome: self.outcome()?,
        })
    }

    /// Whether the lines decode cleanly.
    pub fn is_parseable(&self) -> bool {
        self.parse().is_ok()
    }

    /// Items from every body line, in wire order.
    pub fn items(&self) -> Result<&[Record]> {
        self.items
            .get_or_init(|| decode_body(&self.lines).map_err(Arc::new))
            .as_ref()
            .map(Vec::as_slice)
            .map_err(|err| QueryError::Malformed(Arc::clone(err)))
    }

    /// The closing outcome.
    pub fn outcome(&self) -> Result<&Outcome> {
        self.outcome
            .get_or_init(|| {
                let last = self.lines.last().ok_or(CodecError::MissingOutcome)?;
                decode_outcome(last).map_err(Arc::new)
            })
            .as_ref()
            .map_err(|err| QueryError::Malformed(Arc::clone(err)))
    }

    /// First item, if the body decoded and has one.
    pub fn first(&self) -> Option<&Record> {
        self.items().ok().and_then(|items| items.first())
    }

    /// Fail with [`QueryError::Protocol`] unless the outcome is success.
    ///
    /// Only the outcome line is consulted; an undecodable body surfaces
    /// later through [`Response::items`].
    pub fn into_result(self) -> Result<Self> {
        self.into_result_ignoring(&[])
    }

    /// Like [`Response::into_result`], treating the listed ids as success.
    pub fn into_result_ignoring(self, ignored: &[u32]) -> Result<Self> {
        let outcome = self.outcome()?;
        if outcome.is_ok() || outcome.code().is_some_and(|code| ignored.contains(&code)) {
            return Ok(self);
        }
        Err(protocol_error(outcome))
    }
}

impl Clone for Response {
    fn clone(&self) -> Self {
        Self::new(self.lines.clone())
    }
}

fn decode_body(lines: &[Bytes]) -> std::result::Result<Vec<Record>, CodecError> {
    let body = lines.split_last().map_or(&[][..], |(_, body)| body);
    let mut items = Vec::new();
    for line in body {
        items.extend(decode_item_list(trim_delimiter(line))?);
    }
    Ok(items)
}

pub(crate) fn protocol_error(outcome: &Outcome) -> QueryError {
    QueryError::Protocol {
        id: outcome.id.clone(),
        msg: outcome.msg.clone(),
        extra_msg: outcome.extra_msg().map(str::to_string),
    }
}

/// An unsolicited notification: one line, a name and an item list.
#[derive(Debug)]
pub struct Event {
    name: String,
    name_end: usize,
    line: Bytes,
    items: OnceLock<std::result::Result<Vec<Record>, Arc<CodecError>>>,
}

impl Event {
    /// Build an event from its raw line.
    pub fn new(line: Bytes) -> Self {
        let content = trim_delimiter(&line);
        let name_end = content
            .iter()
            .position(u8::is_ascii_whitespace)
            .unwrap_or(content.len());
        let name = String::from_utf8_lossy(&content[..name_end]).into_owned();
        Self {
            name,
            name_end,
            line,
            items: OnceLock::new(),
        }
    }

    /// Event name, e.g. `notifycliententerview`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw line as received.
    pub fn line(&self) -> &Bytes {
        &self.line
    }

    /// Items following the name.
    pub fn items(&self) -> Result<&[Record]> {
        self.items
            .get_or_init(|| {
                let content = trim_delimiter(&self.line);
                let rest = &content[self.name_end..];
                let rest = rest.trim_ascii_start();
                if rest.is_empty() {
                    return Ok(Vec::new());
                }
                decode_item_list(rest).map_err(Arc::new)
            })
            .as_ref()
            .map(Vec::as_slice)
            .map_err(|err| QueryError::Malformed(Arc::clone(err)))
    }

    /// First item, if any.
    pub fn first(&self) -> Option<&Record> {
        self.items().ok().and_then(|items| items.first())
    }
}

impl Clone for Event {
    fn clone(&self) -> Self {
        Self::new(self.line.clone())
    }
}
