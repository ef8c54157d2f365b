//! Wire codec for the query protocol.
//!
//! The protocol is line oriented. Every line ends with `\n\r` and carries
//! one of three shapes:
//! - an item list: `key=value key=value|key=value ...`
//! - an outcome: `error id=<int> msg=<escaped text>`, closing a response
//! - an event: `notify<name> key=value ...`
//!
//! Keys and values are escaped with [`escape`]; nothing here knows about
//! sockets, only about bytes.

pub mod error;
pub mod escape;
pub mod line;
pub mod outcome;
pub mod reader;
pub mod record;
pub mod writer;

pub use error::{CodecError, Result};
pub use escape::{encode_bool, escape, unescape};
pub use line::{
    decode_line, encode_line, is_blank, trim_delimiter, DEFAULT_MAX_LINE, LINE_DELIMITER,
};
pub use outcome::{decode_outcome, is_outcome_line, Outcome, OUTCOME_OK};
pub use reader::LineReader;
pub use record::{decode_item, decode_item_list, decode_property, Record};
pub use writer::LineWriter;
