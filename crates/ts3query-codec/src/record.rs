use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::error::{CodecError, Result};
use crate::escape::unescape;

/// Separates items within one line.
pub const ITEM_SEPARATOR: u8 = b'|';
/// Separates a key from its value.
pub const KEY_VALUE_SEPARATOR: u8 = b'=';

/// One item of a response or event: an insertion-ordered key/value map.
///
/// Keys are stored as the server sent them. Lookups try an exact match first
/// and fall back to an ASCII case-insensitive match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, replacing the value of an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.fields.get(key) {
            return Some(value.as_str());
        }
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True for an item without properties.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Properties in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Consume the record and return the underlying map.
    pub fn into_inner(self) -> IndexMap<String, String> {
        self.fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if value.is_empty() {
                f.write_str(key)?;
            } else {
                write!(f, "{key}={}", crate::escape::escape(value))?;
            }
        }
        Ok(())
    }
}

/// Decode one `key=value` property.
///
/// The split happens at the first `=`; further `=` characters belong to the
/// value. A bare key yields an empty value. Only a key that is not valid
/// UTF-8 fails; an undecodable value is decoded lossily.
///
/// ```
/// use ts3query_codec::decode_property;
///
/// let (key, value) = decode_property(b"client_unique_identifier=gZ7K+GIik=").unwrap();
/// assert_eq!(key, "client_unique_identifier");
/// assert_eq!(value, "gZ7K+GIik=");
/// ```
pub fn decode_property(prop: &[u8]) -> Result<(String, String)> {
    let (key, value) = match prop.iter().position(|&b| b == KEY_VALUE_SEPARATOR) {
        Some(idx) => (&prop[..idx], &prop[idx + 1..]),
        None => (prop, &prop[prop.len()..]),
    };

    let key = std::str::from_utf8(key).map_err(|_| CodecError::InvalidKey {
        key_lossy: String::from_utf8_lossy(key).into_owned(),
    })?;

    let value = match std::str::from_utf8(value) {
        Ok(text) => unescape(text),
        Err(err) => {
            warn!(key, %err, "property value is not valid UTF-8; decoding lossily");
            unescape(&String::from_utf8_lossy(value))
        }
    };

    Ok((unescape(key), value))
}

/// Decode one item: properties separated by spaces.
pub fn decode_item(item: &[u8]) -> Result<Record> {
    let mut record = Record::new();
    for prop in item
        .split(|b| b.is_ascii_whitespace())
        .filter(|prop| !prop.is_empty())
    {
        let (key, value) = decode_property(prop)?;
        record.insert(key, value);
    }
    Ok(record)
}

/// Decode one line of data into its items.
///
/// ```
/// use ts3query_codec::decode_item_list;
///
/// let items = decode_item_list(b"a=1 b=2|c=3").unwrap();
/// assert_eq!(items.len(), 2);
/// assert_eq!(items[0].get("b"), Some("2"));
/// assert_eq!(items[1].get("c"), Some("3"));
/// ```
pub fn decode_item_list(line: &[u8]) -> Result<Vec<Record>> {
    line.split(|&b| b == ITEM_SEPARATOR)
        .map(decode_item)
        .collect()
}
