//! Escaping of reserved characters in keys and values.
//!
//! Every reserved character maps to a two-character sequence starting with a
//! backslash. Both directions work in a single left-to-right pass, so escape
//! sequences already present in the input never get reinterpreted.

/// Reserved characters and their escape sequences, backslash first.
pub const ESCAPE_TABLE: [(char, &str); 11] = [
    ('\\', r"\\"),
    ('/', r"\/"),
    (' ', r"\s"),
    ('|', r"\p"),
    ('\u{07}', r"\a"),
    ('\u{08}', r"\b"),
    ('\u{0C}', r"\f"),
    ('\n', r"\n"),
    ('\r', r"\r"),
    ('\t', r"\t"),
    ('\u{0B}', r"\v"),
];

/// Escape `value` for use on the wire.
///
/// ```
/// assert_eq!(ts3query_codec::escape("Go away!"), r"Go\saway!");
/// assert_eq!(ts3query_codec::escape("a|b/c"), r"a\pb\/c");
/// ```
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 8);
    for ch in value.chars() {
        match escape_char(ch) {
            Some(seq) => out.push_str(seq),
            None => out.push(ch),
        }
    }
    out
}

/// Undo [`escape`].
///
/// Unknown sequences and a trailing lone backslash are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(code) => match unescape_code(code) {
                Some(original) => out.push(original),
                None => {
                    out.push('\\');
                    out.push(code);
                }
            },
            None => out.push('\\'),
        }
    }
    out
}

/// Wire form of a boolean parameter.
pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn escape_char(ch: char) -> Option<&'static str> {
    ESCAPE_TABLE
        .iter()
        .find(|(reserved, _)| *reserved == ch)
        .map(|(_, seq)| *seq)
}

fn unescape_code(code: char) -> Option<char> {
    ESCAPE_TABLE
        .iter()
        .rev()
        .find(|(_, seq)| seq.as_bytes()[1] as char == code)
        .map(|(reserved, _)| *reserved)
}
