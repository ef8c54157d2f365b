use std::fmt;

use ts3query_codec::{encode_bool, escape};

use crate::error::{QueryError, Result};

/// Value of one command parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// Omitted from the compiled command.
    Absent,
}

impl ParamValue {
    /// Wire form, or `None` for an absent value.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(escape(text)),
            Self::Bool(flag) => Some(encode_bool(*flag).to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::UInt(n) => Some(n.to_string()),
            Self::Absent => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! param_from_int {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )+
    };
}

param_from_int!(Int: i8, i16, i32, i64);
param_from_int!(UInt: u8, u16, u32, u64);

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        Self::UInt(value as u64)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

/// One parameter group of a command: flag options plus `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipe {
    options: Vec<String>,
    params: Vec<(String, ParamValue)>,
}

impl Pipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter. Keys are lower-cased; setting a key twice keeps its
    /// position and replaces the value.
    #[must_use]
    pub fn param(mut self, key: impl AsRef<str>, value: impl Into<ParamValue>) -> Self {
        self.set_param(key.as_ref(), value.into());
        self
    }

    /// Add a flag option (rendered `-name`). Duplicates are ignored.
    #[must_use]
    pub fn option(mut self, name: impl Into<String>) -> Self {
        self.add_option(name.into());
        self
    }

    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when nothing would be rendered.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.params.iter().all(|(_, v)| *v == ParamValue::Absent)
    }

    fn set_param(&mut self, key: &str, value: ParamValue) {
        let key = key.to_ascii_lowercase();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
    }

    fn add_option(&mut self, name: String) {
        if !self.options.contains(&name) {
            self.options.push(name);
        }
    }

    fn tokens(&self) -> impl Iterator<Item = String> + '_ {
        let params = self
            .params
            .iter()
            .filter_map(|(key, value)| value.render().map(|rendered| format!("{key}={rendered}")));
        let options = self.options.iter().map(|option| format!("-{option}"));
        params.chain(options)
    }

    fn validate(&self) -> Result<()> {
        for (key, _) in &self.params {
            validate_token("parameter key", key)?;
        }
        for option in &self.options {
            validate_token("option", option)?;
        }
        Ok(())
    }
}

/// A command and its parameter groups.
///
/// Every builder method returns a new value and leaves `self` untouched, so
/// a partially built query can serve as a template:
///
/// ```
/// use ts3query_session::{Pipe, QueryBuilder};
///
/// let kick = QueryBuilder::new("clientkick").param("reasonid", 4);
/// let q = kick.pipe(Pipe::new().param("clid", 5)).pipe(Pipe::new().param("clid", 6));
/// assert_eq!(q.compile(), "clientkick reasonid=4 clid=5|clid=6");
/// assert_eq!(kick.compile(), "clientkick reasonid=4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilder {
    command: String,
    head: Pipe,
    pipes: Vec<Pipe>,
}

impl QueryBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            head: Pipe::new(),
            pipes: Vec::new(),
        }
    }

    /// Add a parameter to the leading group.
    #[must_use]
    pub fn param(&self, key: impl AsRef<str>, value: impl Into<ParamValue>) -> Self {
        let mut next = self.clone();
        next.head.set_param(key.as_ref(), value.into());
        next
    }

    /// Add a flag option to the leading group.
    #[must_use]
    pub fn option(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.head.add_option(name.into());
        next
    }

    /// Append a parameter group. The first one is rendered inline after the
    /// leading group; later ones are separated by `|`.
    #[must_use]
    pub fn pipe(&self, pipe: Pipe) -> Self {
        let mut next = self.clone();
        next.pipes.push(pipe);
        next
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn head(&self) -> &Pipe {
        &self.head
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    /// Render the wire form, without delimiter.
    ///
    /// The leading group and the first pipe share the segment after the
    /// command; neither overrides the other's keys.
    pub fn compile(&self) -> String {
        let mut out = self.command.clone();

        let mut rest = self.pipes.iter();
        let inline = rest.next().into_iter().flat_map(|pipe| pipe.tokens());
        for token in self.head.tokens().chain(inline) {
            out.push(' ');
            out.push_str(&token);
        }

        for pipe in rest.filter(|pipe| !pipe.is_empty()) {
            out.push('|');
            out.push_str(&pipe.tokens().collect::<Vec<_>>().join(" "));
        }
        out
    }

    /// Check that the command, keys and options are plain tokens.
    ///
    /// Only values are escaped on the wire; everything else must not contain
    /// separators or control characters.
    pub fn validate(&self) -> Result<()> {
        validate_token("command", &self.command)?;
        self.head.validate()?;
        for pipe in &self.pipes {
            pipe.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compile())
    }
}

fn validate_token(what: &str, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(QueryError::InvalidQuery(format!("{what} is empty")));
    }
    if let Some(bad) = token
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '|' | '='))
    {
        return Err(QueryError::InvalidQuery(format!(
            "{what} {token:?} contains {bad:?}"
        )));
    }
    Ok(())
}
