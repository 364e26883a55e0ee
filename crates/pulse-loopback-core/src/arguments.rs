//! Module argument strings.
//!
//! `pactl` describes module arguments as a flat list of `key=value` pairs
//! separated by whitespace. Values may be bare, double-quoted or
//! single-quoted; quotes cannot be escaped inside a quoted run.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Ordered mapping of module argument keys to values.
///
/// Keys are unique and keep the position of their first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    entries: Vec<(String, String)>,
}

impl Arguments {
    /// Create an empty argument mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a value, returning the previous one.
    ///
    /// An existing key keeps its position; a new key is appended.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Iterate over `(key, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a value as a 32-bit integer.
    ///
    /// Returns `None` if the key is missing or the value is not an integer
    /// in `i32` range.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Read a value as an integer, falling back to `default`.
    #[must_use]
    pub fn get_int_or(&self, key: &str, default: i32) -> i32 {
        self.get_int(key).unwrap_or(default)
    }

    /// Store an integer, returning the previous value if it was an integer.
    pub fn put_int(&mut self, key: impl Into<String>, value: i32) -> Option<i32> {
        self.insert(key, value.to_string()).and_then(|v| v.parse().ok())
    }

    /// Read a value as a boolean.
    ///
    /// Returns `None` if the key is missing or the value is not a
    /// recognised boolean word.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(parse_bool)
    }

    /// Read a value as a boolean, falling back to `default`.
    #[must_use]
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Store a boolean as `y` or `n`, returning the previous value if it
    /// was a boolean.
    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) -> Option<bool> {
        self.insert(key, if value { "y" } else { "n" }).as_deref().and_then(parse_bool)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut arguments = Self::new();
        for (key, value) in iter {
            arguments.insert(key, value);
        }
        arguments
    }
}

impl FromStr for Arguments {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}=")?;
            write_value(f, value)?;
        }
        Ok(())
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let needs_quotes =
        value.chars().any(char::is_whitespace) || value.starts_with(['"', '\'']);
    if !needs_quotes {
        f.write_str(value)
    } else if value.contains('"') {
        // Not round-trip safe if the value also contains a single quote.
        write!(f, "'{value}'")
    } else {
        write!(f, "\"{value}\"")
    }
}

/// Parse a boolean the way the audio server does.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "y" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "n" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize arguments into the `key=value` form accepted by `load-module`.
#[must_use]
pub fn serialize(arguments: &Arguments) -> String {
    arguments.to_string()
}

/// Build arguments from separate `key=value` words, such as command line
/// arguments.
///
/// Each word is split at its first `=` and the value is kept literally,
/// quotes and whitespace included. The position of a duplicate key is the
/// index of its word.
///
/// # Errors
/// Returns an error if a word has no `=` or an empty key, or a key appears
/// twice.
pub fn from_pairs<I, S>(words: I) -> Result<Arguments>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut arguments = Arguments::new();
    for (position, word) in words.into_iter().enumerate() {
        let word = word.as_ref();
        let Some((key, value)) = word.split_once('=') else {
            return Err(Error::InvalidPair(word.to_string()));
        };
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(Error::InvalidPair(word.to_string()));
        }
        if arguments.contains_key(key) {
            return Err(Error::DuplicateKey { key: key.to_string(), position });
        }
        arguments.insert(key, value);
    }
    Ok(arguments)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Whitespace,
    Key,
    ValueStart,
    ValueBare,
    ValueDoubleQuoted,
    ValueSingleQuoted,
}

/// Parse a module argument string.
///
/// # Errors
/// Returns an error if an `=` appears before a key, a quoted value is not
/// terminated, a key has no `=`, or a key appears twice.
pub fn parse(text: &str) -> Result<Arguments> {
    let mut arguments = Arguments::new();
    let mut state = State::Whitespace;
    let mut key = String::new();
    let mut key_start = 0;
    let mut value = String::new();

    for (position, c) in text.chars().enumerate() {
        state = match state {
            State::Whitespace if c == '=' => return Err(Error::UnexpectedEquals(position)),
            State::Whitespace if c.is_whitespace() => State::Whitespace,
            State::Whitespace => {
                key.clear();
                key.push(c);
                key_start = position;
                State::Key
            }
            State::Key if c == '=' => {
                value.clear();
                State::ValueStart
            }
            State::Key => {
                key.push(c);
                State::Key
            }
            State::ValueStart => match c {
                '\'' => State::ValueSingleQuoted,
                '"' => State::ValueDoubleQuoted,
                c if c.is_whitespace() => {
                    commit(&mut arguments, &mut key, key_start, &mut value)?;
                    State::Whitespace
                }
                c => {
                    value.push(c);
                    State::ValueBare
                }
            },
            State::ValueBare if c.is_whitespace() => {
                commit(&mut arguments, &mut key, key_start, &mut value)?;
                State::Whitespace
            }
            State::ValueDoubleQuoted if c == '"' => {
                commit(&mut arguments, &mut key, key_start, &mut value)?;
                State::Whitespace
            }
            State::ValueSingleQuoted if c == '\'' => {
                commit(&mut arguments, &mut key, key_start, &mut value)?;
                State::Whitespace
            }
            State::ValueBare | State::ValueDoubleQuoted | State::ValueSingleQuoted => {
                value.push(c);
                state
            }
        };
    }

    match state {
        State::Whitespace => {}
        State::ValueStart | State::ValueBare => {
            commit(&mut arguments, &mut key, key_start, &mut value)?;
        }
        State::Key | State::ValueDoubleQuoted | State::ValueSingleQuoted => {
            return Err(Error::UnexpectedEnd);
        }
    }

    Ok(arguments)
}

fn commit(
    arguments: &mut Arguments,
    key: &mut String,
    key_start: usize,
    value: &mut String,
) -> Result<()> {
    let key = std::mem::take(key);
    if arguments.contains_key(&key) {
        return Err(Error::DuplicateKey { key, position: key_start });
    }
    arguments.insert(key, std::mem::take(value));
    Ok(())
}
