//! Pseudo-query statement parsing.
//!
//! A statement is one or more lines of text. Lines starting with `--` carry
//! hints (`-- key: value`); every other line is appended, in order and
//! without a separator, to the effective command line. The command line is
//! split on single spaces: the first token names the command and the rest
//! are its positional arguments.

use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};

/// Prefix that marks a hint line.
pub const HINT_PREFIX: &str = "--";

/// Health-check probe sent by generic SQL tools. Any statement containing it
/// is answered with a bare `PING`.
pub const KEEP_ALIVE_SENTINEL: &str = "SELECT 'keep alive'";

/// Recognized hint keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HintKey {
    /// Requested value decoder. Parsed and retained, but inert.
    Decoder,
    /// Routing key used by the cluster client.
    SampleKey,
    /// Any hint whose key was not recognized or not allowed.
    Noop,
}

impl HintKey {
    /// Hint keys accepted when the caller does not restrict them.
    pub const DEFAULT_ALLOWED: [HintKey; 2] = [HintKey::Decoder, HintKey::SampleKey];

    pub fn as_str(&self) -> &'static str {
        match self {
            HintKey::Decoder => "decoder",
            HintKey::SampleKey => "sample_key",
            HintKey::Noop => "noop",
        }
    }

    /// Maps a textual key to its variant; unknown keys degrade to `Noop`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "decoder" => HintKey::Decoder,
            "sample_key" => HintKey::SampleKey,
            _ => HintKey::Noop,
        }
    }
}

impl fmt::Display for HintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Out-of-band directive attached to a statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hint {
    pub key: HintKey,
    pub value: String,
}

/// Parsed form of one statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Op {
    original_text: String,
    hints: Vec<Hint>,
    command: String,
    args: Vec<String>,
}

impl Op {
    pub fn new(
        original_text: impl Into<String>,
        hints: Vec<Hint>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            original_text: original_text.into(),
            hints,
            command: command.into(),
            args,
        }
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Value of the first hint with the given key.
    pub fn hint(&self, key: HintKey) -> Option<&str> {
        self.hints
            .iter()
            .find(|hint| hint.key == key)
            .map(|hint| hint.value.as_str())
    }

    /// Routing key for cluster dispatch, taken from the `sample_key` hint.
    pub fn sample_key(&self) -> Option<&str> {
        self.hint(HintKey::SampleKey)
    }

    /// Same statement text and hints, different command line.
    pub(crate) fn rewrite(&self, command: &str, args: Vec<String>) -> Self {
        Self {
            original_text: self.original_text.clone(),
            hints: self.hints.clone(),
            command: command.to_string(),
            args,
        }
    }
}

/// Parses a statement into an [`Op`].
///
/// `allowed_hint_keys` restricts which hint keys are kept; an empty slice
/// means [`HintKey::DEFAULT_ALLOWED`]. Malformed hints never fail the parse.
/// The only failure is an effective command line without tokens.
pub fn parse_statement(text: &str, allowed_hint_keys: &[HintKey]) -> Result<Op> {
    if text.contains(KEEP_ALIVE_SENTINEL) {
        return Ok(Op::new(text, Vec::new(), "PING", Vec::new()));
    }

    let allowed = if allowed_hint_keys.is_empty() {
        &HintKey::DEFAULT_ALLOWED[..]
    } else {
        allowed_hint_keys
    };

    let mut hints = Vec::new();
    let mut command_line = String::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(HINT_PREFIX) {
            hints.push(parse_hint(rest, allowed));
        } else {
            command_line.push_str(line);
        }
    }

    let command_line = command_line.trim();
    if command_line.is_empty() {
        return Err(Error::Parse(format!(
            "statement has no command: {text:?}"
        )));
    }

    let mut tokens = command_line.split(' ');
    let command = tokens.next().unwrap_or_default().to_string();
    let args: Vec<String> = tokens.map(str::to_string).collect();

    debug!(command = %command, args = args.len(), hints = hints.len(), "parsed statement");
    Ok(Op::new(text, hints, command, args))
}

fn parse_hint(body: &str, allowed: &[HintKey]) -> Hint {
    let stripped: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let (name, value) = match stripped.split_once(':') {
        Some((name, value)) => (name, value),
        None => (stripped.as_str(), ""),
    };
    let key = match HintKey::from_name(name) {
        key if allowed.contains(&key) => key,
        _ => HintKey::Noop,
    };
    Hint {
        key,
        value: value.to_string(),
    }
}
