use std::fmt;

use strum_macros::{AsRefStr, Display};

/// Declared type of a positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ArgType {
    Str,
    Bool,
    Int,
}

/// A converted positional argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Arg::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "{}", s),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Parse a boolean token: `true/1/on` and `false/0/off`, case-insensitive
pub fn parse_bool(token: &str) -> Option<bool> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

impl ArgType {
    /// Convert one token to this type
    pub fn convert(self, token: &str) -> Option<Arg> {
        match self {
            ArgType::Str => Some(Arg::Str(token.to_string())),
            ArgType::Bool => parse_bool(token).map(Arg::Bool),
            ArgType::Int => token.parse::<i64>().ok().map(Arg::Int),
        }
    }
}

/// Result of matching tokens against a command or event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome<T> {
    /// The name differs, try the next candidate
    NoMatch,
    /// Name and arguments matched
    Matched(T),
    /// Name matched but the arguments did not
    Failed(String),
}

impl<T> MatchOutcome<T> {
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchOutcome::NoMatch)
    }
}

/// Match typed positional arguments against `types`.
///
/// `tokens` excludes the command name. Absent `types` means the command takes
/// no arguments at all.
pub fn convert_args(types: Option<&[ArgType]>, tokens: &[String]) -> Result<Vec<Arg>, String> {
    let Some(types) = types else {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        return Err("extra args given".to_string());
    };
    if tokens.len() != types.len() {
        return Err("wrong number of args".to_string());
    }
    types
        .iter()
        .zip(tokens)
        .enumerate()
        .map(|(i, (ty, tok))| {
            ty.convert(tok)
                .ok_or_else(|| format!("wrong argument @{}", i + 1))
        })
        .collect()
}

/// A named command with optional typed arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub arg_types: Option<Vec<ArgType>>,
}

impl Command {
    /// A command that takes no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_types: None,
        }
    }

    /// A command with typed positional arguments
    pub fn with_args(name: impl Into<String>, arg_types: &[ArgType]) -> Self {
        Self {
            name: name.into(),
            arg_types: Some(arg_types.to_vec()),
        }
    }

    /// Match a token list whose first element is the command name
    pub fn matches(&self, tokens: &[String]) -> MatchOutcome<Vec<Arg>> {
        match tokens.split_first() {
            Some((name, rest)) if *name == self.name => {
                match convert_args(self.arg_types.as_deref(), rest) {
                    Ok(args) => MatchOutcome::Matched(args),
                    Err(reason) => MatchOutcome::Failed(reason),
                }
            }
            _ => MatchOutcome::NoMatch,
        }
    }
}

/// Tokens of an error reply for a failed command match
pub fn error_reply(module: &str, cmd: &str, reason: &str) -> Vec<String> {
    let mut tokens = vec!["error".to_string(), module.to_string(), format!("{}:", cmd)];
    tokens.extend(reason.split_whitespace().map(str::to_string));
    tokens
}
