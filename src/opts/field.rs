use std::fmt;

use strum_macros::{AsRefStr, Display};

use crate::bot::command::parse_bool;

/// Type of an option field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
    Bool,
    Int,
    Str,
}

impl FieldType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(FieldType::Bool),
            "int" => Some(FieldType::Int),
            "str" => Some(FieldType::Str),
            _ => None,
        }
    }
}

/// Value of an option field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Bool,
            Value::Int(_) => FieldType::Int,
            Value::Str(_) => FieldType::Str,
        }
    }

    /// Parse a wire token as a value of `ty`
    pub fn parse(ty: FieldType, token: &str) -> Option<Self> {
        match ty {
            FieldType::Bool => parse_bool(token).map(Value::Bool),
            FieldType::Int => token.parse().ok().map(Value::Int),
            FieldType::Str => Some(Value::Str(token.to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Errors when changing an option value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    #[error("unknown option {0}")]
    UnknownKey(String),
    #[error("option {0} declared twice")]
    Duplicate(String),
    #[error("{value} is not a valid {ty}")]
    InvalidValue { value: String, ty: FieldType },
    #[error("{value} is outside [{min},{max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

/// A typed, range-checked option owned by a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionField {
    pub name: String,
    value: Value,
    default: Value,
    range: Option<(i64, i64)>,
    description: Option<String>,
}

impl OptionField {
    /// Create a field; the initial value is also the compiled default
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        let default = default.into();
        Self {
            name: name.into(),
            value: default.clone(),
            default,
            range: None,
            description: None,
        }
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, default)
    }

    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, default)
    }

    pub fn str(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, Value::Str(default.into()))
    }

    /// Restrict an int field to `[min, max]`. Ignored for other types.
    pub fn range(mut self, min: i64, max: i64) -> Self {
        if self.field_type() == FieldType::Int {
            self.range = Some((min, max));
        }
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.default.field_type()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn value_range(&self) -> Option<(i64, i64)> {
        self.range
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Validate a candidate value without applying it
    pub fn check(&self, value: &Value) -> Result<(), OptionError> {
        if value.field_type() != self.field_type() {
            return Err(OptionError::InvalidValue {
                value: value.to_string(),
                ty: self.field_type(),
            });
        }
        if let (Value::Int(v), Some((min, max))) = (value, self.range) {
            if *v < min || *v > max {
                return Err(OptionError::OutOfRange {
                    value: *v,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Apply a value. Returns whether the value actually changed.
    pub fn set(&mut self, value: Value) -> Result<bool, OptionError> {
        self.check(&value)?;
        if self.value == value {
            return Ok(false);
        }
        self.value = value;
        Ok(true)
    }

    /// Parse and apply a wire token
    pub fn set_from_str(&mut self, token: &str) -> Result<bool, OptionError> {
        let value = Value::parse(self.field_type(), token).ok_or_else(|| {
            OptionError::InvalidValue {
                value: token.to_string(),
                ty: self.field_type(),
            }
        })?;
        self.set(value)
    }

    /// Restore the compiled default. Returns whether the value changed.
    pub fn reset(&mut self) -> bool {
        let changed = self.value != self.default;
        self.value = self.default.clone();
        changed
    }

    /// Tokens of a `value` line, without the leading `value`
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens = vec![
            self.name.clone(),
            self.field_type().to_string(),
            self.value.to_string(),
        ];
        if let Some((min, max)) = self.range {
            tokens.push(format!("[{},{}]", min, max));
        }
        if let Some(desc) = &self.description {
            tokens.push(desc.clone());
        }
        tokens
    }

    /// Parse the tokens of a `value` line (without the leading `value`).
    ///
    /// The parsed value also becomes the default of the snapshot since the
    /// owner's compiled default is not transmitted.
    pub fn parse(tokens: &[String]) -> Option<Self> {
        let [name, ty, value, rest @ ..] = tokens else {
            return None;
        };
        let ty = FieldType::from_name(ty)?;
        let value = Value::parse(ty, value)?;
        let mut field = OptionField::new(name.clone(), value);

        let mut rest = rest.iter();
        let mut next = rest.next();
        // only int fields carry a range, anything else is description text
        let range = next
            .filter(|_| ty == FieldType::Int)
            .and_then(|tok| tok.strip_prefix('[')?.strip_suffix(']'));
        if let Some(inner) = range {
            let (min, max) = inner.split_once(',')?;
            field.range = Some((min.trim().parse().ok()?, max.trim().parse().ok()?));
            next = rest.next();
        }
        if let Some(desc) = next {
            let mut text = desc.clone();
            for more in rest {
                text.push(' ');
                text.push_str(more);
            }
            field.description = Some(text);
        }
        Some(field)
    }
}

impl fmt::Display for OptionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tokens().join(" "))
    }
}
