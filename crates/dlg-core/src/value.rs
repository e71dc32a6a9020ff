use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing float values for equality.
pub const FLOAT_EQUALITY_TOLERANCE: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Gender {
    Masculine,
    Feminine,
    Neuter,
}

/// A dynamically typed dialogue value.
///
/// Exactly one payload is meaningful per variant. `Variable` carries a name
/// to be resolved against a scope later, never a literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Value {
    Text(String),
    Int(i32),
    Float(f32),
    Boolean(bool),
    Gender(Gender),
    Name(String),
    Variable(String),
    Empty,
}

impl Default for Value {
    fn default() -> Self {
        Self::Empty
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Gender(_) => "gender",
            Self::Name(_) => "name",
            Self::Variable(_) => "variable",
            Self::Empty => "empty",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Coerces to int, degrading to `0` on kind mismatch.
    pub fn as_int(&self) -> i32 {
        match self {
            Self::Int(value) => *value,
            Self::Float(value) => *value as i32,
            _ => 0,
        }
    }

    /// Coerces to float, widening ints, degrading to `0.0` on kind mismatch.
    pub fn as_float(&self) -> f32 {
        match self {
            Self::Int(value) => *value as f32,
            Self::Float(value) => *value,
            _ => 0.0,
        }
    }

    /// Coerces to boolean, degrading to `false` on kind mismatch.
    pub fn as_boolean(&self) -> bool {
        match self {
            Self::Boolean(value) => *value,
            _ => false,
        }
    }

    /// Coerces to text, degrading to the empty string on kind mismatch.
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text(value) => value.as_str(),
            Self::Name(value) => value.as_str(),
            _ => "",
        }
    }

    pub fn as_name(&self) -> &str {
        match self {
            Self::Name(value) => value.as_str(),
            Self::Text(value) => value.as_str(),
            _ => "",
        }
    }

    /// Coerces to gender, degrading to neuter on kind mismatch.
    pub fn as_gender(&self) -> Gender {
        match self {
            Self::Gender(value) => *value,
            _ => Gender::Neuter,
        }
    }
}

pub fn floats_almost_equal(left: f32, right: f32) -> bool {
    (left - right).abs() <= FLOAT_EQUALITY_TOLERANCE
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => floats_almost_equal(*left, *right),
            // Cross-kind numeric comparison widens to float.
            (Self::Int(left), Self::Float(right)) => floats_almost_equal(*left as f32, *right),
            (Self::Float(left), Self::Int(right)) => floats_almost_equal(*left, *right as f32),
            (Self::Text(left), Self::Text(right)) => left == right,
            (Self::Name(left), Self::Name(right)) => left.eq_ignore_ascii_case(right),
            (Self::Boolean(left), Self::Boolean(right)) => left == right,
            (Self::Gender(left), Self::Gender(right)) => left == right,
            (Self::Variable(left), Self::Variable(right)) => left == right,
            (Self::Empty, Self::Empty) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Boolean(value) => write!(f, "{}", value),
            Self::Gender(Gender::Masculine) => write!(f, "masculine"),
            Self::Gender(Gender::Feminine) => write!(f, "feminine"),
            Self::Gender(Gender::Neuter) => write!(f, "neuter"),
            Self::Name(value) => write!(f, "{}", value),
            Self::Variable(name) => write!(f, "{{{}}}", name),
            Self::Empty => Ok(()),
        }
    }
}
