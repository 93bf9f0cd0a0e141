//! Known constant values carried by abstract items.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A literal whose value is known exactly at a program point.
///
/// Array lengths are stored as [`Constant::Int`]: an array item whose
/// constant is known describes the array's length, not its contents.
/// A class constant stores the slashed class name.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Rc<str>),
    Class(String),
}

impl Constant {
    /// Interprets the constant as an `i32`, truncating wider numerics.
    ///
    /// Non-numeric constants have no integer interpretation.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Long(v) => Some(*v as i32),
            Self::Float(v) => Some(*v as i32),
            Self::Double(v) => Some(*v as i32),
            Self::Str(_) | Self::Class(_) => None,
        }
    }

    /// Interprets the constant as an `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            Self::Double(v) => Some(*v as i64),
            Self::Str(_) | Self::Class(_) => None,
        }
    }

    /// Interprets the constant as an `f32`.
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Int(v) => Some(*v as f32),
            Self::Long(v) => Some(*v as f32),
            Self::Float(v) => Some(*v),
            Self::Double(v) => Some(*v as f32),
            Self::Str(_) | Self::Class(_) => None,
        }
    }

    /// Interprets the constant as an `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(f64::from(*v)),
            Self::Long(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::Str(_) | Self::Class(_) => None,
        }
    }

    /// Gets the string payload, if this is a string constant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Checks whether the constant is a numeric zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Int(v) => *v == 0,
            Self::Long(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            Self::Double(v) => *v == 0.0,
            Self::Str(_) | Self::Class(_) => false,
        }
    }

    /// Checks whether the constant is numeric at all.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Str(_) | Self::Class(_))
    }

    /// Renders the constant the way string concatenation at runtime would.
    #[must_use]
    pub fn concat_text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Str(s) => s.to_string(),
            Self::Class(c) => c.clone(),
        }
    }

    /// Converts the constant for a value reinterpreted under `signature`,
    /// applying the matching numeric truncation or widening.
    ///
    /// Constants of non-numeric payloads are passed through untouched.
    #[must_use]
    pub fn converted_to(&self, signature: &str) -> Self {
        if !self.is_numeric() {
            return self.clone();
        }
        match signature {
            "Z" | "Ljava/lang/Boolean;" => {
                Self::Int(i32::from(self.as_i32().is_some_and(|v| v != 0)))
            }
            "B" | "Ljava/lang/Byte;" => Self::Int(self.as_i32().unwrap_or(0) as i8 as i32),
            "S" | "Ljava/lang/Short;" => Self::Int(self.as_i32().unwrap_or(0) as i16 as i32),
            "C" | "Ljava/lang/Character;" => {
                Self::Int(self.as_i32().unwrap_or(0) as u16 as i32)
            }
            "I" | "Ljava/lang/Integer;" => Self::Int(self.as_i32().unwrap_or(0)),
            "J" | "Ljava/lang/Long;" => Self::Long(self.as_i64().unwrap_or(0)),
            "F" | "Ljava/lang/Float;" => Self::Float(self.as_f32().unwrap_or(0.0)),
            "D" | "Ljava/lang/Double;" => Self::Double(self.as_f64().unwrap_or(0.0)),
            _ => self.clone(),
        }
    }
}

/// Equality is structural, with floating-point payloads compared by their
/// bit patterns so that merging remains well behaved near NaN.
impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Class(a), Self::Class(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Class(c) => write!(f, "{c}.class"),
        }
    }
}

impl From<i32> for Constant {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f32> for Constant {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}
