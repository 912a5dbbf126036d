//! Boxed element representation shared by every list implementation.
//!
//! `Value` is what crosses the generic `CompactList` boundary when the caller
//! does not know the element kind statically. It lives on the stack; the
//! specialized lists never keep `Value`s in their buffers, only the unwrapped
//! scalars.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::ListError;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(Arc<str>),
}

impl Value {
    pub fn kind(&self) -> Option<ElementKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ElementKind::Bool),
            Value::Byte(_) => Some(ElementKind::Byte),
            Value::Short(_) => Some(ElementKind::Short),
            Value::Char(_) => Some(ElementKind::Char),
            Value::Int(_) => Some(ElementKind::Int),
            Value::Long(_) => Some(ElementKind::Long),
            Value::Float(_) => Some(ElementKind::Float),
            Value::Double(_) => Some(ElementKind::Double),
            Value::Text(_) => Some(ElementKind::Text),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().map_or("Null", ElementKind::wrapper_name)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v:?}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// Element kinds a caller can request a list for.
///
/// The eight scalar kinds may have a specialized implementation; `Text` and
/// `Any` are always served by the fallback list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Bool,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Text,
    Any,
}

impl ElementKind {
    pub const PRIMITIVES: [ElementKind; 8] = [
        ElementKind::Bool,
        ElementKind::Byte,
        ElementKind::Short,
        ElementKind::Char,
        ElementKind::Int,
        ElementKind::Long,
        ElementKind::Float,
        ElementKind::Double,
    ];

    pub fn is_primitive(self) -> bool {
        !matches!(self, ElementKind::Text | ElementKind::Any)
    }

    /// Name of the `Value` variant wrapping this kind.
    pub fn wrapper_name(self) -> &'static str {
        match self {
            ElementKind::Bool => "Bool",
            ElementKind::Byte => "Byte",
            ElementKind::Short => "Short",
            ElementKind::Char => "Char",
            ElementKind::Int => "Int",
            ElementKind::Long => "Long",
            ElementKind::Float => "Float",
            ElementKind::Double => "Double",
            ElementKind::Text => "Text",
            ElementKind::Any => "Any",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wrapper_name())
    }
}

/// Rust types that can be stored in a `CompactList`.
pub trait Element: Clone + 'static {
    const KIND: ElementKind;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, ListError>;
}

macro_rules! scalar_element {
    ($ty:ty, $kind:ident) => {
        impl Element for $ty {
            const KIND: ElementKind = ElementKind::$kind;

            fn into_value(self) -> Value {
                Value::$kind(self)
            }

            fn from_value(value: Value) -> Result<Self, ListError> {
                match value {
                    Value::$kind(v) => Ok(v),
                    Value::Null => Err(ListError::Null),
                    other => Err(ListError::Type {
                        expected: stringify!($kind),
                        found: other.type_name(),
                    }),
                }
            }
        }
    };
}

scalar_element!(bool, Bool);
scalar_element!(i8, Byte);
scalar_element!(i16, Short);
scalar_element!(char, Char);
scalar_element!(i32, Int);
scalar_element!(i64, Long);
scalar_element!(f32, Float);
scalar_element!(f64, Double);

impl Element for String {
    const KIND: ElementKind = ElementKind::Text;

    fn into_value(self) -> Value {
        Value::Text(self.into())
    }

    fn from_value(value: Value) -> Result<Self, ListError> {
        match value {
            Value::Text(v) => Ok(v.to_string()),
            Value::Null => Err(ListError::Null),
            other => Err(ListError::Type {
                expected: "Text",
                found: other.type_name(),
            }),
        }
    }
}

impl Element for Value {
    const KIND: ElementKind = ElementKind::Any;

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, ListError> {
        Ok(value)
    }
}
