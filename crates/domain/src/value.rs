//! Values held by an execution context.
//!
//! Triggers store plain scalars (names, counts, timestamps) alongside
//! opaque references to host objects such as the intercepted connection
//! attempt. Objects implement [`VariableSource`] so dotted paths like
//! `connection.player.name` can walk into them, and actions can downcast
//! them back to their concrete type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A host object that can be stored in a context and addressed by path.
pub trait VariableSource: Any + Send + Sync + fmt::Debug {
    /// Look up a named field of this object.
    fn field(&self, name: &str) -> Option<Value>;

    /// Text used when the object itself is interpolated into a template.
    fn render(&self) -> String;
}

/// A dynamically typed context value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(Arc<dyn VariableSource>),
}

impl Value {
    /// Wrap a shared host object.
    #[must_use]
    pub fn object<T: VariableSource>(object: Arc<T>) -> Self {
        Self::Object(object)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the inner string of a [`Value::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; strings are parsed, floats are truncated.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view; strings are parsed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Walk one step into an object or a list.
    ///
    /// Lists answer `length` and numeric indexes.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Self::Object(object) => object.field(name),
            Self::List(items) => match name {
                "length" | "size" => Some(Value::from(items.len())),
                index => index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned()),
            },
            _ => None,
        }
    }

    /// Recover the concrete type of an object value.
    #[must_use]
    pub fn downcast<T: VariableSource>(&self) -> Option<Arc<T>> {
        match self {
            Self::Object(object) => {
                let any = object.clone() as Arc<dyn Any + Send + Sync>;
                any.downcast::<T>().ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Object(object) => f.write_str(&object.render()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Badge {
        name: String,
    }

    impl VariableSource for Badge {
        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "name" => Some(Value::from(self.name.as_str())),
                _ => None,
            }
        }

        fn render(&self) -> String {
            format!("badge:{}", self.name)
        }
    }

    #[test]
    fn should_render_scalars_as_plain_text() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(42_i64).to_string(), "42");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from("lobby").to_string(), "lobby");
    }

    #[test]
    fn should_render_list_as_comma_separated_items() {
        let list = Value::from(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(list.to_string(), "a, b");
    }

    #[test]
    fn should_walk_into_object_fields() {
        let value = Value::object(Arc::new(Badge {
            name: "alex".to_string(),
        }));
        assert_eq!(value.field("name"), Some(Value::from("alex")));
        assert_eq!(value.field("missing"), None);
        assert_eq!(value.to_string(), "badge:alex");
    }

    #[test]
    fn should_downcast_object_to_concrete_type() {
        let badge = Arc::new(Badge {
            name: "alex".to_string(),
        });
        let value = Value::object(Arc::clone(&badge));
        let recovered = value.downcast::<Badge>().unwrap();
        assert!(Arc::ptr_eq(&badge, &recovered));
        assert!(Value::from("x").downcast::<Badge>().is_none());
    }

    #[test]
    fn should_expose_list_length_and_index() {
        let list = Value::from(vec![Value::from(1_i64), Value::from(2_i64)]);
        assert_eq!(list.field("length"), Some(Value::Int(2)));
        assert_eq!(list.field("1"), Some(Value::Int(2)));
        assert_eq!(list.field("5"), None);
    }

    #[test]
    fn should_parse_numbers_from_strings() {
        assert_eq!(Value::from(" 12 ").as_i64(), Some(12));
        assert_eq!(Value::from("1.5").as_f64(), Some(1.5));
        assert_eq!(Value::from("abc").as_i64(), None);
    }

    #[test]
    fn should_map_none_to_null() {
        assert!(Value::from(None::<String>).is_null());
    }
}
