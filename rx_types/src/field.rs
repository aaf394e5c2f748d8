use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Optional payload value that keeps "absent" apart from "explicitly null"
///
/// `null` is a meaningful value for many API fields (clearing a nickname, removing a
/// timeout), so a plain `Option` would lose the difference between "leave unchanged"
/// and "reset". Struct fields using this type should carry
/// `#[serde(default, skip_serializing_if = "Field::is_missing")]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Field<T> {
    /// Not present in the payload
    #[default]
    Missing,
    /// Present and set to `null`
    Null,
    /// Present with a value
    Value(T),
}

impl<T> Field<T> {
    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    #[inline]
    pub fn is_value(&self) -> bool {
        matches!(self, Field::Value(_))
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Missing => Field::Missing,
            Field::Null => Field::Null,
            Field::Value(value) => Field::Value(value),
        }
    }

    /// Collapse to an `Option`, discarding the absent/null distinction
    pub fn value(self) -> Option<T> {
        match self {
            Field::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Missing => Field::Missing,
            Field::Null => Field::Null,
            Field::Value(value) => Field::Value(f(value)),
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Field::Value(value),
            None => Field::Null,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(value) => serializer.serialize_some(value),
            // Missing only reaches here when the skip attribute was forgotten
            Field::Missing | Field::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}
