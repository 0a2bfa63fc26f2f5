//! Host-local representation of interpreter values.
//!
//! A `Primitive` is what arrives over the wire once a value has been fully
//! transferred: scalars, byte strings, and the container shapes the
//! interpreter side knows how to pack (lists, sets, dicts and dataclasses).

mod collections;
mod literal;
mod record;
mod wire;

use std::cmp::Ordering;

pub use collections::{PyMap, PySet};
pub use record::Record;

use crate::{ConversionError, FromPrimitive};

/// Reserved key marking a typed map on the wire.
pub const TYPE_KEY: &str = "___type";
/// Reserved key holding the elements of a set.
pub const SET_KEY: &str = "___set";
/// Reserved key holding the `[name, value]` pairs of a dataclass.
pub const DATA_KEY: &str = "___data";

/// A fully transferred interpreter value.
#[derive(Debug, Clone, Default)]
pub enum Primitive {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Primitive>),
    Set(PySet),
    Map(PyMap),
    Record(Record),
}

impl Primitive {
    /// Interpreter-side type name of this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "dict",
            Self::Record(_) => "dataclass",
        }
    }

    /// Whether the value can be used as a set member or dict key.
    ///
    /// Lists qualify when their elements do; they are rendered as tuples in
    /// that position.
    #[must_use]
    pub fn is_hashable(&self) -> bool {
        match self {
            Self::None
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::Bytes(_) => true,
            Self::List(items) => items.iter().all(Self::is_hashable),
            Self::Set(_) | Self::Map(_) | Self::Record(_) => false,
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Look up an element locally, the way `value[key]` would remotely.
    ///
    /// Lists accept integer indices (negative indices count from the end),
    /// dicts accept any key.
    pub fn item(&self, key: &Self) -> Result<&Self, ConversionError> {
        match (self, key) {
            (Self::List(items), Self::Int(index)) => {
                list_position(items.len(), *index)
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| ConversionError::OutOfRange {
                        value: index.to_string(),
                        to: "list index",
                    })
            }
            (Self::Map(map), _) => map.get(key).ok_or_else(|| ConversionError::NotFound {
                type_name: "dict".to_string(),
                property: key.to_string(),
            }),
            (Self::Record(record), Self::Str(name)) => record.get(name),
            _ => Err(ConversionError::cast(self.type_name(), "subscriptable")),
        }
    }

    /// Assign an element locally, the way `value[key] = item` would remotely.
    pub fn set_item(&mut self, key: Self, item: Self) -> Result<(), ConversionError> {
        match (self, key) {
            (Self::List(items), Self::Int(index)) => {
                let len = items.len();
                let slot = list_position(len, index)
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| ConversionError::OutOfRange {
                        value: index.to_string(),
                        to: "list index",
                    })?;
                *slot = item;
                Ok(())
            }
            (Self::Map(map), key) => {
                if !key.is_hashable() {
                    return Err(ConversionError::Unconvertible(format!(
                        "unhashable dict key of type `{}`",
                        key.type_name()
                    )));
                }
                map.insert(key, item);
                Ok(())
            }
            (target, _) => Err(ConversionError::cast(target.type_name(), "item-assignable")),
        }
    }

    /// Convert every element of a list.
    pub fn to_vec<T: FromPrimitive>(&self) -> Result<Vec<T>, ConversionError> {
        match self {
            Self::List(items) => items.iter().map(T::from_primitive).collect(),
            other => Err(ConversionError::cast(other.type_name(), "list")),
        }
    }
}

fn list_position(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let position = if index < 0 { len + index } else { index };
    if (0..len).contains(&position) {
        usize::try_from(position).ok()
    } else {
        None
    }
}

#[allow(clippy::cast_precision_loss)]
fn int_as_float(i: i64) -> f64 {
    i as f64
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(i), Self::Float(f)) | (Self::Float(f), Self::Int(i)) => {
                int_as_float(*i) == *f
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Primitive {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => int_as_float(*a).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&int_as_float(*b)),
            (Self::Str(a), Self::Str(b)) => a.partial_cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.partial_cmp(b),
            (Self::List(a), Self::List(b)) => a.partial_cmp(b),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_crosses_int_and_float() {
        assert_eq!(Primitive::Int(3), Primitive::Float(3.0));
        assert_ne!(Primitive::Int(3), Primitive::Float(3.5));
        assert_ne!(Primitive::Bool(true), Primitive::Int(1));
    }

    #[test]
    fn test_ordering_requires_comparable_shapes() {
        assert!(Primitive::Int(1) < Primitive::Float(1.5));
        assert!(Primitive::Str("a".into()) < Primitive::Str("b".into()));
        assert_eq!(
            Primitive::Str("a".into()).partial_cmp(&Primitive::Int(1)),
            None
        );
        assert_eq!(
            Primitive::None.partial_cmp(&Primitive::None),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_item_lookup_on_list_and_map() {
        let mut map = PyMap::new();
        map.insert(Primitive::Float(-7.6), Primitive::Str("x".into()));
        let value = Primitive::List(vec![
            Primitive::Int(1),
            Primitive::Int(2),
            Primitive::Map(map),
        ]);

        let inner = value.item(&Primitive::Int(-1)).unwrap();
        assert_eq!(
            inner.item(&Primitive::Float(-7.6)).unwrap(),
            &Primitive::Str("x".into())
        );
        assert!(matches!(
            value.item(&Primitive::Int(3)),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(matches!(
            inner.item(&Primitive::Int(0)),
            Err(ConversionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_set_item_mutates_in_place() {
        let mut value = Primitive::List(vec![Primitive::Int(1), Primitive::Int(2)]);
        value
            .set_item(Primitive::Int(0), Primitive::Str("a".into()))
            .unwrap();
        assert_eq!(value.item(&Primitive::Int(0)).unwrap().as_str(), Some("a"));

        let mut map = Primitive::Map(PyMap::new());
        assert!(map
            .set_item(Primitive::List(vec![]), Primitive::Int(1))
            .is_ok());
        assert!(matches!(
            map.set_item(Primitive::Map(PyMap::new()), Primitive::Int(1)),
            Err(ConversionError::Unconvertible(_))
        ));
        assert!(Primitive::Int(1)
            .set_item(Primitive::Int(0), Primitive::None)
            .is_err());
    }

    #[test]
    fn test_to_vec_converts_each_element() {
        let value = Primitive::List(vec![Primitive::Int(1), Primitive::Int(2)]);
        let ints: Vec<u8> = value.to_vec().unwrap();
        assert_eq!(ints, vec![1, 2]);
        let floats: Vec<f64> = value.to_vec().unwrap();
        assert_eq!(floats, vec![1.0, 2.0]);
        assert!(Primitive::Int(1).to_vec::<i64>().is_err());
    }
}
