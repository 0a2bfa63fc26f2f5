//! Conversions between Rust types and `Primitive`.
//!
//! Every `Primitive` shape has a conversion in both directions; the
//! `tests::test_every_shape_converts_both_ways` test keeps them in step.

use crate::{ConversionError, PyMap, PySet, Primitive, Record};

/// Conversion of a host value into an interpreter value.
pub trait IntoPrimitive {
    fn into_primitive(self) -> Result<Primitive, ConversionError>;
}

/// Conversion of an interpreter value into a host value.
pub trait FromPrimitive: Sized {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError>;
}

macro_rules! small_int_conversions {
    ($($t:ty),* $(,)?) => {$(
        impl IntoPrimitive for $t {
            fn into_primitive(self) -> Result<Primitive, ConversionError> {
                Ok(Primitive::Int(i64::from(self)))
            }
        }
    )*};
}

small_int_conversions!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_conversions {
    ($($t:ty),* $(,)?) => {$(
        impl IntoPrimitive for $t {
            fn into_primitive(self) -> Result<Primitive, ConversionError> {
                i64::try_from(self)
                    .map(Primitive::Int)
                    .map_err(|_| ConversionError::OutOfRange {
                        value: self.to_string(),
                        to: "int",
                    })
            }
        }
    )*};
}

wide_int_conversions!(u64, usize, isize, i128, u128);

macro_rules! int_from_primitive {
    ($($t:ty),* $(,)?) => {$(
        impl FromPrimitive for $t {
            fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
                match value {
                    Primitive::Int(i) => <$t>::try_from(*i).map_err(|_| ConversionError::OutOfRange {
                        value: i.to_string(),
                        to: stringify!($t),
                    }),
                    other => Err(ConversionError::cast(other.type_name(), stringify!($t))),
                }
            }
        }
    )*};
}

int_from_primitive!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, i128, u128);

impl IntoPrimitive for f64 {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Float(self))
    }
}

impl IntoPrimitive for f32 {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Float(f64::from(self)))
    }
}

impl FromPrimitive for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::Float(f) => Ok(*f),
            Primitive::Int(i) => Ok(*i as Self),
            other => Err(ConversionError::cast(other.type_name(), "f64")),
        }
    }
}

impl FromPrimitive for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        f64::from_primitive(value)
            .map(|f| f as Self)
            .map_err(|_| ConversionError::cast(value.type_name(), "f32"))
    }
}

impl IntoPrimitive for bool {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Bool(self))
    }
}

impl FromPrimitive for bool {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::Bool(b) => Ok(*b),
            other => Err(ConversionError::cast(other.type_name(), "bool")),
        }
    }
}

impl IntoPrimitive for String {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Str(self))
    }
}

impl IntoPrimitive for &str {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Str(self.to_string()))
    }
}

impl FromPrimitive for String {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::Str(s) => Ok(s.clone()),
            other => Err(ConversionError::cast(other.type_name(), "String")),
        }
    }
}

impl IntoPrimitive for Vec<u8> {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Bytes(self))
    }
}

impl IntoPrimitive for &[u8] {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Bytes(self.to_vec()))
    }
}

impl FromPrimitive for Vec<u8> {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::Bytes(b) => Ok(b.clone()),
            other => Err(ConversionError::cast(other.type_name(), "bytes")),
        }
    }
}

impl IntoPrimitive for Vec<Primitive> {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::List(self))
    }
}

impl FromPrimitive for Vec<Primitive> {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::List(items) => Ok(items.clone()),
            other => Err(ConversionError::cast(other.type_name(), "list")),
        }
    }
}

impl IntoPrimitive for PySet {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        if let Some(bad) = self.iter().find(|item| !item.is_hashable()) {
            return Err(ConversionError::Unconvertible(format!(
                "unhashable set member of type `{}`",
                bad.type_name()
            )));
        }
        Ok(Primitive::Set(self))
    }
}

impl FromPrimitive for PySet {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::Set(set) => Ok(set.clone()),
            other => Err(ConversionError::cast(other.type_name(), "set")),
        }
    }
}

impl IntoPrimitive for PyMap {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        if let Some(bad) = self.keys().find(|key| !key.is_hashable()) {
            return Err(ConversionError::Unconvertible(format!(
                "unhashable dict key of type `{}`",
                bad.type_name()
            )));
        }
        Ok(Primitive::Map(self))
    }
}

impl FromPrimitive for PyMap {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::Map(map) => Ok(map.clone()),
            other => Err(ConversionError::cast(other.type_name(), "dict")),
        }
    }
}

impl IntoPrimitive for Record {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::Record(self))
    }
}

impl FromPrimitive for Record {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::Record(record) => Ok(record.clone()),
            other => Err(ConversionError::cast(other.type_name(), "dataclass")),
        }
    }
}

impl IntoPrimitive for Primitive {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(self)
    }
}

impl FromPrimitive for Primitive {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl IntoPrimitive for () {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        Ok(Primitive::None)
    }
}

impl FromPrimitive for () {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::None => Ok(()),
            other => Err(ConversionError::cast(other.type_name(), "None")),
        }
    }
}

impl<T: IntoPrimitive> IntoPrimitive for Option<T> {
    fn into_primitive(self) -> Result<Primitive, ConversionError> {
        self.map_or(Ok(Primitive::None), IntoPrimitive::into_primitive)
    }
}

impl<T: FromPrimitive> FromPrimitive for Option<T> {
    fn from_primitive(value: &Primitive) -> Result<Self, ConversionError> {
        match value {
            Primitive::None => Ok(None),
            other => T::from_primitive(other).map(Some),
        }
    }
}

macro_rules! primitive_from {
    ($($t:ty => |$v:ident| $e:expr),* $(,)?) => {$(
        impl From<$t> for Primitive {
            fn from($v: $t) -> Self {
                $e
            }
        }
    )*};
}

primitive_from!(
    bool => |v| Self::Bool(v),
    i8 => |v| Self::Int(i64::from(v)),
    i16 => |v| Self::Int(i64::from(v)),
    i32 => |v| Self::Int(i64::from(v)),
    i64 => |v| Self::Int(v),
    u8 => |v| Self::Int(i64::from(v)),
    u16 => |v| Self::Int(i64::from(v)),
    u32 => |v| Self::Int(i64::from(v)),
    f32 => |v| Self::Float(f64::from(v)),
    f64 => |v| Self::Float(v),
    String => |v| Self::Str(v),
    &str => |v| Self::Str(v.to_string()),
    Vec<u8> => |v| Self::Bytes(v),
    &[u8] => |v| Self::Bytes(v.to_vec()),
    Vec<Primitive> => |v| Self::List(v),
    Record => |v| Self::Record(v),
    () => |_v| Self::None,
);
