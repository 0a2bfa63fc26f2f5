//! Conversions between `Value` and host types.

use pybridge_core::{ConversionError, IntoPrimitive, PyMap, PySet, Primitive};

use super::{Value, common_session};
use crate::error::SessionError;

impl Value {
    /// A detached resolved value from any convertible host value.
    ///
    /// # Errors
    /// Returns the conversion error of `value`.
    pub fn convert(value: impl IntoPrimitive) -> Result<Self, ConversionError> {
        Ok(Self::literal(value.into_primitive()?))
    }

    /// A resolved list of the given values, each evaluated first.
    ///
    /// # Errors
    /// Returns `CrossSession` or the errors of evaluating an element.
    pub async fn list(values: &[Self]) -> Result<Self, SessionError> {
        let session = common_session(values)?;
        let mut items = Vec::with_capacity(values.len());
        for value in values {
            items.push(value.resolve().await?);
        }
        Ok(Self::resolved(session, Primitive::List(items)))
    }

    /// A resolved set of the given values, each evaluated first.
    ///
    /// # Errors
    /// Returns `Conversion` if an element is unhashable, `CrossSession`, or
    /// the errors of evaluating an element.
    pub async fn set(values: &[Self]) -> Result<Self, SessionError> {
        let session = common_session(values)?;
        let mut set = PySet::new();
        for value in values {
            set.insert(hashable(value.resolve().await?)?);
        }
        Ok(Self::resolved(session, Primitive::Set(set)))
    }

    /// A resolved dict of the given pairs, keys and values evaluated first.
    ///
    /// # Errors
    /// Returns `Conversion` if a key is unhashable, `CrossSession`, or the
    /// errors of evaluating a key or value.
    pub async fn map(pairs: &[(Self, Self)]) -> Result<Self, SessionError> {
        let session = common_session(pairs.iter().flat_map(|(k, v)| [k, v]))?;
        let mut map = PyMap::new();
        for (key, value) in pairs {
            map.insert(hashable(key.resolve().await?)?, value.resolve().await?);
        }
        Ok(Self::resolved(session, Primitive::Map(map)))
    }

    /// Elements of a list or set, each as its own resolved value.
    ///
    /// # Errors
    /// Returns `Conversion` if the value is not a list or set, or the errors
    /// of the evaluation.
    pub async fn to_values(&self) -> Result<Vec<Self>, SessionError> {
        let items = match self.resolve().await? {
            Primitive::List(items) => items,
            Primitive::Set(set) => set.into_iter().collect(),
            other => {
                return Err(ConversionError::InvalidCast {
                    from: other.type_name(),
                    to: "list",
                }
                .into());
            }
        };
        Ok(items
            .into_iter()
            .map(|item| Self::resolved(self.session.clone(), item))
            .collect())
    }

    /// Entries of a dict, keys and values each as their own resolved value.
    ///
    /// # Errors
    /// Returns `Conversion` if the value is not a dict, or the errors of the
    /// evaluation.
    pub async fn to_value_pairs(&self) -> Result<Vec<(Self, Self)>, SessionError> {
        let map = match self.resolve().await? {
            Primitive::Map(map) => map,
            other => {
                return Err(ConversionError::InvalidCast {
                    from: other.type_name(),
                    to: "dict",
                }
                .into());
            }
        };
        Ok(map
            .into_iter()
            .map(|(k, v)| {
                (
                    Self::resolved(self.session.clone(), k),
                    Self::resolved(self.session.clone(), v),
                )
            })
            .collect())
    }
}

fn hashable(value: Primitive) -> Result<Primitive, ConversionError> {
    if value.is_hashable() {
        Ok(value)
    } else {
        Err(ConversionError::Unconvertible(format!(
            "unhashable set member or dict key of type `{}`",
            value.type_name()
        )))
    }
}
