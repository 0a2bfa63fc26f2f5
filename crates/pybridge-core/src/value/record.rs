//! Dataclass instances transferred by value.

use std::collections::HashMap;

use super::Primitive;
use crate::ConversionError;

/// A dataclass instance: a type tag plus ordered, named properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_name: String,
    prop_names: Vec<String>,
    props: HashMap<String, Primitive>,
}

impl Record {
    /// Create a record from `(name, value)` pairs in declaration order.
    ///
    /// A repeated name keeps its first position and its last value.
    #[must_use]
    pub fn new<I, S>(type_name: impl Into<String>, props: I) -> Self
    where
        I: IntoIterator<Item = (S, Primitive)>,
        S: Into<String>,
    {
        let mut prop_names = Vec::new();
        let mut map = HashMap::new();
        for (name, value) in props {
            let name = name.into();
            if map.insert(name.clone(), value).is_none() {
                prop_names.push(name);
            }
        }
        Self {
            type_name: type_name.into(),
            prop_names,
            props: map,
        }
    }

    /// Fully qualified type name, e.g. `__main__.Point`.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Property names in declaration order.
    pub fn prop_names(&self) -> impl Iterator<Item = &str> {
        self.prop_names.iter().map(String::as_str)
    }

    /// Properties in declaration order.
    pub fn props(&self) -> impl Iterator<Item = (&str, &Primitive)> {
        self.prop_names
            .iter()
            .filter_map(|name| self.props.get(name).map(|v| (name.as_str(), v)))
    }

    pub fn get(&self, name: &str) -> Result<&Primitive, ConversionError> {
        self.props.get(name).ok_or_else(|| self.not_found(name))
    }

    /// Overwrite an existing property. Unknown names are rejected.
    pub fn set(&mut self, name: &str, value: Primitive) -> Result<(), ConversionError> {
        match self.props.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(self.not_found(name)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prop_names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prop_names.is_empty()
    }

    fn not_found(&self, name: &str) -> ConversionError {
        ConversionError::NotFound {
            type_name: self.type_name.clone(),
            property: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Record {
        Record::new(
            "__main__.Point",
            [("x", Primitive::Int(1)), ("y", Primitive::Int(2))],
        )
    }

    #[test]
    fn test_props_keep_declaration_order() {
        let record = point();
        assert_eq!(record.prop_names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(record.type_name(), "__main__.Point");
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_get_and_set_known_property() {
        let mut record = point();
        record.set("y", Primitive::Float(2.5)).unwrap();
        assert_eq!(record.get("y").unwrap(), &Primitive::Float(2.5));
    }

    #[test]
    fn test_unknown_property_is_not_found() {
        let mut record = point();
        let err = record.get("z").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The property `z` does not exist in dataclass `__main__.Point`"
        );
        assert!(matches!(
            record.set("z", Primitive::None),
            Err(ConversionError::NotFound { .. })
        ));
    }
}
