//! Serde support for the wire encoding.
//!
//! Plain maps and sequences map onto `Map` and `List`. A map carrying the
//! reserved `___type` key is a set (with `___set`) or a dataclass (with
//! `___data` holding `[name, value]` pairs).

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::{DATA_KEY, PyMap, Primitive, Record, SET_KEY, TYPE_KEY};

/// Type tag written for sets.
const SET_TAG: &str = "set";

impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::None => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_bytes(b),
            Self::List(items) => serializer.collect_seq(items),
            Self::Set(set) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(TYPE_KEY, SET_TAG)?;
                map.serialize_entry(SET_KEY, set.as_slice())?;
                map.end()
            }
            Self::Map(entries) => serializer.collect_map(entries.iter()),
            Self::Record(record) => {
                let data: Vec<(&str, &Primitive)> = record.props().collect();
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(TYPE_KEY, record.type_name())?;
                map.serialize_entry(DATA_KEY, &data)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Primitive {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PrimitiveVisitor)
    }
}

struct PrimitiveVisitor;

impl<'de> Visitor<'de> for PrimitiveVisitor {
    type Value = Primitive;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an interpreter value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Primitive, E> {
        Ok(Primitive::None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Primitive, E> {
        Ok(Primitive::None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Primitive, D::Error> {
        Primitive::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Primitive, E> {
        Ok(Primitive::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Primitive, E> {
        Ok(Primitive::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Primitive, E> {
        i64::try_from(v)
            .map(Primitive::Int)
            .map_err(|_| E::custom(format!("integer {v} does not fit in 64 signed bits")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Primitive, E> {
        Ok(Primitive::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Primitive, E> {
        Ok(Primitive::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Primitive, E> {
        Ok(Primitive::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Primitive, E> {
        Ok(Primitive::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Primitive, E> {
        Ok(Primitive::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Primitive, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element::<Primitive>()? {
            items.push(item);
        }
        Ok(Primitive::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Primitive, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0).min(1024));
        while let Some(entry) = access.next_entry::<Primitive, Primitive>()? {
            entries.push(entry);
        }
        from_wire_entries(entries).map_err(de::Error::custom)
    }
}

fn take(entries: &mut Vec<(Primitive, Primitive)>, key: &str) -> Option<Primitive> {
    let position = entries.iter().position(|(k, _)| k.as_str() == Some(key))?;
    Some(entries.swap_remove(position).1)
}

fn from_wire_entries(mut entries: Vec<(Primitive, Primitive)>) -> Result<Primitive, String> {
    let Some(tag) = take(&mut entries, TYPE_KEY) else {
        return Ok(Primitive::Map(entries.into_iter().collect::<PyMap>()));
    };

    if let Some(items) = take(&mut entries, SET_KEY) {
        return match items {
            Primitive::List(items) => Ok(Primitive::Set(items.into_iter().collect())),
            other => Err(format!("set payload must be a list, got {}", other.type_name())),
        };
    }

    let Primitive::Str(type_name) = tag else {
        return Err(format!("type tag must be a string, got {}", tag.type_name()));
    };
    let data = match take(&mut entries, DATA_KEY) {
        Some(Primitive::List(data)) => data,
        Some(other) => {
            return Err(format!(
                "dataclass payload must be a list, got {}",
                other.type_name()
            ));
        }
        None => Vec::new(),
    };

    let mut props = Vec::with_capacity(data.len());
    for pair in data {
        match pair {
            Primitive::List(mut pair) if pair.len() == 2 => {
                let value = pair.pop().unwrap_or_default();
                let name = pair.pop().unwrap_or_default();
                let Primitive::Str(name) = name else {
                    return Err(format!(
                        "dataclass property name must be a string in `{type_name}`"
                    ));
                };
                props.push((name, value));
            }
            _ => return Err(format!("malformed dataclass property in `{type_name}`")),
        }
    }
    Ok(Primitive::Record(Record::new(type_name, props)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PySet;

    fn s(v: &str) -> Primitive {
        Primitive::Str(v.to_string())
    }

    fn encode_map(entries: Vec<(Primitive, Primitive)>) -> Vec<u8> {
        let map: PyMap = entries.into_iter().collect();
        rmp_serde::to_vec(&Primitive::Map(map)).unwrap()
    }

    #[test]
    fn test_typed_set_map_decodes_as_set() {
        let bytes = encode_map(vec![
            (s(TYPE_KEY), s("set")),
            (s(SET_KEY), Primitive::List(vec![s("x"), s("y")])),
        ]);
        let decoded: Primitive = rmp_serde::from_slice(&bytes).unwrap();
        let expected: PySet = [s("y"), s("x")].into_iter().collect();
        assert_eq!(decoded, Primitive::Set(expected));
    }

    #[test]
    fn test_typed_data_map_decodes_as_record() {
        let bytes = encode_map(vec![
            (s(TYPE_KEY), s("__main__.Point")),
            (
                s(DATA_KEY),
                Primitive::List(vec![
                    Primitive::List(vec![s("x"), Primitive::Int(1)]),
                    Primitive::List(vec![s("y"), Primitive::Float(2.5)]),
                ]),
            ),
        ]);
        let decoded: Primitive = rmp_serde::from_slice(&bytes).unwrap();
        let record = decoded.as_record().unwrap();
        assert_eq!(record.type_name(), "__main__.Point");
        assert_eq!(record.prop_names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(record.get("y").unwrap(), &Primitive::Float(2.5));
    }

    #[test]
    fn test_plain_map_with_float_keys() {
        let bytes = encode_map(vec![(Primitive::Float(-7.6), s("v"))]);
        let decoded: Primitive = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded.item(&Primitive::Float(-7.6)).unwrap(), &s("v"));
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        let bytes = encode_map(vec![
            (s(TYPE_KEY), s("Point")),
            (s(DATA_KEY), Primitive::List(vec![Primitive::Int(1)])),
        ]);
        assert!(rmp_serde::from_slice::<Primitive>(&bytes).is_err());
    }

    #[test]
    fn test_nested_value_survives_encoding() {
        let set: PySet = [s("x"), s("y")].into_iter().collect();
        let mut inner = PyMap::new();
        inner.insert(Primitive::Float(-7.6), Primitive::Set(set));
        let value = Primitive::List(vec![
            Primitive::Int(1),
            Primitive::Bytes(vec![0, 1, 2]),
            Primitive::Map(inner),
            Primitive::Record(Record::new("Point", [("x", Primitive::None)])),
        ]);
        let bytes = rmp_serde::to_vec(&value).unwrap();
        let decoded: Primitive = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_json_numbers_decode() {
        let decoded: Primitive = serde_json::from_str("[1, -2, 3.5, null, true]").unwrap();
        assert_eq!(
            decoded,
            Primitive::List(vec![
                Primitive::Int(1),
                Primitive::Int(-2),
                Primitive::Float(3.5),
                Primitive::None,
                Primitive::Bool(true),
            ])
        );
    }
}
