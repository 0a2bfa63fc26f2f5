//! Set and dict shapes keyed by structural equality.
//!
//! Interpreter keys include floats, so neither container can lean on `Hash`;
//! both keep insertion order and compare elements with `Primitive::eq`.

use super::Primitive;

/// An unordered collection of distinct values.
#[derive(Debug, Clone, Default)]
pub struct PySet {
    items: Vec<Primitive>,
}

impl PySet {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Insert a value; returns `false` if an equal value was already present.
    pub fn insert(&mut self, item: Primitive) -> bool {
        if self.contains(&item) {
            false
        } else {
            self.items.push(item);
            true
        }
    }

    #[must_use]
    pub fn contains(&self, item: &Primitive) -> bool {
        self.items.iter().any(|existing| existing == item)
    }

    /// Remove a value; returns whether it was present.
    pub fn remove(&mut self, item: &Primitive) -> bool {
        let before = self.items.len();
        self.items.retain(|existing| existing != item);
        self.items.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Primitive> {
        self.items.iter()
    }

    pub(crate) fn as_slice(&self) -> &[Primitive] {
        &self.items
    }
}

impl PartialEq for PySet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.items.iter().all(|item| other.contains(item))
    }
}

impl FromIterator<Primitive> for PySet {
    fn from_iter<I: IntoIterator<Item = Primitive>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl IntoIterator for PySet {
    type Item = Primitive;
    type IntoIter = std::vec::IntoIter<Primitive>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a PySet {
    type Item = &'a Primitive;
    type IntoIter = std::slice::Iter<'a, Primitive>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// An insertion-ordered mapping.
#[derive(Debug, Clone, Default)]
pub struct PyMap {
    entries: Vec<(Primitive, Primitive)>,
}

impl PyMap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &Primitive) -> Option<&Primitive> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &Primitive) -> Option<&mut Primitive> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains_key(&self, key: &Primitive) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite; returns the previous value for the key.
    pub fn insert(&mut self, key: Primitive, value: Primitive) -> Option<Primitive> {
        if let Some(slot) = self.get_mut(&key) {
            Some(std::mem::replace(slot, value))
        } else {
            self.entries.push((key, value));
            None
        }
    }

    pub fn remove(&mut self, key: &Primitive) -> Option<Primitive> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Primitive, &Primitive)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Primitive> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Primitive> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl PartialEq for PyMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromIterator<(Primitive, Primitive)> for PyMap {
    fn from_iter<I: IntoIterator<Item = (Primitive, Primitive)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl IntoIterator for PyMap {
    type Item = (Primitive, Primitive);
    type IntoIter = std::vec::IntoIter<(Primitive, Primitive)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
