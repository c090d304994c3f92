/// A fixed-capacity arena handing out generation-checked keys.
///
/// A slotmap provides a `Vec`-like interface where each entry is associated with a stable
/// index-like key. Lookup with the key detects if an entry has been removed, even if the slot
/// where it was previously stored has since been reused for another element. This is what makes
/// it safe to keep a key around in a timer or a parent back-reference after the record it named
/// was freed.
///
/// ## Usage
///
/// ```
/// # use tinynet::managed::SlotMap;
/// let mut map = SlotMap::with_capacity(2);
/// let index = map.insert(42).unwrap();
/// assert_eq!(map.get(index).cloned(), Some(42));
/// assert_eq!(map.remove(index), Some(42));
/// assert_eq!(map.get(index), None);
/// ```
pub struct SlotMap<T> {
    slots: Vec<Slot<T>>,
    /// Indices of unused slots, the next one to reuse on top.
    free: Vec<usize>,
    generation: Generation,
}

struct Slot<T> {
    generation: Generation,
    element: Option<T>,
}

/// An index into a slotmap.
///
/// The index remains valid until the entry is removed. Accessing the slotmap with the index after
/// the entry was removed will fail, even if the index where the element was previously stored has
/// been reused for another element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    idx: usize,
    generation: Generation,
}

/// The generation counter.
///
/// Has strictly positive values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Generation(u32);

impl<T> SlotMap<T> {
    /// Create an arena that holds at most `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot { generation: Generation::default(), element: None })
            .collect();
        SlotMap {
            slots,
            // Hand out low indices first.
            free: (0..capacity).rev().collect(),
            generation: Generation::default(),
        }
    }

    /// Retrieve a value by index.
    pub fn get(&self, index: Key) -> Option<&T> {
        let slot = self.slots.get(index.idx)?;
        if slot.generation != index.generation {
            return None;
        }
        slot.element.as_ref()
    }

    /// Retrieve a mutable value by index.
    pub fn get_mut(&mut self, index: Key) -> Option<&mut T> {
        let slot = self.slots.get_mut(index.idx)?;
        if slot.generation != index.generation {
            return None;
        }
        slot.element.as_mut()
    }

    /// Check whether the key still refers to a live element.
    pub fn contains(&self, index: Key) -> bool {
        self.get(index).is_some()
    }

    /// Insert a value, returning `None` when every slot is taken.
    pub fn insert(&mut self, value: T) -> Option<Key> {
        self.insert_with(|_| value)
    }

    /// Insert a value constructed with knowledge of its own key.
    pub fn insert_with(&mut self, init: impl FnOnce(Key) -> T) -> Option<Key> {
        let idx = self.free.pop()?;
        let key = Key { idx, generation: self.generation };
        self.generation.advance();

        let slot = &mut self.slots[idx];
        slot.generation = key.generation;
        slot.element = Some(init(key));
        Some(key)
    }

    /// Remove an element.
    ///
    /// Returns `None` if the provided index did not refer to a live element.
    pub fn remove(&mut self, index: Key) -> Option<T> {
        let slot = self.slots.get_mut(index.idx)?;
        if slot.generation != index.generation {
            return None;
        }
        let element = slot.element.take()?;
        self.free.push(index.idx);
        Some(element)
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Keys of all live elements in slot order.
    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Iterate over live elements in slot order.
    pub fn iter(&self) -> impl Iterator<Item=(Key, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            let key = Key { idx, generation: slot.generation };
            slot.element.as_ref().map(|element| (key, element))
        })
    }

    /// Iterate mutably over live elements in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item=(Key, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| {
            let key = Key { idx, generation: slot.generation };
            slot.element.as_mut().map(|element| (key, element))
        })
    }
}

impl Key {
    /// The slot position, stable across generations.
    pub fn index(&self) -> usize {
        self.idx
    }
}

impl Generation {
    fn advance(&mut self) {
        assert!(self.0 > 0);
        self.0 = self.0.wrapping_add(1).max(1)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        let mut map = SlotMap::with_capacity(2);
        let key42 = map.insert(42).unwrap();
        let keylo = map.insert('K' as u32).unwrap();

        assert_eq!(map.insert(0x9999), None);
        assert!(map.is_full());
        assert_eq!(map.get(key42).cloned(), Some(42));
        assert_eq!(map.get(keylo).cloned(), Some('K' as u32));
        assert_eq!(map.keys(), vec![key42, keylo]);
    }

    #[test]
    fn retained() {
        let mut map = SlotMap::with_capacity(1);
        let key = map.insert(0xde).unwrap();
        map.remove(key).unwrap();
        assert_eq!(map.get(key), None);

        let new_key = map.insert(0xad).unwrap();
        assert_eq!(key.index(), new_key.index());

        assert_eq!(map.get(key), None);
        assert_eq!(map.get(new_key).cloned(), Some(0xad));

        assert_eq!(map.remove(key), None);
        map.remove(new_key).unwrap();

        assert_eq!(map.get(key), None);
        assert_eq!(map.get(new_key), None);
        assert!(map.is_empty());
    }

    #[test]
    fn insert_knows_key() {
        let mut map = SlotMap::with_capacity(3);
        let key = map.insert_with(|key| key).unwrap();
        assert_eq!(map.get(key), Some(&key));
    }
}
