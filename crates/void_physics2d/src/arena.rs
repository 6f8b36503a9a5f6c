//! Generational slot storage for bodies, fixtures, contacts and joints
//!
//! Keys carry a generation so a handle to a destroyed element never resolves
//! to whatever reused its slot.

/// Key for slot map access with generation tracking
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    /// Create a new key
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Get the raw index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Get the generation
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl core::fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

/// SlotMap - generational index storage
///
/// Iteration always runs in slot order, so it is deterministic for a given
/// sequence of inserts and removes.
pub struct SlotMap<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> SlotMap<T> {
    /// Create a new empty slot map
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Insert a value and get its key
    pub fn insert(&mut self, value: T) -> SlotKey {
        self.insert_with_key(|_| value)
    }

    /// Insert a value built from its own key
    pub fn insert_with_key(&mut self, f: impl FnOnce(SlotKey) -> T) -> SlotKey {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            let key = SlotKey::new(index, slot.generation);
            slot.value = Some(f(key));
            key
        } else {
            let index = self.slots.len() as u32;
            let key = SlotKey::new(index, 0);
            self.slots.push(Slot {
                value: Some(f(key)),
                generation: 0,
            });
            key
        }
    }

    /// Remove a value by key
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;

        if slot.generation != key.generation || slot.value.is_none() {
            return None;
        }

        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(key.index);
        self.len -= 1;

        slot.value.take()
    }

    /// Get a reference to a value
    pub fn get(&self, key: SlotKey) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Get a mutable reference to a value
    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Mutable access to two distinct values at once
    pub fn get2_mut(&mut self, a: SlotKey, b: SlotKey) -> Option<(&mut T, &mut T)> {
        if a.index == b.index {
            return None;
        }
        let (ia, ib) = (a.index as usize, b.index as usize);
        if ia >= self.slots.len() || ib >= self.slots.len() {
            return None;
        }
        let (first, second) = if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        };
        if first.generation != a.generation || second.generation != b.generation {
            return None;
        }
        Some((first.value.as_mut()?, second.value.as_mut()?))
    }

    /// Check if a key is valid
    pub fn contains_key(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Get the number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over all values
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (SlotKey::new(i as u32, slot.generation), v))
        })
    }

    /// Iterate over all values mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotKey, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let gen = slot.generation;
            slot.value.as_mut().map(|v| (SlotKey::new(i as u32, gen), v))
        })
    }

    /// Iterate over keys only
    pub fn keys(&self) -> impl Iterator<Item = SlotKey> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Iterate over values mutably
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
