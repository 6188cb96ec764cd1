//! Fixed-capacity object arena
//!
//! Every kernel object table (TCBs, queues, mutexes, event groups, timers)
//! is a [`Slab`]. Objects are addressed by [`Id`], an index paired with the
//! slot generation, so a handle kept after its object was deleted is
//! detected instead of aliasing whatever reused the slot. Intrusive lists
//! inside the kernel link slots by bare index.

/// Slot index + generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id {
    index: u16,
    generation: u16,
}

impl Id {
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u16 {
        self.generation
    }

    #[inline]
    pub const fn into_raw(self) -> u32 {
        ((self.generation as u32) << 16) | self.index as u32
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Id {
            index: raw as u16,
            generation: (raw >> 16) as u16,
        }
    }
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Fixed-capacity slab
pub struct Slab<T, const N: usize> {
    slots: [Slot<T>; N],
    len: usize,
}

impl<T, const N: usize> Slab<T, N> {
    pub const fn new() -> Self {
        Slab {
            slots: [const { Slot { generation: 0, value: None } }; N],
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Store a value in the first free slot
    pub fn insert(&mut self, value: T) -> Result<Id, T> {
        match self.slots.iter().position(|s| s.value.is_none()) {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.value = Some(value);
                self.len += 1;
                Ok(Id {
                    index: index as u16,
                    generation: slot.generation,
                })
            }
            None => Err(value),
        }
    }

    /// Drop every value; outstanding ids become stale
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.len = 0;
    }

    /// Remove the value behind `id`, invalidating every copy of it
    pub fn remove(&mut self, id: Id) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.len -= 1;
        Some(value)
    }

    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Current id of an occupied slot
    pub fn id_at(&self, index: usize) -> Option<Id> {
        let slot = self.slots.get(index)?;
        slot.value.as_ref().map(|_| Id {
            index: index as u16,
            generation: slot.generation,
        })
    }

    /// Access by bare index, for intrusive links.
    ///
    /// Panics if the slot is empty: a linked index always refers to a live
    /// object.
    #[inline]
    pub fn at(&self, index: u16) -> &T {
        match self.slots[index as usize].value.as_ref() {
            Some(v) => v,
            None => panic!("dangling arena link"),
        }
    }

    #[inline]
    pub fn at_mut(&mut self, index: u16) -> &mut T {
        match self.slots[index as usize].value.as_mut() {
            Some(v) => v,
            None => panic!("dangling arena link"),
        }
    }

    /// Iterate over live objects
    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| {
                (
                    Id {
                        index: i as u16,
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }
}

impl<T, const N: usize> Default for Slab<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut slab: Slab<u32, 4> = Slab::new();
        let a = slab.insert(10).unwrap();
        let b = slab.insert(20).unwrap();
        assert_eq!(slab.len(), 2);
        assert_eq!(slab.get(a), Some(&10));
        assert_eq!(slab.get(b), Some(&20));

        assert_eq!(slab.remove(a), Some(10));
        assert_eq!(slab.get(a), None);
        assert_eq!(slab.len(), 1);
    }

    #[test]
    fn test_stale_id_rejected_after_reuse() {
        let mut slab: Slab<u32, 1> = Slab::new();
        let old = slab.insert(1).unwrap();
        slab.remove(old);
        let new = slab.insert(2).unwrap();

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(slab.get(old), None);
        assert_eq!(slab.remove(old), None);
        assert_eq!(slab.get(new), Some(&2));
    }

    #[test]
    fn test_full() {
        let mut slab: Slab<u8, 2> = Slab::new();
        slab.insert(1).unwrap();
        slab.insert(2).unwrap();
        assert!(slab.is_full());
        assert_eq!(slab.insert(3), Err(3));
    }

    #[test]
    fn test_clear_invalidates_ids() {
        let mut slab: Slab<u8, 4> = Slab::new();
        let a = slab.insert(1).unwrap();
        slab.clear();
        assert!(slab.is_empty());
        assert_eq!(slab.get(a), None);
        let b = slab.insert(2).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
    }

    #[test]
    fn test_raw_round_trip() {
        let mut slab: Slab<u8, 8> = Slab::new();
        for _ in 0..5 {
            let id = slab.insert(0).unwrap();
            slab.remove(id);
        }
        let id = slab.insert(7).unwrap();
        assert_eq!(Id::from_raw(id.into_raw()), id);
        assert_eq!(id.generation(), 5);
    }
}
