//! Fixed-capacity slot pool.

use crate::error::{CoreError, Result};
use crate::handle::Handle;

struct Slot<V> {
    generation: u16,
    value: Option<V>,
}

/// A pool with a hard ceiling on live entries.
///
/// Slots are handed out lowest-index first. Freeing a slot bumps its generation so
/// that handles issued before the free are rejected afterwards.
pub struct Pool<T, V> {
    name: &'static str,
    capacity: usize,
    slots: Vec<Slot<V>>,
    free: Vec<u16>,
    len: usize,
    _tag: std::marker::PhantomData<fn() -> T>,
}

impl<T, V> Pool<T, V> {
    /// Creates an empty pool. `name` appears in error messages.
    ///
    /// Capacity is clamped to `u16::MAX` slots.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.min(usize::from(u16::MAX)),
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _tag: std::marker::PhantomData,
        }
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum number of live entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if no further entry can be inserted.
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Stores a value and returns its handle.
    pub fn insert(&mut self, value: V) -> Result<Handle<T>> {
        if self.is_full() {
            return Err(CoreError::CapacityExceeded {
                resource: self.name,
                limit: self.capacity,
            });
        }

        // Reuse the lowest freed slot so handle indices stay compact.
        let index = if let Some(pos) = self
            .free
            .iter()
            .enumerate()
            .min_by_key(|(_, i)| **i)
            .map(|(pos, _)| pos)
        {
            self.free.swap_remove(pos)
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let index = self.slots.len() as u16;
            self.slots.push(Slot {
                generation: 0,
                value: None,
            });
            index
        };

        let slot = &mut self.slots[usize::from(index)];
        slot.value = Some(value);
        self.len += 1;
        Ok(Handle::new(index, slot.generation))
    }

    /// Returns true if the handle refers to a live entry.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.slot(handle).is_some()
    }

    /// Resolves a handle.
    pub fn get(&self, handle: Handle<T>) -> Result<&V> {
        self.slot(handle)
            .and_then(|s| s.value.as_ref())
            .ok_or_else(|| self.stale(handle))
    }

    /// Resolves a handle mutably.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut V> {
        let live = self.slot(handle).is_some();
        if !live {
            return Err(self.stale(handle));
        }
        self.slots[usize::from(handle.index())]
            .value
            .as_mut()
            .ok_or_else(|| CoreError::precondition("pool slot emptied during lookup"))
    }

    /// Swaps in a new value under an existing handle and returns the old one.
    pub fn replace(&mut self, handle: Handle<T>, value: V) -> Result<V> {
        let slot = self.get_mut(handle)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Frees a slot and returns its value. The handle becomes stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<V> {
        if self.slot(handle).is_none() {
            return Err(self.stale(handle));
        }
        let slot = &mut self.slots[usize::from(handle.index())];
        let value = slot
            .value
            .take()
            .ok_or_else(|| CoreError::precondition("pool slot emptied during removal"))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.len -= 1;
        Ok(value)
    }

    /// Iterates live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &V)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            let handle = Handle::new(i as u16, slot.generation);
            slot.value.as_ref().map(|v| (handle, v))
        })
    }

    /// Iterates live entries mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut V)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            let handle = Handle::new(i as u16, slot.generation);
            slot.value.as_mut().map(|v| (handle, v))
        })
    }

    /// Drains every live entry, invalidating all handles.
    pub fn drain(&mut self) -> Vec<V> {
        let mut out = Vec::with_capacity(self.len);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(v) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                #[allow(clippy::cast_possible_truncation)]
                self.free.push(i as u16);
                out.push(v);
            }
        }
        self.len = 0;
        out
    }

    fn slot(&self, handle: Handle<T>) -> Option<&Slot<V>> {
        self.slots
            .get(usize::from(handle.index()))
            .filter(|s| s.generation == handle.generation() && s.value.is_some())
    }

    fn stale(&self, handle: Handle<T>) -> CoreError {
        CoreError::precondition(format!(
            "{} handle {handle:?} is not registered",
            self.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tag;
    use proptest::prelude::*;

    #[test]
    fn test_insert_until_full() {
        let mut pool: Pool<tag::Mesh, u32> = Pool::new("mesh", 3);
        for i in 0..3 {
            pool.insert(i).unwrap();
        }
        let err = pool.insert(99).unwrap_err();
        assert!(err.is_capacity_exceeded());
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut pool: Pool<tag::Mesh, &str> = Pool::new("mesh", 2);
        let a = pool.insert("a").unwrap();
        assert_eq!(pool.remove(a).unwrap(), "a");

        let b = pool.insert("b").unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);

        assert!(pool.get(a).unwrap_err().is_precondition_violation());
        assert_eq!(*pool.get(b).unwrap(), "b");
    }

    #[test]
    fn test_replace_keeps_handle() {
        let mut pool: Pool<tag::Target, u32> = Pool::new("target", 1);
        let h = pool.insert(1).unwrap();
        assert_eq!(pool.replace(h, 2).unwrap(), 1);
        assert_eq!(*pool.get(h).unwrap(), 2);
    }

    #[test]
    fn test_iteration_order_is_slot_order() {
        let mut pool: Pool<tag::Pass, char> = Pool::new("pass", 4);
        let a = pool.insert('a').unwrap();
        pool.insert('b').unwrap();
        pool.insert('c').unwrap();
        pool.remove(a).unwrap();
        pool.insert('d').unwrap();
        let order: String = pool.iter().map(|(_, c)| *c).collect();
        assert_eq!(order, "dbc");
    }

    #[test]
    fn test_drain_invalidates() {
        let mut pool: Pool<tag::Texture, u8> = Pool::new("texture", 4);
        let h = pool.insert(7).unwrap();
        assert_eq!(pool.drain(), vec![7]);
        assert!(pool.is_empty());
        assert!(!pool.contains(h));
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(ops in prop::collection::vec(any::<bool>(), 0..64)) {
            let mut pool: Pool<tag::Mesh, usize> = Pool::new("mesh", 5);
            let mut live = Vec::new();
            for (i, insert) in ops.into_iter().enumerate() {
                if insert {
                    if let Ok(h) = pool.insert(i) {
                        live.push(h);
                    }
                } else if let Some(h) = live.pop() {
                    pool.remove(h).unwrap();
                }
                prop_assert!(pool.len() <= pool.capacity());
                prop_assert_eq!(pool.len(), live.len());
            }
        }
    }
}
