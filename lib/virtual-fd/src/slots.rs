//! Bounded id allocator that maps each handed-out id to an owner value.
//!
//! Allocation and binding are two separate steps: [`IdSlots::allocate`]
//! reserves an id, and [`IdSlots::bind`] later attaches the owner to it. Only
//! ids produced by the same store can be bound, which lets the caller detect
//! records that were created against a different store.

use std::collections::BTreeSet;

#[derive(Debug)]
enum Slot<T> {
    Vacant,
    Reserved,
    Occupied(T),
}

impl<T> Slot<T> {
    fn is_allocated(&self) -> bool {
        !matches!(self, Slot::Vacant)
    }
}

#[derive(Debug)]
pub struct IdSlots<T> {
    base: u32,
    ceiling: u32,
    slots: Vec<Slot<T>>,
    free: BTreeSet<u32>,
    occupied: usize,
}

impl<T> IdSlots<T> {
    /// Creates a store handing out ids in `base..ceiling`.
    pub fn new(base: u32, ceiling: u32) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            slots: Vec::new(),
            free: BTreeSet::new(),
            occupied: 0,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Reserves the lowest available id, or `None` once the range is exhausted.
    pub fn allocate(&mut self) -> Option<u32> {
        if let Some(id) = self.free.pop_first() {
            let idx = self.index(id)?;
            self.slots[idx] = Slot::Reserved;
            return Some(id);
        }
        let id = self.base.checked_add(u32::try_from(self.slots.len()).ok()?)?;
        if id >= self.ceiling {
            return None;
        }
        self.slots.push(Slot::Reserved);
        Some(id)
    }

    /// Returns `id` to the pool, handing back the owner bound to it (if any).
    pub fn release(&mut self, id: u32) -> Option<T> {
        let idx = self.index(id)?;
        if !self.slots[idx].is_allocated() {
            return None;
        }
        self.free.insert(id);
        match std::mem::replace(&mut self.slots[idx], Slot::Vacant) {
            Slot::Occupied(owner) => {
                self.occupied -= 1;
                Some(owner)
            }
            _ => None,
        }
    }

    /// Attaches `owner` to an id previously produced by [`IdSlots::allocate`].
    ///
    /// Rebinding an occupied id replaces its owner and returns the old one.
    /// If the id was never handed out by this store the owner is given back
    /// in `Err`.
    pub fn bind(&mut self, id: u32, owner: T) -> Result<Option<T>, T> {
        let Some(idx) = self
            .index(id)
            .filter(|&idx| self.slots[idx].is_allocated())
        else {
            return Err(owner);
        };
        match std::mem::replace(&mut self.slots[idx], Slot::Occupied(owner)) {
            Slot::Occupied(previous) => Ok(Some(previous)),
            _ => {
                self.occupied += 1;
                Ok(None)
            }
        }
    }

    /// Whether `id` is currently reserved or bound.
    pub fn is_allocated(&self, id: u32) -> bool {
        self.index(id)
            .map(|idx| self.slots[idx].is_allocated())
            .unwrap_or(false)
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        match &self.slots[self.index(id)?] {
            Slot::Occupied(owner) => Some(owner),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        let idx = self.index(id)?;
        match &mut self.slots[idx] {
            Slot::Occupied(owner) => Some(owner),
            _ => None,
        }
    }

    /// Swaps the owners bound to two ids. Both ids must be bound.
    pub fn swap(&mut self, a: u32, b: u32) -> bool {
        let (Some(ia), Some(ib)) = (self.index(a), self.index(b)) else {
            return false;
        };
        let both_bound = matches!(self.slots[ia], Slot::Occupied(_))
            && matches!(self.slots[ib], Slot::Occupied(_));
        if both_bound {
            self.slots.swap(ia, ib);
        }
        both_bound
    }

    /// Number of ids with a bound owner.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Visits every bound owner in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        let base = self.base;
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(idx, slot)| match slot {
                Slot::Occupied(owner) => Some((base + idx as u32, owner)),
                _ => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        let base = self.base;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(move |(idx, slot)| match slot {
                Slot::Occupied(owner) => Some((base + idx as u32, owner)),
                _ => None,
            })
    }

    /// Calls `visit` for every bound owner until it returns `false`.
    pub fn for_each<F>(&mut self, mut visit: F)
    where
        F: FnMut(u32, &mut T) -> bool,
    {
        for (id, owner) in self.iter_mut() {
            if !visit(id, owner) {
                break;
            }
        }
    }

    fn index(&self, id: u32) -> Option<usize> {
        let idx = id.checked_sub(self.base)? as usize;
        (idx < self.slots.len()).then_some(idx)
    }
}
