//! Dynamic object registry
//!
//! Run-time-created objects live here: a slot arena owning each object's
//! descriptor and backing storage, an ordered index (`BTreeMap` keyed by
//! object address) for O(log n) syscall-pointer resolution, and an
//! intrusive doubly-linked slot list in insertion order for O(1)
//! append/unlink enumeration.
//!
//! Callers outside this module never see entry pointers, only addresses
//! and the opaque slot ids the arena hands back; there is no
//! container-from-field offset arithmetic anywhere.
//!
//! The registry is not internally synchronized. The broker wraps it (and
//! everything else that can remove an entry) in one lock, which is what
//! makes `remove` racing against the auto-free path well-defined: the
//! loser simply observes `None`.

use alloc::alloc::{alloc_zeroed, dealloc};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::ptr::NonNull;

use crate::object::ObjectDescriptor;
use crate::thread_index::ThreadIndex;
use crate::ObjectError;

/// Opaque arena slot id.
pub(crate) type SlotId = usize;

/// Owned raw backing storage for one dynamic object.
///
/// Allocated zeroed at the kind's size/alignment; freed exactly once when
/// the owning entry drops.
pub(crate) struct Storage {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Storage {
    /// Allocate zeroed storage for `layout`.
    pub(crate) fn allocate(layout: Layout) -> Result<Self, ObjectError> {
        debug_assert!(layout.size() > 0, "object kinds have non-zero size");
        // SAFETY: layout has non-zero size, checked above.
        let raw = unsafe { alloc_zeroed(layout) };
        match NonNull::new(raw) {
            Some(ptr) => Ok(Self { ptr, layout }),
            None => Err(ObjectError::OutOfMemory {
                requested: layout.size(),
            }),
        }
    }

    /// The object's identity: the storage address.
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Storage pointer, handed to cleanup hooks.
    #[inline]
    pub(crate) fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout
        // and is freed only here, once, because Storage is never cloned.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: Storage is an exclusively-owned allocation; the registry (and
// therefore the broker lock) serializes all access to it.
unsafe impl Send for Storage {}

/// One registered dynamic object: descriptor, storage, and the intrusive
/// enumeration-list links.
pub(crate) struct Entry {
    pub(crate) desc: ObjectDescriptor,
    pub(crate) storage: Storage,

    /// For `Thread` objects: the thread index reserved at creation,
    /// released when the entry is destroyed.
    pub(crate) owner_index: Option<ThreadIndex>,

    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Arena-backed registry of dynamic objects.
pub(crate) struct DynRegistry {
    /// Slot arena; `None` slots are free and listed in `free_slots`.
    slots: Vec<Option<Entry>>,

    /// Recycled slot ids.
    free_slots: Vec<SlotId>,

    /// Ordered index: object address -> slot.
    by_addr: BTreeMap<usize, SlotId>,

    /// Enumeration list in insertion order.
    head: Option<SlotId>,
    tail: Option<SlotId>,

    len: usize,
}

impl DynRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            by_addr: BTreeMap::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Install a new entry, keyed by its storage address. Appends to the
    /// enumeration list tail.
    pub(crate) fn insert(
        &mut self,
        desc: ObjectDescriptor,
        storage: Storage,
        owner_index: Option<ThreadIndex>,
    ) -> SlotId {
        let addr = storage.addr();
        debug_assert_eq!(addr, desc.addr(), "descriptor identity is its storage address");
        debug_assert!(!self.by_addr.contains_key(&addr), "address already registered");

        let entry = Entry {
            desc,
            storage,
            owner_index,
            prev: self.tail,
            next: None,
        };

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        if let Some(tail) = self.tail {
            if let Some(tail_entry) = self.slots[tail].as_mut() {
                tail_entry.next = Some(slot);
            }
        }
        self.tail = Some(slot);
        if self.head.is_none() {
            self.head = Some(slot);
        }

        self.by_addr.insert(addr, slot);
        self.len += 1;
        slot
    }

    /// O(log n) lookup by object address.
    pub(crate) fn find(&self, addr: usize) -> Option<&Entry> {
        let slot = *self.by_addr.get(&addr)?;
        self.slots[slot].as_ref()
    }

    pub(crate) fn find_mut(&mut self, addr: usize) -> Option<&mut Entry> {
        let slot = *self.by_addr.get(&addr)?;
        self.slots[slot].as_mut()
    }

    /// Unlink and return the entry for `addr`. A second removal attempt
    /// for the same address observes `None` and changes nothing; the
    /// caller reclaims storage by dropping the returned entry.
    pub(crate) fn remove(&mut self, addr: usize) -> Option<Entry> {
        let slot = self.by_addr.remove(&addr)?;
        let entry = self.slots[slot].take()?;

        match entry.prev {
            Some(prev) => {
                if let Some(prev_entry) = self.slots[prev].as_mut() {
                    prev_entry.next = entry.next;
                }
            }
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => {
                if let Some(next_entry) = self.slots[next].as_mut() {
                    next_entry.prev = entry.prev;
                }
            }
            None => self.tail = entry.prev,
        }

        self.free_slots.push(slot);
        self.len -= 1;
        Some(entry)
    }

    /// Addresses of all current entries in insertion order.
    ///
    /// Each call starts a fresh traversal with no cursor state, so callers
    /// may destroy entries between visits: a destroyed address simply
    /// fails its re-lookup.
    pub(crate) fn snapshot(&self) -> Vec<usize> {
        let mut addrs = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match self.slots[slot].as_ref() {
                Some(entry) => {
                    addrs.push(entry.desc.addr());
                    cursor = entry.next;
                }
                None => break,
            }
        }
        addrs
    }

    /// Visit every descriptor mutably (no removal during the walk).
    /// Used for cross-registry permission-bit scrubs.
    pub(crate) fn for_each_desc_mut(&mut self, mut f: impl FnMut(&mut ObjectDescriptor)) {
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot.as_mut() {
                f(&mut entry.desc);
            }
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
