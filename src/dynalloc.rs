//! Dynamic allocator
//!
//! Creates kernel objects at run time: reserves a thread index for
//! `Thread` objects, allocates zeroed backing storage at the kind's
//! size/alignment, installs the descriptor into the dynamic registry, and
//! grants the creator's bit (a thread implicitly has access to what it
//! creates). The explicit-free side (`destroy`) is privileged-only and
//! shares its removal path with the permission engine's auto-free.

#![cfg(feature = "dynamic-objects")]

use crate::broker::ObjectBroker;
use crate::object::{ObjectDescriptor, ObjectType};
use crate::registry::Storage;
use crate::thread_index::ThreadIndex;
use crate::{ObjectError, Result};

impl ObjectBroker {
    /// Create a dynamic object of `kind`, granting `creator` access.
    /// Returns the new object's address (its identity).
    ///
    /// Fails with [`ObjectError::Forbidden`] for kinds that cannot live in
    /// kernel-owned storage, [`ObjectError::Exhausted`] when a `Thread`
    /// object cannot reserve an index, and [`ObjectError::OutOfMemory`]
    /// when storage allocation fails. Every failure path leaves no state
    /// behind: in particular, a reserved thread index is released before
    /// `OutOfMemory` is returned.
    pub fn create(&self, kind: ObjectType, creator: ThreadIndex) -> Result<usize> {
        if kind.dynamic_forbidden() {
            log::warn!("dynamic allocation of {:?} refused", kind);
            return Err(ObjectError::Forbidden { kind });
        }
        let layout = self
            .table
            .info(kind)
            .and_then(|info| info.layout())
            .ok_or(ObjectError::Forbidden { kind })?;

        let mut inner = self.inner.lock();

        // Thread objects carry their own index; reserve it before any
        // storage exists so index exhaustion allocates nothing.
        let owner_index = if kind == ObjectType::Thread {
            let idx = inner.threads.allocate()?;
            Self::scrub_index_locked(&mut inner, idx);
            Some(idx)
        } else {
            None
        };

        let storage = match Storage::allocate(layout) {
            Ok(storage) => storage,
            Err(err) => {
                // Roll back the reservation; no leaked index on OOM.
                if let Some(idx) = owner_index {
                    Self::release_index_locked(&mut inner, idx);
                }
                log::warn!("storage allocation for {:?} failed", kind);
                return Err(err);
            }
        };

        let addr = storage.addr();
        let mut desc = ObjectDescriptor::new(addr, kind);
        desc.mark_allocated();
        desc.grant(creator);
        inner.dynamic.insert(desc, storage, owner_index);

        log::debug!(
            "created {:?} object at {:#x} for index {}",
            kind,
            addr,
            creator.as_usize()
        );
        Ok(addr)
    }

    /// Explicitly free the dynamic object at `addr`.
    ///
    /// Privileged-only: this does not consult the permission bitmap, so
    /// callers must already have revoked user-mode access. Runs the kind's
    /// cleanup hook, releases a `Thread` object's index, and reclaims
    /// storage. An address with no live dynamic entry (static, never
    /// allocated, or already reclaimed by the auto-free path) fails with
    /// [`ObjectError::UnknownOrWrongType`] and changes nothing.
    pub fn destroy(&self, addr: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        if Self::reap_locked(&mut inner, self.table, addr) {
            Ok(())
        } else {
            Err(ObjectError::UnknownOrWrongType)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::TypeTable;
    use alloc::vec;
    use alloc::vec::Vec;

    static TABLE: TypeTable = TypeTable::kernel_defaults();

    fn broker() -> ObjectBroker {
        ObjectBroker::new(&TABLE, Vec::new())
    }

    #[test]
    fn test_create_grants_creator() {
        let broker = broker();
        let idx = broker.allocate_thread_index().unwrap();
        let addr = broker.create(ObjectType::Semaphore, idx).unwrap();
        assert!(broker.test_access(addr, idx));
        assert_eq!(broker.dynamic_object_count(), 1);
    }

    #[test]
    fn test_forbidden_kinds_allocate_nothing() {
        let broker = broker();
        let idx = broker.allocate_thread_index().unwrap();
        let live_before = broker.live_thread_count();

        for kind in [ObjectType::Futex, ObjectType::Heap, ObjectType::Device] {
            assert_eq!(
                broker.create(kind, idx),
                Err(ObjectError::Forbidden { kind })
            );
        }
        assert_eq!(broker.dynamic_object_count(), 0);
        // No thread index was reserved on the failure path.
        assert_eq!(broker.live_thread_count(), live_before);
    }

    #[test]
    fn test_thread_object_reserves_index() {
        let broker = broker();
        let creator = broker.allocate_thread_index().unwrap();
        assert_eq!(broker.live_thread_count(), 1);

        let addr = broker.create(ObjectType::Thread, creator).unwrap();
        // Creator's index plus the new thread's own.
        assert_eq!(broker.live_thread_count(), 2);

        broker.destroy(addr).unwrap();
        assert_eq!(broker.live_thread_count(), 1);
    }

    #[test]
    fn test_destroy_unknown_address_fails() {
        let broker = broker();
        assert_eq!(
            broker.destroy(0xdead_beef),
            Err(ObjectError::UnknownOrWrongType)
        );
    }

    #[test]
    fn test_destroy_is_single_shot() {
        let broker = broker();
        let idx = broker.allocate_thread_index().unwrap();
        let addr = broker.create(ObjectType::Pipe, idx).unwrap();

        broker.destroy(addr).unwrap();
        // Second free observes "already gone".
        assert_eq!(broker.destroy(addr), Err(ObjectError::UnknownOrWrongType));
        assert_eq!(broker.dynamic_object_count(), 0);
    }

    #[test]
    fn test_destroy_ignores_static_objects() {
        let statics = vec![ObjectDescriptor::new(0x4000, ObjectType::Mutex)];
        let broker = ObjectBroker::new(&TABLE, statics);
        assert_eq!(broker.destroy(0x4000), Err(ObjectError::UnknownOrWrongType));
        // Still resolvable afterwards.
        let idx = broker.allocate_thread_index().unwrap();
        broker.grant(0x4000, idx).unwrap();
    }

    #[test]
    fn test_auto_free_beats_destroy() {
        // Sequential stand-in for the destroy/auto-free race: the revoke
        // drives the refcount to zero and removes the entry; the explicit
        // free that follows must observe "already gone" and do nothing.
        let broker = broker();
        let idx = broker.allocate_thread_index().unwrap();
        let addr = broker.create(ObjectType::Stack, idx).unwrap();

        broker.revoke(addr, idx).unwrap();
        assert_eq!(broker.destroy(addr), Err(ObjectError::UnknownOrWrongType));
    }
}
