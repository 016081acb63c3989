//! The object broker
//!
//! One explicit value, built at boot and owned by the boot context, that
//! holds every piece of shared state in this subsystem: the static
//! descriptor table handed over from the build-time generator, the dynamic
//! object registry, the thread-index allocator, and (optionally) the
//! private-stack side table.
//!
//! ## Locking
//!
//! A single `spin::Mutex` guards all of it. Every public operation takes
//! the lock once, completes in bounded time, and never suspends, so the
//! broker is safe to call from contexts that cannot block. Crucially, the
//! explicit-free path (`destroy`) and the last-permission-cleared path
//! (inside `revoke`) both mutate the registry under this same lock, so
//! exactly one of two racing removers unlinks and frees an entry; the
//! other observes "already gone".

use alloc::vec::Vec;

use spin::Mutex;

use crate::object::{ObjectDescriptor, TypeTable};
#[cfg(feature = "dynamic-objects")]
use crate::registry::DynRegistry;
#[cfg(feature = "stack-table")]
use crate::stack_table::StackTable;
use crate::thread_index::{ThreadIndex, ThreadIndexTable};
use crate::Result;

/// All broker state, guarded by one lock.
pub(crate) struct BrokerInner {
    /// Build-time descriptors, sorted by address for binary-search lookup.
    /// Never grows or shrinks after boot; only flags/permissions mutate.
    pub(crate) statics: Vec<ObjectDescriptor>,

    #[cfg(feature = "dynamic-objects")]
    pub(crate) dynamic: DynRegistry,

    pub(crate) threads: ThreadIndexTable,

    #[cfg(feature = "stack-table")]
    pub(crate) stacks: StackTable,
}

/// Kernel-object access control and dynamic-object lifecycle manager.
///
/// Constructed once at boot with the type table and the static object
/// table, then passed by reference into every privileged operation.
pub struct ObjectBroker {
    pub(crate) table: &'static TypeTable,
    pub(crate) inner: Mutex<BrokerInner>,
}

impl ObjectBroker {
    /// Build the broker from the build-time type table and the static
    /// object descriptors.
    ///
    /// Static descriptors are sorted by address here; duplicate addresses
    /// in the generated table are a build bug (debug assertion).
    pub fn new(table: &'static TypeTable, mut static_objects: Vec<ObjectDescriptor>) -> Self {
        static_objects.sort_unstable_by_key(|desc| desc.addr());
        debug_assert!(
            static_objects.windows(2).all(|w| w[0].addr() != w[1].addr()),
            "duplicate address in static object table"
        );
        Self {
            table,
            inner: Mutex::new(BrokerInner {
                statics: static_objects,
                #[cfg(feature = "dynamic-objects")]
                dynamic: DynRegistry::new(),
                threads: ThreadIndexTable::new(),
                #[cfg(feature = "stack-table")]
                stacks: StackTable::new(),
            }),
        }
    }

    /// Resolve an address to its descriptor: static table first, then the
    /// dynamic registry. The order is fixed so resolution is deterministic.
    pub(crate) fn resolve<'a>(
        inner: &'a BrokerInner,
        addr: usize,
    ) -> Option<&'a ObjectDescriptor> {
        if let Ok(i) = inner.statics.binary_search_by_key(&addr, |d| d.addr()) {
            return Some(&inner.statics[i]);
        }
        #[cfg(feature = "dynamic-objects")]
        if let Some(entry) = inner.dynamic.find(addr) {
            return Some(&entry.desc);
        }
        None
    }

    pub(crate) fn resolve_mut<'a>(
        inner: &'a mut BrokerInner,
        addr: usize,
    ) -> Option<&'a mut ObjectDescriptor> {
        if let Ok(i) = inner.statics.binary_search_by_key(&addr, |d| d.addr()) {
            return Some(&mut inner.statics[i]);
        }
        #[cfg(feature = "dynamic-objects")]
        if let Some(entry) = inner.dynamic.find_mut(addr) {
            return Some(&mut entry.desc);
        }
        None
    }

    /// Clear `idx`'s permission bit on every descriptor in both
    /// registries. Run at both ends of an index's reuse cycle, so a
    /// recycled index can never inherit a grant from its previous owner.
    pub(crate) fn scrub_index_locked(inner: &mut BrokerInner, idx: ThreadIndex) {
        for desc in inner.statics.iter_mut() {
            desc.revoke(idx);
        }
        #[cfg(feature = "dynamic-objects")]
        inner.dynamic.for_each_desc_mut(|desc| desc.revoke(idx));
    }

    /// Release `idx` and scrub its bit everywhere. No-op for an index
    /// that is not live.
    pub(crate) fn release_index_locked(inner: &mut BrokerInner, idx: ThreadIndex) {
        if inner.threads.release(idx) {
            Self::scrub_index_locked(inner, idx);
            log::trace!("thread index {} released", idx.as_usize());
        }
    }

    /// Reserve the lowest free thread index.
    ///
    /// The returned index's permission bit is clear on every descriptor
    /// before this returns. [`ObjectError::Exhausted`] leaves the
    /// allocator untouched.
    pub fn allocate_thread_index(&self) -> Result<ThreadIndex> {
        let mut inner = self.inner.lock();
        let idx = match inner.threads.allocate() {
            Ok(idx) => idx,
            Err(err) => {
                log::warn!("thread index space exhausted");
                return Err(err);
            }
        };
        Self::scrub_index_locked(&mut inner, idx);
        log::trace!("thread index {} allocated", idx.as_usize());
        Ok(idx)
    }

    /// Return `idx` to the free pool, scrubbing its bit on every
    /// descriptor.
    ///
    /// Callers tearing down a thread are expected to run
    /// [`ObjectBroker::revoke_all`] first so allocator-owned objects whose
    /// last reference was this thread are reclaimed; the scrub here is a
    /// plain bit clear, not a revoke.
    pub fn release_thread_index(&self, idx: ThreadIndex) {
        let mut inner = self.inner.lock();
        Self::release_index_locked(&mut inner, idx);
    }

    /// Whether `idx` is currently live.
    pub fn thread_index_live(&self, idx: ThreadIndex) -> bool {
        self.inner.lock().threads.is_allocated(idx)
    }

    /// Number of live thread indices.
    pub fn live_thread_count(&self) -> usize {
        self.inner.lock().threads.live_count()
    }

    /// Number of registered dynamic objects.
    #[cfg(feature = "dynamic-objects")]
    pub fn dynamic_object_count(&self) -> usize {
        self.inner.lock().dynamic.len()
    }

    /// Visit every static descriptor, snapshot-style.
    ///
    /// Descriptors are copied out under the lock and the callback runs
    /// after it is released, so callbacks are free to re-enter the
    /// broker (grant, revoke, validate, ...). The copies reflect the
    /// state at call time.
    pub fn for_each_static(&self, mut f: impl FnMut(&ObjectDescriptor)) {
        let snapshot = self.inner.lock().statics.clone();
        for desc in snapshot.iter() {
            f(desc);
        }
    }

    /// Visit every dynamic descriptor, snapshot-style: the visit set and
    /// descriptor contents are fixed up front, under one lock hold.
    ///
    /// The callback runs after the lock is released, so it may re-enter
    /// the broker, including destroying the object it was just shown.
    #[cfg(feature = "dynamic-objects")]
    pub fn for_each_dynamic(&self, mut f: impl FnMut(&ObjectDescriptor)) {
        let snapshot = {
            let inner = self.inner.lock();
            let mut descs = Vec::with_capacity(inner.dynamic.len());
            for addr in inner.dynamic.snapshot() {
                if let Some(entry) = inner.dynamic.find(addr) {
                    descs.push(entry.desc.clone());
                }
            }
            descs
        };
        for desc in snapshot.iter() {
            f(desc);
        }
    }

    /// Unlink `addr` from the dynamic registry, run its cleanup hook,
    /// release a `Thread` object's reserved index, and free the storage.
    ///
    /// Returns false if the entry was already gone, which is how the loser
    /// of a destroy/auto-free race finds out. Callers hold the lock, so
    /// there is exactly one winner.
    #[cfg(feature = "dynamic-objects")]
    pub(crate) fn reap_locked(
        inner: &mut BrokerInner,
        table: &TypeTable,
        addr: usize,
    ) -> bool {
        let Some(entry) = inner.dynamic.remove(addr) else {
            return false;
        };
        debug_assert!(entry.desc.is_allocated());

        if let Some(info) = table.info(entry.desc.kind()) {
            if let Some(cleanup) = info.cleanup {
                cleanup(entry.storage.as_non_null());
            }
        }
        if let Some(owner) = entry.owner_index {
            Self::release_index_locked(inner, owner);
        }
        log::debug!(
            "reclaimed {:?} object at {:#x}",
            entry.desc.kind(),
            addr
        );
        // Dropping the entry frees the backing storage.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectType, TypeTable};
    use crate::ObjectError;
    use alloc::vec;

    static TABLE: TypeTable = TypeTable::kernel_defaults();

    #[test]
    fn test_static_table_is_sorted_for_lookup() {
        let statics = vec![
            ObjectDescriptor::new(0x3000, ObjectType::Semaphore),
            ObjectDescriptor::new(0x1000, ObjectType::Mutex),
            ObjectDescriptor::new(0x2000, ObjectType::Timer),
        ];
        let broker = ObjectBroker::new(&TABLE, statics);
        let inner = broker.inner.lock();
        assert_eq!(
            ObjectBroker::resolve(&inner, 0x2000).unwrap().kind(),
            ObjectType::Timer
        );
        assert!(ObjectBroker::resolve(&inner, 0x1500).is_none());
    }

    #[test]
    fn test_index_reuse_is_clean() {
        let statics = vec![ObjectDescriptor::new(0x1000, ObjectType::Semaphore)];
        let broker = ObjectBroker::new(&TABLE, statics);

        // First owner of index 0 gets a grant.
        let first = broker.allocate_thread_index().unwrap();
        broker.grant(0x1000, first).unwrap();
        assert!(broker.test_access(0x1000, first));

        // Owner dies without revoking; release scrubs the bit.
        broker.release_thread_index(first);

        // Next owner of the same index sees no leaked grant.
        let second = broker.allocate_thread_index().unwrap();
        assert_eq!(first, second);
        assert!(!broker.test_access(0x1000, second));
    }

    #[test]
    fn test_exhaustion_leaves_allocator_usable() {
        let broker = ObjectBroker::new(&TABLE, Vec::new());
        let mut held = Vec::new();
        for _ in 0..crate::MAX_THREADS {
            held.push(broker.allocate_thread_index().unwrap());
        }
        assert_eq!(broker.allocate_thread_index(), Err(ObjectError::Exhausted));
        assert_eq!(broker.live_thread_count(), crate::MAX_THREADS);

        broker.release_thread_index(held[10]);
        assert!(!broker.thread_index_live(held[10]));
        assert_eq!(broker.allocate_thread_index().unwrap(), held[10]);
        assert!(broker.thread_index_live(held[10]));
    }

    #[test]
    fn test_release_of_free_index_is_noop() {
        let broker = ObjectBroker::new(&TABLE, Vec::new());
        broker.release_thread_index(ThreadIndex::new(4));
        assert_eq!(broker.live_thread_count(), 0);
    }

    #[test]
    fn test_for_each_static_visits_all() {
        let statics = vec![
            ObjectDescriptor::new(0x1000, ObjectType::Mutex),
            ObjectDescriptor::new(0x2000, ObjectType::Semaphore),
        ];
        let broker = ObjectBroker::new(&TABLE, statics);
        let mut seen = 0;
        broker.for_each_static(|_| seen += 1);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_for_each_static_callback_may_reenter() {
        let statics = vec![ObjectDescriptor::new(0x1000, ObjectType::Mutex)];
        let broker = ObjectBroker::new(&TABLE, statics);
        let idx = broker.allocate_thread_index().unwrap();

        // Re-entering the broker from the callback must not deadlock.
        broker.for_each_static(|desc| {
            broker.grant(desc.addr(), idx).unwrap();
        });
        assert!(broker.test_access(0x1000, idx));
    }
}
