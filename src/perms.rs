//! Permission engine
//!
//! Grant, revoke, and test of per-thread permission bits, plus the
//! zero-reference check that reclaims allocator-owned objects when their
//! last grant disappears. Static objects are exempt from reclamation no
//! matter what their bitmap says.
//!
//! All mutation here happens under the broker lock, the same lock the
//! explicit-free path takes, which is what makes "last revoke frees the
//! object" race-free against `destroy`.

use crate::broker::ObjectBroker;
use crate::thread_index::ThreadIndex;
use crate::{ObjectError, Result};

impl ObjectBroker {
    /// Grant `idx` access to the object at `addr`. Idempotent.
    pub fn grant(&self, addr: usize, idx: ThreadIndex) -> Result<()> {
        let mut inner = self.inner.lock();
        let desc =
            Self::resolve_mut(&mut inner, addr).ok_or(ObjectError::UnknownOrWrongType)?;
        desc.grant(idx);
        log::trace!("grant {:#x} -> index {}", addr, idx.as_usize());
        Ok(())
    }

    /// Revoke `idx`'s access to the object at `addr`, then run the
    /// zero-reference check: an allocator-owned object whose last grant
    /// just cleared is cleaned up, unlinked, and freed here.
    pub fn revoke(&self, addr: usize, idx: ThreadIndex) -> Result<()> {
        let mut inner = self.inner.lock();
        let desc =
            Self::resolve_mut(&mut inner, addr).ok_or(ObjectError::UnknownOrWrongType)?;
        desc.revoke(idx);
        log::trace!("revoke {:#x} -> index {}", addr, idx.as_usize());

        let unreferenced = desc.is_allocated() && !desc.any_granted();
        #[cfg(feature = "dynamic-objects")]
        if unreferenced {
            Self::reap_locked(&mut inner, self.table, addr);
        }
        #[cfg(not(feature = "dynamic-objects"))]
        let _ = unreferenced;
        Ok(())
    }

    /// Mark the object at `addr` public: every subsequent permission test
    /// passes unconditionally. Monotonic; there is no un-public operation.
    pub fn grant_public(&self, addr: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let desc =
            Self::resolve_mut(&mut inner, addr).ok_or(ObjectError::UnknownOrWrongType)?;
        desc.mark_public();
        log::debug!("object {:#x} made public", addr);
        Ok(())
    }

    /// Revoke `idx` on every object in both registries: the thread
    /// teardown path. Allocator-owned objects whose last grant was this
    /// thread's are reclaimed along the way.
    ///
    /// The dynamic walk is snapshot-style: the visit set is fixed up
    /// front, and destruction of an entry happens strictly after its
    /// visit.
    pub fn revoke_all(&self, idx: ThreadIndex) {
        let mut inner = self.inner.lock();
        for desc in inner.statics.iter_mut() {
            desc.revoke(idx);
        }
        #[cfg(feature = "dynamic-objects")]
        {
            for addr in inner.dynamic.snapshot() {
                let unreferenced = match inner.dynamic.find_mut(addr) {
                    Some(entry) => {
                        entry.desc.revoke(idx);
                        entry.desc.is_allocated() && !entry.desc.any_granted()
                    }
                    // Entry died between snapshot and visit; nothing to do.
                    None => false,
                };
                if unreferenced {
                    Self::reap_locked(&mut inner, self.table, addr);
                }
            }
        }
        log::debug!("revoked all grants for index {}", idx.as_usize());
    }

    /// Non-mutating permission test: true if the object is public or
    /// `idx`'s bit is set. Unknown objects test false. Safe to call from
    /// contexts that cannot block (single short-held spinlock).
    pub fn test_access(&self, addr: usize, idx: ThreadIndex) -> bool {
        let inner = self.inner.lock();
        match Self::resolve(&inner, addr) {
            Some(desc) => desc.is_public() || desc.is_granted(idx),
            None => false,
        }
    }
}
