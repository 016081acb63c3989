//! Private-stack side table
//!
//! Optional mapping from a thread's execution stack to the
//! privileged-mode scratch stack it switches to on kernel entry.
//! Populated at boot/thread creation, consulted only during thread-object
//! lookups. Completely orthogonal to the permission model.

#![cfg(feature = "stack-table")]

use alloc::collections::BTreeMap;

use crate::broker::ObjectBroker;

/// Boot-populated user-stack -> privileged-stack mapping.
pub(crate) struct StackTable {
    map: BTreeMap<usize, usize>,
}

impl StackTable {
    pub(crate) const fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn register(&mut self, user_stack: usize, priv_stack: usize) {
        self.map.insert(user_stack, priv_stack);
    }

    pub(crate) fn lookup(&self, user_stack: usize) -> Option<usize> {
        self.map.get(&user_stack).copied()
    }
}

impl ObjectBroker {
    /// Associate `user_stack` with its privileged-mode scratch stack.
    pub fn register_privileged_stack(&self, user_stack: usize, priv_stack: usize) {
        self.inner.lock().stacks.register(user_stack, priv_stack);
    }

    /// Privileged-mode scratch stack for `user_stack`, if one is
    /// registered. Used by thread-object lookup on kernel entry.
    pub fn privileged_stack_for(&self, user_stack: usize) -> Option<usize> {
        self.inner.lock().stacks.lookup(user_stack)
    }
}
