//! kobject-broker - kernel-object access control and dynamic-object
//! lifecycle for a real-time kernel's userspace isolation layer
//!
//! # Purpose
//! Every object a user-mode thread names in a system call (semaphore,
//! mutex, message queue, thread, stack, ...) passes through this
//! subsystem, which decides whether the calling thread may touch it,
//! whether it is in the expected initialization state, and - for objects
//! created at run time - when its backing memory may be reclaimed.
//!
//! # Architecture
//! - [`ThreadIndexTable`]: dense per-thread integers used as bit
//!   positions in every object's permission bitmap
//! - [`ObjectDescriptor`]: identity + type tag + flags + permission bits
//! - dynamic registry (internal): ordered address index plus an
//!   insertion-order list over arena-owned entries
//! - [`ObjectBroker`]: the boot-owned value tying it together - dynamic
//!   allocation, grant/revoke with auto-free on last revoke, and the
//!   validation gate consulted before every privileged operation
//!
//! All shared state sits behind a single short-held spinlock, so every
//! path that can remove a dynamic object (explicit free, last-revoke
//! auto-free, thread teardown) serializes through the same primitive and
//! exactly one remover wins.
//!
//! # Testing Strategy
//! - Unit tests: per-module suites for bit algebra, index recycling,
//!   registry linkage, and each broker operation
//! - Integration tests: end-to-end grant/revoke/destroy scenarios in
//!   `tests/`
//! - Benchmarks: validation hot path under `benches/`

#![no_std]

#[cfg(test)]
extern crate std;

extern crate alloc;

use thiserror::Error;

mod bitset;
mod broker;
pub mod config;
#[cfg(feature = "dynamic-objects")]
mod dynalloc;
mod object;
mod perms;
#[cfg(feature = "dynamic-objects")]
mod registry;
#[cfg(feature = "stack-table")]
mod stack_table;
mod thread_index;
mod validate;

pub use bitset::PermBits;
pub use broker::ObjectBroker;
pub use config::MAX_THREADS;
pub use object::{
    CleanupFn, ObjectDescriptor, ObjectFlags, ObjectType, TypeInfo, TypeTable,
    OBJECT_TYPE_COUNT,
};
pub use thread_index::{ThreadIndex, ThreadIndexTable};
pub use validate::{InitCheck, TypeCheck};

/// Error taxonomy for object access and lifecycle operations.
///
/// Every error propagates to the immediate caller; nothing is retried
/// internally. A validation failure aborts the invoking privileged
/// operation (fatal to that call, not to the kernel); allocation and
/// index exhaustion are recoverable at the caller's discretion.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ObjectError {
    /// The pointer names no known object, or one of the wrong kind.
    #[error("object not found or wrong type")]
    UnknownOrWrongType,

    /// The calling thread's permission bit is clear and the object is
    /// not public.
    #[error("calling thread lacks permission")]
    PermissionDenied,

    /// The caller required an initialized object.
    #[error("object is not initialized")]
    Uninitialized,

    /// The caller required a not-yet-initialized object.
    #[error("object is already initialized")]
    AlreadyInitialized,

    /// The kind cannot be dynamically allocated.
    #[error("object type {kind:?} cannot be dynamically allocated")]
    Forbidden {
        /// The refused kind.
        kind: ObjectType,
    },

    /// Backing-storage allocation failed.
    #[error("out of memory (requested: {requested} bytes)")]
    OutOfMemory {
        /// Bytes the failed allocation asked for.
        requested: usize,
    },

    /// No free thread index remains.
    #[error("thread index space exhausted")]
    Exhausted,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, ObjectError>;
