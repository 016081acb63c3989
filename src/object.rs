//! Object descriptors, type tags, and the type table
//!
//! Every kernel object a user thread can name has one descriptor: its
//! identity (address), a closed type tag, lifecycle flags, and a
//! permission bitmap with one bit per thread index. Descriptors for
//! statically declared objects come from the boot-time table; dynamic
//! descriptors are minted by the broker's allocator.
//!
//! ## Type table
//!
//! Size, alignment and the optional cleanup hook for each object kind are
//! a closed, build-time mapping indexed by tag ([`TypeTable`]), not a
//! switch chain. Deployments hand their table to the broker at
//! construction; kinds absent from the table cannot be dynamically
//! allocated.

use core::alloc::Layout;
use core::ptr::NonNull;

use bitflags::bitflags;

use crate::bitset::PermBits;
use crate::thread_index::ThreadIndex;

/// Closed enumeration of kernel object kinds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Counting semaphore
    Semaphore = 0,

    /// Priority-inheriting mutex
    Mutex = 1,

    /// Bounded message queue
    MsgQueue = 2,

    /// Thread execution stack
    Stack = 3,

    /// Byte-stream pipe
    Pipe = 4,

    /// One-shot / periodic timer
    Timer = 5,

    /// Thread control block
    Thread = 6,

    /// Futex word - lives in user-writable memory, kernel holds no storage
    Futex = 7,

    /// Application heap - size is application-defined, not in the table
    Heap = 8,

    /// Device instance - bound to hardware, no alignment rule of its own
    Device = 9,
}

/// Number of object kinds (table width).
pub const OBJECT_TYPE_COUNT: usize = 10;

impl ObjectType {
    /// Table index for this kind.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Kinds that can never be dynamically allocated:
    /// - `Futex`: the backing word must live in user-writable memory
    /// - `Heap`: indeterminate size
    /// - `Device`: bound to hardware, no size/alignment rule
    #[inline]
    pub const fn dynamic_forbidden(self) -> bool {
        matches!(self, ObjectType::Futex | ObjectType::Heap | ObjectType::Device)
    }
}

bitflags! {
    /// Lifecycle flags carried by every descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u8 {
        /// Object has completed its type-specific initialization.
        const INITIALIZED = 1 << 0;

        /// Permission checks always pass for this object.
        /// Monotonic: there is no un-public operation.
        const PUBLIC = 1 << 1;

        /// Descriptor is owned by the dynamic allocator and is reclaimed
        /// when its last permission bit clears.
        const ALLOCATED = 1 << 2;
    }
}

/// Cleanup hook invoked on an object's backing storage just before it is
/// reclaimed (e.g. flushing pending waiters off a message queue).
/// Must be bounded and non-blocking: it runs under the broker lock.
pub type CleanupFn = fn(NonNull<u8>);

/// Size, alignment and optional cleanup hook for one object kind.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    /// Backing storage size in bytes (non-zero).
    pub size: usize,

    /// Backing storage alignment (power of two).
    pub align: usize,

    /// Type-specific teardown, run exactly once per object destruction.
    pub cleanup: Option<CleanupFn>,
}

impl TypeInfo {
    /// Entry with no cleanup hook.
    pub const fn new(size: usize, align: usize) -> Self {
        Self {
            size,
            align,
            cleanup: None,
        }
    }

    /// Entry with a cleanup hook.
    pub const fn with_cleanup(size: usize, align: usize, cleanup: CleanupFn) -> Self {
        Self {
            size,
            align,
            cleanup: Some(cleanup),
        }
    }

    /// Allocation layout for this kind, `None` if the entry is malformed.
    pub fn layout(&self) -> Option<Layout> {
        Layout::from_size_align(self.size, self.align).ok()
    }
}

/// Closed mapping from object kind to its [`TypeInfo`].
///
/// Kinds with no entry (the forbidden set) cannot be dynamically
/// allocated. The table is expected to live for the life of the kernel
/// (`&'static`), matching its build-time-generated origin.
pub struct TypeTable {
    entries: [Option<TypeInfo>; OBJECT_TYPE_COUNT],
}

impl TypeTable {
    /// Build a table from explicit entries, indexed by [`ObjectType::index`].
    pub const fn new(entries: [Option<TypeInfo>; OBJECT_TYPE_COUNT]) -> Self {
        Self { entries }
    }

    /// Default sizes/alignments for the built-in kinds.
    ///
    /// Cleanup hooks are deployment-specific and default to `None`; attach
    /// them with [`TypeTable::with_cleanup`].
    pub const fn kernel_defaults() -> Self {
        let mut entries: [Option<TypeInfo>; OBJECT_TYPE_COUNT] = [None; OBJECT_TYPE_COUNT];
        entries[ObjectType::Semaphore.index()] = Some(TypeInfo::new(32, 8));
        entries[ObjectType::Mutex.index()] = Some(TypeInfo::new(40, 8));
        entries[ObjectType::MsgQueue.index()] = Some(TypeInfo::new(96, 8));
        entries[ObjectType::Stack.index()] = Some(TypeInfo::new(4096, 16));
        entries[ObjectType::Pipe.index()] = Some(TypeInfo::new(64, 8));
        entries[ObjectType::Timer.index()] = Some(TypeInfo::new(64, 8));
        entries[ObjectType::Thread.index()] = Some(TypeInfo::new(512, 16));
        // Futex/Heap/Device: no entry, never dynamically allocated.
        Self { entries }
    }

    /// Replace the cleanup hook for `kind`, keeping size/alignment.
    /// No-op for kinds with no entry.
    pub const fn with_cleanup(mut self, kind: ObjectType, cleanup: CleanupFn) -> Self {
        let i = kind.index();
        self.entries[i] = match self.entries[i] {
            Some(info) => Some(TypeInfo {
                size: info.size,
                align: info.align,
                cleanup: Some(cleanup),
            }),
            None => None,
        };
        self
    }

    /// Look up the entry for `kind`.
    #[inline]
    pub fn info(&self, kind: ObjectType) -> Option<&TypeInfo> {
        self.entries[kind.index()].as_ref()
    }
}

/// Per-object metadata record: identity, type tag, lifecycle flags, and
/// the permission bitmap.
///
/// Static descriptors are built at boot and live forever; dynamic
/// descriptors are created by the broker's allocator and destroyed exactly
/// once, by explicit `destroy` or by the last-permission-cleared check.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    addr: usize,
    kind: ObjectType,
    flags: ObjectFlags,
    perms: PermBits,
}

impl ObjectDescriptor {
    /// New descriptor with empty flags and no grants.
    pub const fn new(addr: usize, kind: ObjectType) -> Self {
        Self {
            addr,
            kind,
            flags: ObjectFlags::empty(),
            perms: PermBits::new(),
        }
    }

    /// New descriptor with initial flags (for boot-time static tables).
    pub const fn with_flags(addr: usize, kind: ObjectType, flags: ObjectFlags) -> Self {
        Self {
            addr,
            kind,
            flags,
            perms: PermBits::new(),
        }
    }

    /// Object identity: its address.
    #[inline]
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Object kind.
    #[inline]
    pub fn kind(&self) -> ObjectType {
        self.kind
    }

    /// Current lifecycle flags.
    #[inline]
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.flags.contains(ObjectFlags::INITIALIZED)
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.flags.contains(ObjectFlags::PUBLIC)
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.flags.contains(ObjectFlags::ALLOCATED)
    }

    /// Record completed initialization.
    #[inline]
    pub fn mark_initialized(&mut self) {
        self.flags.insert(ObjectFlags::INITIALIZED);
    }

    /// Return the object to the uninitialized state.
    #[inline]
    pub fn clear_initialized(&mut self) {
        self.flags.remove(ObjectFlags::INITIALIZED);
    }

    /// Make permission checks unconditional for this object. Monotonic.
    #[inline]
    pub fn mark_public(&mut self) {
        self.flags.insert(ObjectFlags::PUBLIC);
    }

    /// Mark the descriptor as allocator-owned (auto-free eligible).
    #[inline]
    pub fn mark_allocated(&mut self) {
        self.flags.insert(ObjectFlags::ALLOCATED);
    }

    /// Set the permission bit for `idx`. Idempotent.
    #[inline]
    pub fn grant(&mut self, idx: ThreadIndex) {
        self.perms.set(idx.as_usize());
    }

    /// Clear the permission bit for `idx`. Idempotent.
    ///
    /// The zero-reference check that may follow is the broker's job; a
    /// bare descriptor cannot unlink itself from a registry.
    #[inline]
    pub fn revoke(&mut self, idx: ThreadIndex) {
        self.perms.clear(idx.as_usize());
    }

    /// Test the permission bit for `idx` (ignores `PUBLIC`).
    #[inline]
    pub fn is_granted(&self, idx: ThreadIndex) -> bool {
        self.perms.test(idx.as_usize())
    }

    /// True if any thread index holds a grant.
    #[inline]
    pub fn any_granted(&self) -> bool {
        self.perms.any_set()
    }
}
