//! Validator
//!
//! The single gate every privileged operation passes before touching an
//! object a user thread named. Three checks in a fixed order, first
//! failure wins:
//!
//! 1. resolution + type: the pointer must name a known object of the
//!    expected kind (static table first, then the dynamic registry)
//! 2. permission: the caller's bit must be set, unless the object is
//!    public
//! 3. initialization state: the object's `INITIALIZED` flag must match
//!    the caller's expectation
//!
//! Validation never mutates anything. The two narrow flag flips a caller
//! performs around its own init work (`mark_initialized`,
//! `clear_initialized`) live here too.

use crate::broker::ObjectBroker;
use crate::object::ObjectType;
use crate::thread_index::ThreadIndex;
use crate::{ObjectError, Result};

/// Expected object kind for a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheck {
    /// Any kind passes the type check.
    AnyType,

    /// Only this kind passes.
    Exactly(ObjectType),
}

/// Expected initialization state for a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitCheck {
    /// Don't care.
    AnyState,

    /// The object must already be initialized.
    Initialized,

    /// The object must not yet be initialized (init-entry path).
    Uninitialized,
}

impl ObjectBroker {
    /// Gate a privileged operation on the object at `addr`.
    ///
    /// Returns the object's kind on success so `AnyType` callers can
    /// dispatch on it. Failure order is fixed: a wrong-typed object
    /// reports [`ObjectError::UnknownOrWrongType`] even when the caller
    /// also lacks permission.
    pub fn validate(
        &self,
        addr: usize,
        type_check: TypeCheck,
        init_check: InitCheck,
        caller: ThreadIndex,
    ) -> Result<ObjectType> {
        let inner = self.inner.lock();

        let desc = Self::resolve(&inner, addr).ok_or(ObjectError::UnknownOrWrongType)?;
        if let TypeCheck::Exactly(expected) = type_check {
            if desc.kind() != expected {
                return Err(ObjectError::UnknownOrWrongType);
            }
        }

        if !desc.is_public() && !desc.is_granted(caller) {
            return Err(ObjectError::PermissionDenied);
        }

        match init_check {
            InitCheck::Initialized if !desc.is_initialized() => {
                Err(ObjectError::Uninitialized)
            }
            InitCheck::Uninitialized if desc.is_initialized() => {
                Err(ObjectError::AlreadyInitialized)
            }
            _ => Ok(desc.kind()),
        }
    }

    /// Record that the object at `addr` finished its type-specific
    /// initialization. Guarded only by descriptor existence.
    pub fn mark_initialized(&self, addr: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let desc =
            Self::resolve_mut(&mut inner, addr).ok_or(ObjectError::UnknownOrWrongType)?;
        desc.mark_initialized();
        Ok(())
    }

    /// Return the object at `addr` to the uninitialized state.
    pub fn clear_initialized(&self, addr: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let desc =
            Self::resolve_mut(&mut inner, addr).ok_or(ObjectError::UnknownOrWrongType)?;
        desc.clear_initialized();
        Ok(())
    }
}
