use core::ffi::c_void;
use std::{any::Any, collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use parking_lot::Mutex;

use crate::{Tag, TypeId, TypeRegistry, UsageError};

/// Opaque, pointer-sized address handed to the unmanaged side.
///
/// `T` only documents which registered type the address is expected to
/// name; nothing is checked until the address is read back through a pool.
#[repr(transparent)]
pub struct Handle<T> {
    addr: *mut c_void,
    _marker: PhantomData<*const T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", self.addr)
    }
}

impl<T> Handle<T> {
    #[inline(always)]
    pub const fn null() -> Self {
        Self {
            addr: core::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn from_addr(addr: usize) -> Self {
        Self {
            addr: addr as *mut c_void,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self {
            addr: ptr,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn addr(self) -> usize {
        self.addr as usize
    }

    #[inline(always)]
    pub fn as_ptr(self) -> *mut c_void {
        self.addr
    }

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.addr.is_null()
    }

    #[inline(always)]
    pub fn cast<U>(self) -> Handle<U> {
        Handle::from_ptr(self.addr)
    }
}

// Handle keys are odd; managed string addresses are even.
const HANDLE_TAG: usize = 1;

#[inline(always)]
fn tag_serial(serial: usize) -> usize {
    (serial << 1) | HANDLE_TAG
}

struct Entry {
    tag: TypeId,
    value: Arc<dyn Any + Send + Sync>,
}

struct HandlePoolImpl {
    // Keyed by a tagged serial. Serials only grow, so a released key is
    // never handed out again.
    entries: HashMap<usize, Entry>,
    next_serial: usize,
}

/// Table of boxed, type-tagged values owned on behalf of the unmanaged side.
pub struct HandlePool(Mutex<HandlePoolImpl>);

impl HandlePool {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Mutex::new(HandlePoolImpl {
            entries: HashMap::with_capacity(capacity),
            next_serial: 1,
        }))
    }

    /// Boxes `value` under a fresh key.
    pub fn insert<T: Any + Send + Sync>(
        &self,
        tag: Tag<T>,
        value: T,
    ) -> Handle<T> {
        let entry = Entry {
            tag: tag.id(),
            value: Arc::new(value),
        };
        let mut inner = self.0.lock();
        let addr = tag_serial(inner.next_serial);
        inner.next_serial += 1;
        inner.entries.insert(addr, entry);
        drop(inner);
        log::trace!("boxed {addr:#x} as {}", tag.id());
        Handle::from_addr(addr)
    }

    /// Typed read-back. Fails if `addr` is not live or its tag is neither
    /// `tag` nor declared compatible with it.
    ///
    /// The pool lock is released before the value is cloned or converted.
    pub fn read<T: Any + Clone>(
        &self,
        registry: &TypeRegistry,
        addr: usize,
        tag: Tag<T>,
    ) -> Result<T, UsageError> {
        let (actual, value) = {
            let inner = self.0.lock();
            let entry = inner
                .entries
                .get(&addr)
                .ok_or(UsageError::Dangling { address: addr })?;
            (entry.tag, Arc::clone(&entry.value))
        };
        let mismatch = || UsageError::TypeMismatch {
            expected: registry.name_of(tag.id()).to_string(),
            actual: registry.name_of(actual).to_string(),
        };

        if actual == tag.id() {
            return value.downcast_ref::<T>().cloned().ok_or_else(mismatch);
        }
        if !registry.is_compatible(actual, tag.id()) {
            return Err(mismatch());
        }
        if let Some(value) = value.downcast_ref::<T>() {
            return Ok(value.clone());
        }
        registry
            .upcast(actual, tag.id())
            .and_then(|upcast| upcast(&*value))
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|value| *value)
            .ok_or_else(|| UsageError::Representation {
                expected: registry.name_of(tag.id()).to_string(),
                actual: registry.name_of(actual).to_string(),
            })
    }

    /// As [`read`](Self::read), but the null address reads as `None`.
    pub fn read_nullable<T: Any + Clone>(
        &self,
        registry: &TypeRegistry,
        addr: usize,
        tag: Tag<T>,
    ) -> Result<Option<T>, UsageError> {
        if addr == 0 {
            return Ok(None);
        }
        self.read(registry, addr, tag).map(Some)
    }

    /// Drops the entry at `addr`. Returns whether anything was removed;
    /// releasing a non-resident address is a no-op.
    pub fn release(&self, addr: usize) -> bool {
        // the guard is gone before the entry drops
        let removed = self.0.lock().entries.remove(&addr);
        match removed {
            Some(entry) => {
                log::trace!("released {addr:#x} ({})", entry.tag);
                true
            }
            None => {
                log::debug!("release of non-resident handle {addr:#x} ignored");
                false
            }
        }
    }

    pub fn live(&self) -> usize {
        self.0.lock().entries.len()
    }
}

impl Default for HandlePool {
    fn default() -> Self {
        Self::new()
    }
}
