use core::ffi::{CStr, c_char, c_void};
use std::{any::Any, sync::OnceLock};

use crate::{
    BoundaryError, ErrorSlot, Handle, HandlePool, StringPool, Tag, TypeId,
    TypeRegistry, UsageError,
};

#[derive(Debug, Default, Clone)]
pub struct BoundaryCreateInfo {
    pub handle_capacity: Option<usize>,
    pub string_capacity: Option<usize>,
    // first ordinal of exported enumerations
    pub enum_offset: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
pub struct BoundarySettings {
    pub handle_capacity: usize,
    pub string_capacity: usize,
    pub enum_offset: i32,
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            handle_capacity: 64,
            string_capacity: 64,
            enum_offset: 0,
        }
    }
}

impl From<&BoundaryCreateInfo> for BoundarySettings {
    fn from(info: &BoundaryCreateInfo) -> Self {
        let default = Self::default();
        Self {
            handle_capacity: info
                .handle_capacity
                .unwrap_or(default.handle_capacity),
            string_capacity: info
                .string_capacity
                .unwrap_or(default.string_capacity),
            enum_offset: info.enum_offset.unwrap_or(default.enum_offset),
        }
    }
}

/// Everything the unmanaged side talks to: the type registry, both pools
/// and the last-error slot.
pub struct Boundary {
    pub registry: TypeRegistry,
    pub handles: HandlePool,
    pub strings: StringPool,
    pub errors: ErrorSlot,
    pub settings: BoundarySettings,
}

static BOUNDARY: OnceLock<Boundary> = OnceLock::new();

/// The process-wide boundary, created with default settings on first use.
pub fn boundary() -> &'static Boundary {
    BOUNDARY.get_or_init(|| Boundary::new(&BoundaryCreateInfo::default()))
}

/// Installs the process-wide boundary. Fails (returning `info` back) once
/// [`boundary`] has already been used.
pub fn install(info: BoundaryCreateInfo) -> Result<(), BoundaryCreateInfo> {
    let mut created = false;
    BOUNDARY.get_or_init(|| {
        created = true;
        Boundary::new(&info)
    });
    if created { Ok(()) } else { Err(info) }
}

impl Boundary {
    pub fn new(info: &BoundaryCreateInfo) -> Self {
        let settings = BoundarySettings::from(info);
        log::debug!("creating boundary with {settings:?}");
        Self {
            registry: TypeRegistry::new(),
            handles: HandlePool::with_capacity(settings.handle_capacity),
            strings: StringPool::with_capacity(settings.string_capacity),
            errors: ErrorSlot::new(),
            settings,
        }
    }

    pub fn register<T: Any + Send>(&self, name: &str) -> Tag<T> {
        self.registry.register(name)
    }

    pub fn declare_subtype(
        &self,
        sub: TypeId,
        base: TypeId,
    ) -> Result<(), UsageError> {
        self.registry.declare_subtype(sub, base)
    }

    pub fn box_value<T: Any + Send + Sync>(
        &self,
        tag: Tag<T>,
        value: T,
    ) -> Handle<T> {
        self.handles.insert(tag, value)
    }

    /// Total view: the handle must be live and of a compatible type.
    pub fn read<T: Any + Clone>(
        &self,
        handle: Handle<T>,
        tag: Tag<T>,
    ) -> Result<T, UsageError> {
        if handle.is_null() {
            return Err(UsageError::NullHandle {
                expected: self.registry.name_of(tag.id()).to_string(),
            });
        }
        self.handles.read(&self.registry, handle.addr(), tag)
    }

    /// Nullable view: the null handle reads as `None`.
    pub fn read_nullable<T: Any + Clone>(
        &self,
        handle: Handle<T>,
        tag: Tag<T>,
    ) -> Result<Option<T>, UsageError> {
        self.handles.read_nullable(&self.registry, handle.addr(), tag)
    }

    pub fn write_string(&self, text: impl AsRef<[u8]>) -> *const c_char {
        self.strings.write(text)
    }

    pub fn read_string(
        &self,
        ptr: *const c_char,
    ) -> Result<String, UsageError> {
        self.strings.read(ptr as usize)
    }

    /// Single release entry point: string pool first, then the handle pool.
    pub fn free(&self, addr: *mut c_void) {
        let addr = addr as usize;
        if addr == 0 {
            return;
        }
        if self.strings.is_managed(addr) {
            self.strings.release(addr);
        } else {
            self.handles.release(addr);
        }
    }

    /// Borrowed C text from the caller. Null and invalid UTF-8 are
    /// descriptive failures.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a NUL-terminated buffer.
    pub unsafe fn borrow_text<'a>(
        &self,
        ptr: *const c_char,
    ) -> Result<&'a str, BoundaryError> {
        if ptr.is_null() {
            return Err(BoundaryError::NullString);
        }
        let c = unsafe { CStr::from_ptr(ptr) };
        Ok(c.to_str()?)
    }

    pub fn live_handles(&self) -> usize {
        self.handles.live()
    }

    pub fn live_strings(&self) -> usize {
        self.strings.live()
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self::new(&BoundaryCreateInfo::default())
    }
}
