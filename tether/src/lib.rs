//! Opaque handles, managed strings and lazy sequences for unmanaged callers.
//!
//! A [`Boundary`] owns a [`TypeRegistry`], a [`HandlePool`], a
//! [`StringPool`] and the last-error [`ErrorSlot`]. The exported `tether_*`
//! functions operate on the process-wide instance returned by [`boundary`].

mod abi;
mod boundary;
mod enumeration;
mod error;
mod handles;
mod init;
mod registry;
mod sequence;
mod sequences;
mod strings;
mod text;

pub use abi::{
    OrTrap, Predicate, Transform, Visit, callback, initialize,
    tether_error_clear, tether_error_message, tether_free, tether_init,
    tether_string_length, tether_version, to_c_int, trap,
};
pub use boundary::{
    Boundary, BoundaryCreateInfo, BoundarySettings, boundary, install,
};
pub use enumeration::{Enumeration, Order};
pub use error::{
    BoundaryError, BoxError, DEFAULT_ERROR_MESSAGE, ErrorSlot, UsageError,
};
pub use handles::{Handle, HandlePool};
pub use init::{
    InitOptions, InitParams, Initializer, PLUGIN_EXTENSION, PLUGIN_PATH_VAR,
    PluginDiscovery, init_logging,
};
pub use registry::{Tag, TypeDescriptor, TypeId, TypeRegistry};
pub use sequence::{Cursor, Elements, Seq};
pub use sequences::{SequenceBridge, SharedCursor};
pub use strings::StringPool;
pub use text::*;
