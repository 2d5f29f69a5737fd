//! Flat C surface over the process-wide [`Boundary`](crate::Boundary).
//!
//! Every handle or string returned here is owned by the caller and must be
//! released exactly once with [`tether_free`]. Passing an address that does
//! not name a live object of the expected type is a usage violation and
//! aborts the process with a descriptive message.

use core::ffi::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use crate::{
    Handle, InitOptions, InitParams, Initializer, PluginDiscovery, UsageError,
    boundary, builtins, init_logging,
};

/// Callback applied to each element; the handle is only valid during the
/// call.
pub type Visit<T> = unsafe extern "C" fn(Handle<T>, *mut c_void);
pub type Predicate<T> = unsafe extern "C" fn(Handle<T>, *mut c_void) -> bool;
/// Returns a new handle (or its argument); the bridge takes ownership of it.
pub type Transform<T> =
    unsafe extern "C" fn(Handle<T>, *mut c_void) -> Handle<T>;

#[cold]
pub fn trap(error: UsageError) -> ! {
    log::error!("usage violation: {error}");
    panic!("usage violation: {error}");
}

/// Turns a usage error into a trap.
pub trait OrTrap<T> {
    fn or_trap(self) -> T;
}

impl<T> OrTrap<T> for Result<T, UsageError> {
    #[inline]
    fn or_trap(self) -> T {
        match self {
            Ok(value) => value,
            Err(error) => trap(error),
        }
    }
}

pub fn callback<F>(f: Option<F>) -> F {
    match f {
        Some(f) => f,
        None => trap(UsageError::NullCallback),
    }
}

/// Signed count for the C side, saturating.
pub fn to_c_int(n: usize) -> c_int {
    c_int::try_from(n).unwrap_or(c_int::MAX)
}

/// Runs `initializer` with logging set up first. Every failure, including a
/// panic, collapses to status `1`; the error slot is not touched.
pub fn initialize(
    options: &InitOptions,
    initializer: &dyn Initializer,
) -> c_int {
    init_logging(options.log_filter.as_deref());
    builtins();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        initializer.initialize(options)
    }));
    match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(error)) => {
            log::error!("initialization failed: {error}");
            1
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::error!("initialization panicked: {message}");
            1
        }
    }
}

/// Version of this library as a managed string.
#[unsafe(no_mangle)]
pub extern "C" fn tether_version() -> *const c_char {
    boundary().write_string(env!("CARGO_PKG_VERSION"))
}

/// Sets up logging and discovers plugins. Returns `0` on success and `1` on
/// any failure.
///
/// # Safety
///
/// `params` must be null or point to a valid [`InitParams`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_init(params: *const InitParams) -> c_int {
    let options = unsafe { InitOptions::from_params(params) };
    initialize(&options, &PluginDiscovery)
}

/// Description of the last descriptive failure, as a managed string.
#[unsafe(no_mangle)]
pub extern "C" fn tether_error_message() -> *const c_char {
    let b = boundary();
    b.write_string(b.errors.get())
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_error_clear() {
    boundary().errors.clear();
}

/// Releases a handle or a managed string. Null and already released
/// addresses are ignored.
#[unsafe(no_mangle)]
pub extern "C" fn tether_free(addr: *mut c_void) {
    boundary().free(addr);
}

/// Length of a managed string, terminator excluded.
#[unsafe(no_mangle)]
pub extern "C" fn tether_string_length(s: *const c_char) -> c_int {
    to_c_int(boundary().strings.length(s as usize).or_trap())
}

/// Exports the sequence and iterator surface of one element type.
///
/// `bridge` must evaluate to a [`SequenceBridge`](crate::SequenceBridge) of
/// `elem` registered on the process-wide boundary.
#[macro_export]
macro_rules! export_sequence {
    (
        elem: $elem:ty,
        bridge: $bridge:expr,
        seq {
            empty: $empty:ident,
            singleton: $singleton:ident,
            is_empty: $is_empty:ident,
            length: $length:ident,
            append: $append:ident,
            sub: $sub:ident,
            take: $take:ident,
            drop: $drop:ident,
            iter: $iter:ident,
            map: $map:ident,
            find: $find:ident,
            exists: $exists:ident,
            forall: $forall:ident,
            count: $count:ident,
            mem: $mem:ident $(,)?
        }
        iterator {
            create: $create:ident,
            next: $next:ident,
            value: $value:ident,
            has_next: $has_next:ident,
            reset: $reset:ident $(,)?
        }
    ) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn $empty() -> $crate::Handle<$crate::Seq<$elem>> {
            $bridge.empty($crate::boundary())
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $singleton(
            item: $crate::Handle<$elem>,
        ) -> $crate::Handle<$crate::Seq<$elem>> {
            use $crate::OrTrap;
            $bridge.singleton($crate::boundary(), item).or_trap()
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $is_empty(
            seq: $crate::Handle<$crate::Seq<$elem>>,
        ) -> bool {
            use $crate::OrTrap;
            $bridge.is_empty($crate::boundary(), seq).or_trap()
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $length(
            seq: $crate::Handle<$crate::Seq<$elem>>,
        ) -> ::core::ffi::c_int {
            use $crate::OrTrap;
            $crate::to_c_int($bridge.length($crate::boundary(), seq).or_trap())
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $append(
            x: $crate::Handle<$crate::Seq<$elem>>,
            y: $crate::Handle<$crate::Seq<$elem>>,
        ) -> $crate::Handle<$crate::Seq<$elem>> {
            use $crate::OrTrap;
            $bridge.append($crate::boundary(), x, y).or_trap()
        }

        /// Null when the range is negative or does not fit.
        #[unsafe(no_mangle)]
        pub extern "C" fn $sub(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            pos: ::core::ffi::c_int,
            len: ::core::ffi::c_int,
        ) -> $crate::Handle<$crate::Seq<$elem>> {
            use $crate::OrTrap;
            let b = $crate::boundary();
            // validates the handle even when the range is rejected
            $bridge.get(b, seq).or_trap();
            match (usize::try_from(pos), usize::try_from(len)) {
                (Ok(pos), Ok(len)) => $bridge
                    .sub(b, seq, pos, len)
                    .or_trap()
                    .unwrap_or($crate::Handle::null()),
                _ => $crate::Handle::null(),
            }
        }

        /// Negative counts take nothing.
        #[unsafe(no_mangle)]
        pub extern "C" fn $take(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            n: ::core::ffi::c_int,
        ) -> $crate::Handle<$crate::Seq<$elem>> {
            use $crate::OrTrap;
            let n = usize::try_from(n).unwrap_or(0);
            $bridge.take($crate::boundary(), seq, n).or_trap()
        }

        /// Negative counts drop nothing.
        #[unsafe(no_mangle)]
        pub extern "C" fn $drop(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            n: ::core::ffi::c_int,
        ) -> $crate::Handle<$crate::Seq<$elem>> {
            use $crate::OrTrap;
            let n = usize::try_from(n).unwrap_or(0);
            $bridge.drop($crate::boundary(), seq, n).or_trap()
        }

        /// # Safety
        ///
        /// `f` must be safe to call with `data`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $iter(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            f: Option<$crate::Visit<$elem>>,
            data: *mut ::core::ffi::c_void,
        ) {
            use $crate::OrTrap;
            let f = $crate::callback(f);
            $bridge
                .iter($crate::boundary(), seq, |h| unsafe { f(h, data) })
                .or_trap()
        }

        /// # Safety
        ///
        /// `f` must be safe to call with `data`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $map(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            f: Option<$crate::Transform<$elem>>,
            data: *mut ::core::ffi::c_void,
        ) -> $crate::Handle<$crate::Seq<$elem>> {
            use $crate::OrTrap;
            let f = $crate::callback(f);
            $bridge
                .map($crate::boundary(), seq, |h| unsafe { f(h, data) })
                .or_trap()
        }

        /// # Safety
        ///
        /// `f` must be safe to call with `data`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $find(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            f: Option<$crate::Predicate<$elem>>,
            data: *mut ::core::ffi::c_void,
        ) -> $crate::Handle<$elem> {
            use $crate::OrTrap;
            let f = $crate::callback(f);
            $bridge
                .find($crate::boundary(), seq, |h| unsafe { f(h, data) })
                .or_trap()
                .unwrap_or($crate::Handle::null())
        }

        /// # Safety
        ///
        /// `f` must be safe to call with `data`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $exists(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            f: Option<$crate::Predicate<$elem>>,
            data: *mut ::core::ffi::c_void,
        ) -> bool {
            use $crate::OrTrap;
            let f = $crate::callback(f);
            $bridge
                .exists($crate::boundary(), seq, |h| unsafe { f(h, data) })
                .or_trap()
        }

        /// # Safety
        ///
        /// `f` must be safe to call with `data`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $forall(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            f: Option<$crate::Predicate<$elem>>,
            data: *mut ::core::ffi::c_void,
        ) -> bool {
            use $crate::OrTrap;
            let f = $crate::callback(f);
            $bridge
                .for_all($crate::boundary(), seq, |h| unsafe { f(h, data) })
                .or_trap()
        }

        /// # Safety
        ///
        /// `f` must be safe to call with `data`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $count(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            f: Option<$crate::Predicate<$elem>>,
            data: *mut ::core::ffi::c_void,
        ) -> ::core::ffi::c_int {
            use $crate::OrTrap;
            let f = $crate::callback(f);
            let n = $bridge
                .count($crate::boundary(), seq, |h| unsafe { f(h, data) })
                .or_trap();
            $crate::to_c_int(n)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $mem(
            seq: $crate::Handle<$crate::Seq<$elem>>,
            item: $crate::Handle<$elem>,
        ) -> bool {
            use $crate::OrTrap;
            $bridge.mem($crate::boundary(), seq, item).or_trap()
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $create(
            seq: $crate::Handle<$crate::Seq<$elem>>,
        ) -> $crate::Handle<$crate::SharedCursor<$elem>> {
            use $crate::OrTrap;
            $bridge.iterator($crate::boundary(), seq).or_trap()
        }

        /// Current element, or null once exhausted; advances.
        #[unsafe(no_mangle)]
        pub extern "C" fn $next(
            it: $crate::Handle<$crate::SharedCursor<$elem>>,
        ) -> $crate::Handle<$elem> {
            use $crate::OrTrap;
            $bridge
                .next($crate::boundary(), it)
                .or_trap()
                .unwrap_or($crate::Handle::null())
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $value(
            it: $crate::Handle<$crate::SharedCursor<$elem>>,
        ) -> $crate::Handle<$elem> {
            use $crate::OrTrap;
            $bridge
                .value($crate::boundary(), it)
                .or_trap()
                .unwrap_or($crate::Handle::null())
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $has_next(
            it: $crate::Handle<$crate::SharedCursor<$elem>>,
        ) -> bool {
            use $crate::OrTrap;
            $bridge.has_next($crate::boundary(), it).or_trap()
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $reset(
            it: $crate::Handle<$crate::SharedCursor<$elem>>,
        ) {
            use $crate::OrTrap;
            $bridge.reset($crate::boundary(), it).or_trap()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, InitOptions};
    use std::cell::Cell;

    struct Scripted<F: Fn() -> Result<(), BoxError>>(F);

    impl<F: Fn() -> Result<(), BoxError>> Initializer for Scripted<F> {
        fn initialize(&self, _: &InitOptions) -> Result<(), BoxError> {
            (self.0)()
        }
    }

    #[test]
    fn initialize_collapses_failures_to_one() {
        let options = InitOptions::default();
        let ok = Scripted(|| -> Result<(), BoxError> { Ok(()) });
        let failing =
            Scripted(|| -> Result<(), BoxError> { Err("no plugins".into()) });
        let panicking =
            Scripted(|| -> Result<(), BoxError> { panic!("loader crashed") });
        assert_eq!(initialize(&options, &ok), 0);
        assert_eq!(initialize(&options, &failing), 1);
        assert_eq!(initialize(&options, &panicking), 1);
    }

    #[test]
    fn initialize_leaves_the_error_slot_alone() {
        let calls = Cell::new(0);
        let options = InitOptions::default();
        let failing = Scripted(|| -> Result<(), BoxError> {
            calls.set(calls.get() + 1);
            Err("broken plugin".into())
        });
        assert_eq!(initialize(&options, &failing), 1);
        assert_eq!(calls.get(), 1);
        assert_ne!(boundary().errors.get(), "broken plugin");
    }

    #[test]
    fn discovery_over_an_empty_path_succeeds() {
        let options = InitOptions::default();
        assert_eq!(initialize(&options, &PluginDiscovery), 0);
    }

    #[test]
    #[should_panic(expected = "usage violation")]
    fn or_trap_panics_with_the_usage_error() {
        let r: Result<(), UsageError> = Err(UsageError::NullCallback);
        r.or_trap();
    }

    #[test]
    fn counts_saturate() {
        assert_eq!(to_c_int(3), 3);
        assert_eq!(to_c_int(usize::MAX), c_int::MAX);
    }
}
