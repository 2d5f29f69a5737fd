//! The built-in `text` type and its sequence surface.

use core::ffi::{c_char, c_int};
use std::sync::OnceLock;

use crate::{
    Boundary, BoundaryError, Enumeration, Handle, OrTrap, Order, Seq,
    SequenceBridge, Tag, boundary, export_sequence,
};

/// Tags of the types every boundary carries.
#[derive(Clone, Copy)]
pub struct Builtins {
    pub text: Tag<String>,
    pub text_seq: SequenceBridge<String>,
}

impl Builtins {
    pub fn register(b: &Boundary) -> Self {
        let text = b.register::<String>("text");
        Self {
            text,
            text_seq: SequenceBridge::register(b, text, "text"),
        }
    }
}

static BUILTINS: OnceLock<Builtins> = OnceLock::new();

/// Built-in tags on the process-wide boundary.
pub fn builtins() -> &'static Builtins {
    BUILTINS.get_or_init(|| Builtins::register(boundary()))
}

/// Words of `text` as a lazy sequence; every traversal splits again.
///
/// Without a separator the text is split on runs of whitespace. With one,
/// empty pieces between adjacent separators are kept.
pub fn split_words(
    text: &str,
    separator: Option<&str>,
) -> Result<Seq<String>, BoundaryError> {
    let text = text.to_owned();
    match separator {
        None => Ok(Seq::lazy(move || {
            text.split_whitespace().map(str::to_owned).collect()
        })),
        Some("") => Err(BoundaryError::EmptySeparator),
        Some(separator) => {
            let separator = separator.to_owned();
            Ok(Seq::lazy(move || {
                text.split(separator.as_str()).map(str::to_owned).collect()
            }))
        }
    }
}

pub fn join(
    items: &Seq<String>,
    separator: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> String {
    let mut out = String::from(prefix.unwrap_or_default());
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        out.push_str(&item);
    }
    out.push_str(suffix.unwrap_or_default());
    out
}

/// Parameter bag of [`tether_text_join`]. Every field may be null.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JoinParams {
    /// Placed between elements; defaults to a single space.
    pub separator: *const c_char,
    pub prefix: Handle<String>,
    pub suffix: Handle<String>,
}

impl Default for JoinParams {
    fn default() -> Self {
        Self {
            separator: core::ptr::null(),
            prefix: Handle::null(),
            suffix: Handle::null(),
        }
    }
}

pub const DEFAULT_JOIN_SEPARATOR: &str = " ";

/// Boxes a copy of C text. Null or invalid UTF-8 yields null and sets the
/// last error.
///
/// # Safety
///
/// `s` must be null or point to a NUL-terminated buffer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_text_create(
    s: *const c_char,
) -> Handle<String> {
    let b = boundary();
    b.errors
        .lift(|| unsafe { b.borrow_text(s) }.map(str::to_owned))
        .map(|text| b.box_value(builtins().text, text))
        .unwrap_or(Handle::null())
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_text_to_string(t: Handle<String>) -> *const c_char {
    let b = boundary();
    let text = b.read(t, builtins().text).or_trap();
    b.write_string(text)
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_text_equal(
    x: Handle<String>,
    y: Handle<String>,
) -> bool {
    let b = boundary();
    let tag = builtins().text;
    b.read(x, tag).or_trap() == b.read(y, tag).or_trap()
}

/// An [`Order`] ordinal, shifted by the configured enumeration offset.
#[unsafe(no_mangle)]
pub extern "C" fn tether_text_compare(
    x: Handle<String>,
    y: Handle<String>,
) -> c_int {
    let b = boundary();
    let tag = builtins().text;
    let x = b.read(x, tag).or_trap();
    let y = b.read(y, tag).or_trap();
    Order::from(x.cmp(&y)).to_int(b.settings.enum_offset)
}

/// # Safety
///
/// `separator` must be null or point to a NUL-terminated buffer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_text_split(
    t: Handle<String>,
    separator: *const c_char,
) -> Handle<Seq<String>> {
    let b = boundary();
    let bridge = builtins().text_seq;
    let text = b.read(t, bridge.elem).or_trap();
    let words = b.errors.lift(|| {
        let separator = match separator.is_null() {
            true => None,
            false => Some(unsafe { b.borrow_text(separator) }?),
        };
        split_words(&text, separator)
    });
    words
        .map(|words| bridge.wrap(b, words))
        .unwrap_or(Handle::null())
}

/// # Safety
///
/// `params` must be null or point to a valid [`JoinParams`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_text_join(
    seq: Handle<Seq<String>>,
    params: *const JoinParams,
) -> Handle<String> {
    let b = boundary();
    let bridge = builtins().text_seq;
    let params = unsafe { params.as_ref() }.copied().unwrap_or_default();
    let items = bridge.get(b, seq).or_trap();
    let prefix = b.read_nullable(params.prefix, bridge.elem).or_trap();
    let suffix = b.read_nullable(params.suffix, bridge.elem).or_trap();
    let separator = b.errors.lift(|| match params.separator.is_null() {
        true => Ok(DEFAULT_JOIN_SEPARATOR),
        false => unsafe { b.borrow_text(params.separator) },
    });
    match separator {
        Some(separator) => {
            let joined =
                join(&items, separator, prefix.as_deref(), suffix.as_deref());
            b.box_value(bridge.elem, joined)
        }
        None => Handle::null(),
    }
}

export_sequence! {
    elem: String,
    bridge: builtins().text_seq,
    seq {
        empty: tether_text_seq_empty,
        singleton: tether_text_seq_singleton,
        is_empty: tether_text_seq_is_empty,
        length: tether_text_seq_length,
        append: tether_text_seq_append,
        sub: tether_text_seq_sub,
        take: tether_text_seq_take,
        drop: tether_text_seq_drop,
        iter: tether_text_seq_iter,
        map: tether_text_seq_map,
        find: tether_text_seq_find,
        exists: tether_text_seq_exists,
        forall: tether_text_seq_forall,
        count: tether_text_seq_count,
        mem: tether_text_seq_mem,
    }
    iterator {
        create: tether_text_seq_iterator_create,
        next: tether_text_seq_iterator_next,
        value: tether_text_seq_iterator_value,
        has_next: tether_text_seq_iterator_has_next,
        reset: tether_text_seq_iterator_reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(seq: &Seq<String>) -> Vec<String> {
        seq.to_vec()
    }

    #[test]
    fn whitespace_split_skips_runs() {
        let seq = split_words("  mov  eax,\tebx \n", None).unwrap();
        assert_eq!(words(&seq), ["mov", "eax,", "ebx"]);
        assert!(split_words("   ", None).unwrap().is_empty());
    }

    #[test]
    fn explicit_separator_keeps_empty_pieces() {
        let seq = split_words("a,,b", Some(",")).unwrap();
        assert_eq!(words(&seq), ["a", "", "b"]);
        assert!(matches!(
            split_words("a", Some("")),
            Err(BoundaryError::EmptySeparator)
        ));
    }

    #[test]
    fn join_wraps_with_prefix_and_suffix() {
        let seq = Seq::from_vec(vec!["r0".to_string(), "r1".to_string()]);
        assert_eq!(join(&seq, ", ", Some("{"), Some("}")), "{r0, r1}");
        assert_eq!(join(&Seq::empty(), ", ", Some("["), None), "[");
    }

    #[test]
    fn builtins_register_text_family() {
        let b = Boundary::default();
        let builtins = Builtins::register(&b);
        assert_eq!(&*b.registry.name_of(builtins.text.id()), "text");
        assert_eq!(
            b.registry.lookup("text_seq_iterator"),
            Some(builtins.text_seq.iter.id())
        );
    }
}
