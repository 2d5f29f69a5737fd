//! Drives the exported C functions against the process-wide boundary.
//!
//! The error slot is global, so every test holds `SERIAL` for its whole body.

use core::ffi::{CStr, c_char, c_void};
use std::{ffi::CString, fs};

use parking_lot::Mutex;
use tether::*;

static SERIAL: Mutex<()> = Mutex::new(());

fn text(s: &str) -> Handle<String> {
    let s = CString::new(s).unwrap();
    let h = unsafe { tether_text_create(s.as_ptr()) };
    assert!(!h.is_null());
    h
}

fn take_string(s: *const c_char) -> String {
    assert!(!s.is_null());
    let out = unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_owned();
    tether_free(s as *mut c_void);
    out
}

fn read_text(h: Handle<String>) -> String {
    take_string(tether_text_to_string(h))
}

fn last_error() -> String {
    take_string(tether_error_message())
}

fn words_of(seq: Handle<Seq<String>>) -> Vec<String> {
    let it = tether_text_seq_iterator_create(seq);
    let mut out = Vec::new();
    loop {
        let w = tether_text_seq_iterator_next(it);
        if w.is_null() {
            break;
        }
        out.push(read_text(w));
        tether_free(w.as_ptr());
    }
    tether_free(it.as_ptr());
    out
}

#[test]
fn error_channel_persists_until_cleared() {
    let _guard = SERIAL.lock();
    tether_error_clear();
    assert_eq!(last_error(), DEFAULT_ERROR_MESSAGE);

    let bad = b"\xff\0";
    let h = unsafe { tether_text_create(bad.as_ptr() as *const c_char) };
    assert!(h.is_null());
    let message = last_error();
    assert!(message.starts_with("text is not valid UTF-8"), "{message}");

    // a successful call leaves the slot alone
    let ok = text("eax");
    assert_eq!(last_error(), message);

    tether_error_clear();
    assert_eq!(last_error(), DEFAULT_ERROR_MESSAGE);
    tether_free(ok.as_ptr());
}

#[test]
fn strings_exclude_the_terminator() {
    let _guard = SERIAL.lock();
    let h = text("r15");
    let s = tether_text_to_string(h);
    assert_eq!(tether_string_length(s), 3);
    assert_eq!(take_string(s), "r15");
    tether_free(h.as_ptr());
}

#[test]
fn free_releases_both_kinds_and_ignores_repeats() {
    let _guard = SERIAL.lock();
    let b = boundary();
    let (handles, strings) = (b.live_handles(), b.live_strings());

    let h = text("cfg");
    let s = tether_text_to_string(h);
    assert_eq!(b.live_handles(), handles + 1);
    assert_eq!(b.live_strings(), strings + 1);

    tether_free(s as *mut c_void);
    tether_free(h.as_ptr());
    tether_free(h.as_ptr());
    tether_free(s as *mut c_void);
    tether_free(core::ptr::null_mut());
    assert_eq!((b.live_handles(), b.live_strings()), (handles, strings));
}

#[test]
fn split_iterate_and_join() {
    let _guard = SERIAL.lock();
    let t = text("push  ebp\tmov ebp");
    let words = unsafe { tether_text_split(t, core::ptr::null()) };
    assert_eq!(tether_text_seq_length(words), 4);
    assert_eq!(words_of(words), ["push", "ebp", "mov", "ebp"]);

    let prefix = text("<");
    let params = JoinParams {
        separator: c"|".as_ptr(),
        prefix,
        suffix: Handle::null(),
    };
    let joined = unsafe { tether_text_join(words, &params) };
    assert_eq!(read_text(joined), "<push|ebp|mov|ebp");

    let spaced = unsafe { tether_text_join(words, core::ptr::null()) };
    assert_eq!(read_text(spaced), "push ebp mov ebp");

    for h in [t, words.cast(), prefix, joined, spaced] {
        tether_free(h.as_ptr());
    }
}

#[test]
fn empty_separator_reports_through_the_error_channel() {
    let _guard = SERIAL.lock();
    let t = text("a,b");
    let words = unsafe { tether_text_split(t, c"".as_ptr()) };
    assert!(words.is_null());
    assert_eq!(last_error(), "separator must not be empty");
    tether_error_clear();
    tether_free(t.as_ptr());
}

#[test]
fn compare_uses_order_ordinals() {
    let _guard = SERIAL.lock();
    let (a, b) = (text("add"), text("sub"));
    let offset = boundary().settings.enum_offset;
    assert_eq!(tether_text_compare(a, b), Order::Less.to_int(offset));
    assert_eq!(tether_text_compare(b, a), Order::Greater.to_int(offset));
    assert!(tether_text_equal(a, a));
    assert!(!tether_text_equal(a, b));
    tether_free(a.as_ptr());
    tether_free(b.as_ptr());
}

#[test]
fn sub_take_drop_at_the_edges() {
    let _guard = SERIAL.lock();
    let t = text("a b c");
    let s = unsafe { tether_text_split(t, core::ptr::null()) };

    let mid = tether_text_seq_sub(s, 1, 2);
    assert_eq!(words_of(mid), ["b", "c"]);
    assert!(tether_text_seq_sub(s, 2, 2).is_null());
    assert!(tether_text_seq_sub(s, -1, 1).is_null());

    let none = tether_text_seq_take(s, -3);
    let all = tether_text_seq_drop(s, -3);
    assert!(tether_text_seq_is_empty(none));
    assert_eq!(tether_text_seq_length(all), 3);
    assert_eq!(tether_text_seq_length(tether_text_seq_take(s, 10)), 3);

    let tail = tether_text_seq_drop(s, 1);
    let joined = tether_text_seq_append(tail, mid);
    assert_eq!(words_of(joined), ["b", "c", "b", "c"]);
}

unsafe extern "C" fn starts_with_b(w: Handle<String>, _: *mut c_void) -> bool {
    read_text(w).starts_with('b')
}

unsafe extern "C" fn collect(w: Handle<String>, data: *mut c_void) {
    let out = unsafe { &mut *(data as *mut Vec<String>) };
    out.push(read_text(w));
}

unsafe extern "C" fn shout(
    w: Handle<String>,
    _: *mut c_void,
) -> Handle<String> {
    text(&read_text(w).to_uppercase())
}

unsafe extern "C" fn identity(
    w: Handle<String>,
    _: *mut c_void,
) -> Handle<String> {
    w
}

#[test]
fn callbacks_over_the_c_surface() {
    let _guard = SERIAL.lock();
    let t = text("bx ax bp");
    let s = unsafe { tether_text_split(t, core::ptr::null()) };
    let data = core::ptr::null_mut();

    let mut seen: Vec<String> = Vec::new();
    let out = &mut seen as *mut Vec<String> as *mut c_void;
    unsafe { tether_text_seq_iter(s, Some(collect), out) };
    assert_eq!(seen, ["bx", "ax", "bp"]);

    let count = unsafe { tether_text_seq_count(s, Some(starts_with_b), data) };
    assert_eq!(count, 2);
    assert!(unsafe { tether_text_seq_exists(s, Some(starts_with_b), data) });
    assert!(!unsafe { tether_text_seq_forall(s, Some(starts_with_b), data) });

    let found = unsafe { tether_text_seq_find(s, Some(starts_with_b), data) };
    assert_eq!(read_text(found), "bx");
    assert!(tether_text_seq_mem(s, found));

    let before = boundary().live_handles();
    let loud = unsafe { tether_text_seq_map(s, Some(shout), data) };
    assert_eq!(boundary().live_handles(), before + 1);
    assert_eq!(words_of(loud), ["BX", "AX", "BP"]);

    let same = unsafe { tether_text_seq_map(s, Some(identity), data) };
    assert_eq!(words_of(same), ["bx", "ax", "bp"]);
}

#[test]
fn iterator_value_has_next_and_reset() {
    let _guard = SERIAL.lock();
    let one = text("nop");
    let s = tether_text_seq_singleton(one);
    let it = tether_text_seq_iterator_create(s);

    assert!(tether_text_seq_iterator_has_next(it));
    let v = tether_text_seq_iterator_value(it);
    assert_eq!(read_text(v), "nop");
    let n = tether_text_seq_iterator_next(it);
    assert!(!tether_text_seq_iterator_has_next(it));
    assert!(tether_text_seq_iterator_next(it).is_null());
    assert!(tether_text_seq_iterator_value(it).is_null());

    tether_text_seq_iterator_reset(it);
    assert!(tether_text_seq_iterator_has_next(it));

    let empty = tether_text_seq_empty();
    let done = tether_text_seq_iterator_create(empty);
    assert!(!tether_text_seq_iterator_has_next(done));

    for h in [one, v, n] {
        tether_free(h.as_ptr());
    }
    for h in [s, empty] {
        tether_free(h.as_ptr());
    }
    for h in [it, done] {
        tether_free(h.as_ptr());
    }
}

#[test]
fn init_reports_failure_as_status_one() {
    let _guard = SERIAL.lock();
    tether_error_clear();
    assert_eq!(unsafe { tether_init(core::ptr::null()) }, 0);

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("riscv.plugin"), b"").unwrap();
    let good = CString::new(dir.path().to_str().unwrap()).unwrap();
    let params = InitParams {
        plugin_path: good.as_ptr(),
        ..Default::default()
    };
    assert_eq!(unsafe { tether_init(&params) }, 0);

    let missing = dir.path().join("missing");
    let missing = CString::new(missing.to_str().unwrap()).unwrap();
    let params = InitParams {
        plugin_path: missing.as_ptr(),
        ..Default::default()
    };
    assert_eq!(unsafe { tether_init(&params) }, 1);
    assert_eq!(last_error(), DEFAULT_ERROR_MESSAGE);
}

#[test]
fn version_matches_the_package() {
    let _guard = SERIAL.lock();
    assert_eq!(take_string(tether_version()), env!("CARGO_PKG_VERSION"));
}
