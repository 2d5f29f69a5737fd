use clap::Parser as ClapParser;
use core::ffi::{CStr, c_char, c_void};
use std::{ffi::CString, process};

use tether::{
    Enumeration, Handle, InitParams, JoinParams, Order, boundary,
    tether_error_message, tether_free, tether_init, tether_text_compare,
    tether_text_create, tether_text_join, tether_text_seq_count,
    tether_text_seq_iterator_create, tether_text_seq_iterator_next,
    tether_text_seq_length, tether_text_split, tether_text_to_string,
    tether_version,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Text to split into words
    #[arg(help = "The text pushed through the boundary")]
    text: String,

    /// Split on this separator instead of whitespace
    #[arg(long, short)]
    separator: Option<String>,

    /// Separator used when joining the words back
    #[arg(long, default_value = ", ")]
    join_with: String,

    /// Plugin directories, in the platform's path-list syntax
    #[arg(long)]
    plugin_path: Option<String>,

    /// env_logger filter, e.g. "tether=debug"
    #[arg(long)]
    log_filter: Option<String>,
}

fn c_string(s: &str) -> CString {
    match CString::new(s) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("argument contains a NUL byte: {err}");
            process::exit(2);
        }
    }
}

/// Copies a managed string and releases it.
fn take_string(s: *const c_char) -> String {
    let out = unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned();
    tether_free(s as *mut c_void);
    out
}

fn ptr_or_null(s: &Option<CString>) -> *const c_char {
    s.as_ref().map_or(core::ptr::null(), |s| s.as_ptr())
}

fn last_error() -> String {
    take_string(tether_error_message())
}

unsafe extern "C" fn is_short(word: Handle<String>, data: *mut c_void) -> bool {
    let limit = unsafe { *(data as *const usize) };
    let text = take_string(tether_text_to_string(word));
    text.chars().count() <= limit
}

fn main() {
    let cli = Cli::parse();

    let plugin_path = cli.plugin_path.as_deref().map(c_string);
    let log_filter = cli.log_filter.as_deref().map(c_string);
    let params = InitParams {
        plugin_path: ptr_or_null(&plugin_path),
        log_filter: ptr_or_null(&log_filter),
    };
    if unsafe { tether_init(&params) } != 0 {
        eprintln!("initialization failed");
        process::exit(1);
    }
    println!("tether {}", take_string(tether_version()));

    let input = c_string(&cli.text);
    let text = unsafe { tether_text_create(input.as_ptr()) };
    if text.is_null() {
        eprintln!("Error creating text: {}", last_error());
        process::exit(1);
    }

    let separator = cli.separator.as_deref().map(c_string);
    let words = unsafe { tether_text_split(text, ptr_or_null(&separator)) };
    if words.is_null() {
        eprintln!("Error splitting text: {}", last_error());
        process::exit(1);
    }

    println!("{} word(s)", tether_text_seq_length(words));
    let it = tether_text_seq_iterator_create(words);
    let mut first = Handle::null();
    loop {
        let word = tether_text_seq_iterator_next(it);
        if word.is_null() {
            break;
        }
        println!("  {}", take_string(tether_text_to_string(word)));
        if first.is_null() {
            first = word;
        } else {
            let order = tether_text_compare(first, word);
            let offset = boundary().settings.enum_offset;
            if let Some(order) = Order::from_int(order, offset) {
                log::debug!("first word is {} than this one", order.name());
            }
            tether_free(word.as_ptr());
        }
    }

    let mut limit = 3usize;
    let data = &mut limit as *mut usize as *mut c_void;
    let short = unsafe { tether_text_seq_count(words, Some(is_short), data) };
    println!("{short} word(s) of at most {limit} characters");

    let join_with = c_string(&cli.join_with);
    let joined = unsafe {
        tether_text_join(
            words,
            &JoinParams {
                separator: join_with.as_ptr(),
                ..Default::default()
            },
        )
    };
    println!("{}", take_string(tether_text_to_string(joined)));

    tether_free(joined.as_ptr());
    tether_free(first.as_ptr());
    tether_free(it.as_ptr());
    tether_free(words.as_ptr());
    tether_free(text.as_ptr());
    log::debug!(
        "{} handle(s), {} string(s) still live",
        boundary().live_handles(),
        boundary().live_strings()
    );
}
