use core::ffi::c_char;
use std::collections::HashMap;

use parking_lot::Mutex;

use crate::UsageError;

/// A NUL-terminated byte string stored in 16-bit words, so its address is
/// always even. Handle keys are odd; the two can never collide.
struct Buffer {
    words: Box<[u16]>,
    // logical bytes, terminator excluded
    len: usize,
}

impl Buffer {
    fn new(logical: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(logical.len() + 2);
        bytes.extend_from_slice(logical);
        bytes.push(0);
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        let words = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect();
        Self {
            words,
            len: logical.len(),
        }
    }

    fn addr(&self) -> usize {
        self.words.as_ptr() as usize
    }

    fn bytes(&self) -> Vec<u8> {
        self.words
            .iter()
            .flat_map(|w| w.to_ne_bytes())
            .take(self.len)
            .collect()
    }
}

struct StringPoolImpl {
    // address -> buffer; the address is the buffer's own data pointer, so a
    // C reader can use it directly.
    buffers: HashMap<usize, Buffer>,
}

/// Byte buffers lent to the unmanaged side as C strings.
///
/// Independent from the [`HandlePool`](crate::HandlePool): string addresses
/// are never readable as handles and vice versa.
pub struct StringPool(Mutex<StringPoolImpl>);

impl StringPool {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Mutex::new(StringPoolImpl {
            buffers: HashMap::with_capacity(capacity),
        }))
    }

    /// Copies `text` into a fresh buffer followed by a terminator.
    ///
    /// Text is cut at its first embedded NUL, so the stored length always
    /// matches what `strlen` sees on the C side. No interning.
    pub fn write(&self, text: impl AsRef<[u8]>) -> *const c_char {
        let bytes = text.as_ref();
        let logical = match bytes.iter().position(|&b| b == 0) {
            Some(cut) => {
                log::debug!(
                    "string truncated at embedded NUL ({cut} of {} bytes)",
                    bytes.len()
                );
                &bytes[..cut]
            }
            None => bytes,
        };
        let buffer = Buffer::new(logical);
        let addr = buffer.addr();
        self.0.lock().buffers.insert(addr, buffer);
        log::trace!("wrote string {addr:#x} ({} bytes)", logical.len());
        addr as *const c_char
    }

    fn with_buffer<R>(
        &self,
        addr: usize,
        f: impl FnOnce(&Buffer) -> R,
    ) -> Result<R, UsageError> {
        let inner = self.0.lock();
        let buffer = inner
            .buffers
            .get(&addr)
            .ok_or(UsageError::NotAString { address: addr })?;
        Ok(f(buffer))
    }

    /// Logical bytes, terminator excluded.
    pub fn read_bytes(&self, addr: usize) -> Result<Vec<u8>, UsageError> {
        self.with_buffer(addr, Buffer::bytes)
    }

    pub fn read(&self, addr: usize) -> Result<String, UsageError> {
        let bytes = self.read_bytes(addr)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Logical length, terminator excluded.
    pub fn length(&self, addr: usize) -> Result<usize, UsageError> {
        self.with_buffer(addr, |b| b.len)
    }

    pub fn is_managed(&self, addr: usize) -> bool {
        self.0.lock().buffers.contains_key(&addr)
    }

    pub fn release(&self, addr: usize) -> bool {
        let removed = self.0.lock().buffers.remove(&addr).is_some();
        if removed {
            log::trace!("released string {addr:#x}");
        }
        removed
    }

    pub fn live(&self) -> usize {
        self.0.lock().buffers.len()
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ffi::CStr;
    use proptest::prelude::*;

    #[test]
    fn buffer_is_nul_terminated_and_readable_from_c() {
        let pool = StringPool::new();
        let ptr = pool.write("x86_64");
        let c = unsafe { CStr::from_ptr(ptr) };
        assert_eq!(c.to_bytes(), b"x86_64");
        assert_eq!(pool.length(ptr as usize).unwrap(), 6);
    }

    #[test]
    fn empty_text_still_gets_a_distinct_buffer() {
        let pool = StringPool::new();
        let a = pool.write("");
        let b = pool.write("");
        assert_ne!(a, b);
        assert_eq!(pool.read(a as usize).unwrap(), "");
        assert_eq!(pool.length(b as usize).unwrap(), 0);
    }

    #[test]
    fn identical_text_is_not_interned() {
        let pool = StringPool::new();
        let a = pool.write("mov");
        let b = pool.write("mov");
        assert_ne!(a, b);
        assert!(pool.release(a as usize));
        assert_eq!(pool.read(b as usize).unwrap(), "mov");
    }

    #[test]
    fn embedded_terminator_truncates_consistently() {
        let pool = StringPool::new();
        let ptr = pool.write("ab\0cd");
        let addr = ptr as usize;
        assert_eq!(pool.read(addr).unwrap(), "ab");
        assert_eq!(pool.length(addr).unwrap(), 2);
        assert_eq!(pool.read_bytes(addr).unwrap(), b"ab");
        assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_bytes(), b"ab");
    }

    #[test]
    fn unmanaged_and_released_addresses_are_rejected() {
        let pool = StringPool::new();
        let ptr = pool.write("eax");
        assert!(pool.is_managed(ptr as usize));
        assert!(pool.release(ptr as usize));
        assert!(!pool.release(ptr as usize));
        assert!(!pool.is_managed(ptr as usize));
        assert_eq!(
            pool.read(ptr as usize).unwrap_err(),
            UsageError::NotAString {
                address: ptr as usize
            }
        );
    }

    #[test]
    fn addresses_are_even() {
        let pool = StringPool::new();
        for text in ["", "a", "ab", "abc", "r8d"] {
            let ptr = pool.write(text);
            assert_eq!(ptr as usize % 2, 0, "{text:?} at {ptr:p}");
            assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_str().unwrap(), text);
        }
    }

    proptest! {
        #[test]
        fn text_without_nul_round_trips(s in "[^\\x00]*") {
            let pool = StringPool::new();
            let addr = pool.write(&s) as usize;
            prop_assert_eq!(pool.read(addr).unwrap(), s.clone());
            prop_assert_eq!(pool.length(addr).unwrap(), s.len());
        }
    }
}
