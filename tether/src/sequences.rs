use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Boundary, Cursor, Handle, Seq, Tag, UsageError};

/// Iterator handles box a shared cursor so it can be advanced without
/// keeping the handle pool locked.
pub type SharedCursor<E> = Arc<Mutex<Cursor<E>>>;

/// Handle-level sequence and iterator operations for one element type.
///
/// Callbacks receive *lent* element handles: boxed just before the call and
/// released right after it returns.
pub struct SequenceBridge<E> {
    pub elem: Tag<E>,
    pub seq: Tag<Seq<E>>,
    pub iter: Tag<SharedCursor<E>>,
}

impl<E> Clone for SequenceBridge<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for SequenceBridge<E> {}

impl<E> SequenceBridge<E>
where
    E: Clone + PartialEq + Send + Sync + 'static,
{
    /// Registers `<name>_seq` and `<name>_seq_iterator` next to an already
    /// registered element type.
    pub fn register(b: &Boundary, elem: Tag<E>, name: &str) -> Self {
        Self {
            elem,
            seq: b.register(&format!("{name}_seq")),
            iter: b.register(&format!("{name}_seq_iterator")),
        }
    }

    pub fn get(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
    ) -> Result<Seq<E>, UsageError> {
        b.read(h, self.seq)
    }

    pub fn wrap(&self, b: &Boundary, seq: Seq<E>) -> Handle<Seq<E>> {
        b.box_value(self.seq, seq)
    }

    fn lend<R>(
        &self,
        b: &Boundary,
        item: &E,
        f: impl FnOnce(Handle<E>) -> R,
    ) -> R {
        let lent = b.box_value(self.elem, item.clone());
        let out = f(lent);
        b.handles.release(lent.addr());
        out
    }

    pub fn empty(&self, b: &Boundary) -> Handle<Seq<E>> {
        self.wrap(b, Seq::empty())
    }

    pub fn singleton(
        &self,
        b: &Boundary,
        item: Handle<E>,
    ) -> Result<Handle<Seq<E>>, UsageError> {
        let item = b.read(item, self.elem)?;
        Ok(self.wrap(b, Seq::singleton(item)))
    }

    pub fn is_empty(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
    ) -> Result<bool, UsageError> {
        Ok(self.get(b, h)?.is_empty())
    }

    pub fn length(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
    ) -> Result<usize, UsageError> {
        Ok(self.get(b, h)?.len())
    }

    pub fn append(
        &self,
        b: &Boundary,
        x: Handle<Seq<E>>,
        y: Handle<Seq<E>>,
    ) -> Result<Handle<Seq<E>>, UsageError> {
        let joined = self.get(b, x)?.append(&self.get(b, y)?);
        Ok(self.wrap(b, joined))
    }

    /// `None` when `pos..pos + len` is outside the sequence.
    pub fn sub(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        pos: usize,
        len: usize,
    ) -> Result<Option<Handle<Seq<E>>>, UsageError> {
        Ok(self.get(b, h)?.sub(pos, len).map(|s| self.wrap(b, s)))
    }

    pub fn take(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        n: usize,
    ) -> Result<Handle<Seq<E>>, UsageError> {
        let taken = self.get(b, h)?.take(n);
        Ok(self.wrap(b, taken))
    }

    pub fn drop(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        n: usize,
    ) -> Result<Handle<Seq<E>>, UsageError> {
        let dropped = self.get(b, h)?.drop(n);
        Ok(self.wrap(b, dropped))
    }

    pub fn iter(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        mut f: impl FnMut(Handle<E>),
    ) -> Result<(), UsageError> {
        for item in self.get(b, h)?.iter() {
            self.lend(b, &item, &mut f);
        }
        Ok(())
    }

    /// Homogeneous map. The handle returned by `f` is consumed: read back
    /// as the new element, then released.
    pub fn map(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        mut f: impl FnMut(Handle<E>) -> Handle<E>,
    ) -> Result<Handle<Seq<E>>, UsageError> {
        let source = self.get(b, h)?;
        let mut mapped = Vec::with_capacity(source.len());
        for item in source.iter() {
            let value = self.lend(b, &item, |lent| {
                let produced = f(lent);
                let value = b.read(produced, self.elem);
                if produced != lent {
                    b.handles.release(produced.addr());
                }
                value
            })?;
            mapped.push(value);
        }
        Ok(self.wrap(b, Seq::from_vec(mapped)))
    }

    /// First element satisfying `pred`, boxed as a new handle.
    pub fn find(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        mut pred: impl FnMut(Handle<E>) -> bool,
    ) -> Result<Option<Handle<E>>, UsageError> {
        let found = self
            .get(b, h)?
            .find(|item| self.lend(b, item, &mut pred));
        Ok(found.map(|item| b.box_value(self.elem, item)))
    }

    pub fn exists(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        mut pred: impl FnMut(Handle<E>) -> bool,
    ) -> Result<bool, UsageError> {
        Ok(self.get(b, h)?.exists(|item| self.lend(b, item, &mut pred)))
    }

    pub fn for_all(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        mut pred: impl FnMut(Handle<E>) -> bool,
    ) -> Result<bool, UsageError> {
        Ok(self.get(b, h)?.for_all(|item| self.lend(b, item, &mut pred)))
    }

    pub fn count(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        mut pred: impl FnMut(Handle<E>) -> bool,
    ) -> Result<usize, UsageError> {
        Ok(self.get(b, h)?.count(|item| self.lend(b, item, &mut pred)))
    }

    pub fn mem(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
        item: Handle<E>,
    ) -> Result<bool, UsageError> {
        let item = b.read(item, self.elem)?;
        Ok(self.get(b, h)?.mem(&item))
    }

    pub fn iterator(
        &self,
        b: &Boundary,
        h: Handle<Seq<E>>,
    ) -> Result<Handle<SharedCursor<E>>, UsageError> {
        let cursor = Cursor::new(self.get(b, h)?);
        Ok(b.box_value(self.iter, Arc::new(Mutex::new(cursor))))
    }

    fn cursor(
        &self,
        b: &Boundary,
        it: Handle<SharedCursor<E>>,
    ) -> Result<SharedCursor<E>, UsageError> {
        b.read(it, self.iter)
    }

    /// Current element as a new handle, then advance. `None` once exhausted.
    pub fn next(
        &self,
        b: &Boundary,
        it: Handle<SharedCursor<E>>,
    ) -> Result<Option<Handle<E>>, UsageError> {
        let item = self.cursor(b, it)?.lock().next();
        Ok(item.map(|item| b.box_value(self.elem, item)))
    }

    /// Current element as a new handle, without advancing.
    pub fn value(
        &self,
        b: &Boundary,
        it: Handle<SharedCursor<E>>,
    ) -> Result<Option<Handle<E>>, UsageError> {
        let item = self.cursor(b, it)?.lock().value().cloned();
        Ok(item.map(|item| b.box_value(self.elem, item)))
    }

    pub fn has_next(
        &self,
        b: &Boundary,
        it: Handle<SharedCursor<E>>,
    ) -> Result<bool, UsageError> {
        Ok(self.cursor(b, it)?.lock().has_next())
    }

    pub fn reset(
        &self,
        b: &Boundary,
        it: Handle<SharedCursor<E>>,
    ) -> Result<(), UsageError> {
        self.cursor(b, it)?.lock().reset();
        Ok(())
    }
}
