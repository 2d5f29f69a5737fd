use std::{fmt, mem, sync::Arc};

type Thunk<E> = Arc<dyn Fn() -> Seq<E> + Send + Sync>;

enum Node<E> {
    Nil,
    // never empty: start < end
    Slice {
        items: Arc<[E]>,
        start: usize,
        end: usize,
    },
    Concat {
        left: Seq<E>,
        right: Seq<E>,
    },
    // re-run every time the node is looked through
    Lazy(Thunk<E>),
}

/// Immutable, structurally shared sequence.
///
/// Slicing operations (`take`, `drop`, `sub`, head/tail splitting) share the
/// backing storage of slice nodes. Lazy nodes are not memoized: every
/// traversal that reaches one forces it again.
pub struct Seq<E>(Arc<Node<E>>);

impl<E> Clone for Seq<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E> Drop for Seq<E> {
    // Append chains can be arbitrarily deep; unlink them iteratively.
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach(&mut self.0, &mut pending);
        while let Some(mut node) = pending.pop() {
            detach(&mut node, &mut pending);
        }
    }
}

fn detach<E>(node: &mut Arc<Node<E>>, pending: &mut Vec<Arc<Node<E>>>) {
    if let Some(Node::Concat { left, right }) = Arc::get_mut(node) {
        pending.push(mem::replace(&mut left.0, Arc::new(Node::Nil)));
        pending.push(mem::replace(&mut right.0, Arc::new(Node::Nil)));
    }
}

impl<E> Seq<E> {
    pub fn empty() -> Self {
        Self(Arc::new(Node::Nil))
    }

    pub fn lazy(force: impl Fn() -> Seq<E> + Send + Sync + 'static) -> Self {
        Self(Arc::new(Node::Lazy(Arc::new(force))))
    }

    fn slice(items: &Arc<[E]>, start: usize, end: usize) -> Self {
        if start >= end {
            return Self::empty();
        }
        Self(Arc::new(Node::Slice {
            items: Arc::clone(items),
            start,
            end,
        }))
    }

    fn is_nil(&self) -> bool {
        matches!(*self.0, Node::Nil)
    }

    pub fn append(&self, other: &Seq<E>) -> Seq<E> {
        if self.is_nil() {
            return other.clone();
        }
        if other.is_nil() {
            return self.clone();
        }
        Self(Arc::new(Node::Concat {
            left: self.clone(),
            right: other.clone(),
        }))
    }
}

impl<E: Clone + Send + Sync + 'static> Seq<E> {
    pub fn singleton(item: E) -> Self {
        Self::from_vec(vec![item])
    }

    pub fn from_vec(items: Vec<E>) -> Self {
        let end = items.len();
        Self::slice(&Arc::from(items), 0, end)
    }

    /// Splits into head and tail, forcing lazy nodes on the way.
    ///
    /// Concatenations are walked with an explicit stack, and the tail comes
    /// back nested to the right, so walking on from it is constant time per
    /// step.
    pub fn split(&self) -> Option<(E, Seq<E>)> {
        let mut current = self.clone();
        let mut pending = Vec::new();
        loop {
            let next = match &*current.0 {
                Node::Nil => pending.pop()?,
                Node::Slice { items, start, end } => {
                    let head = items[*start].clone();
                    let tail = Self::slice(items, start + 1, *end);
                    return Some((head, Self::chain(tail, pending)));
                }
                Node::Concat { left, right } => {
                    pending.push(right.clone());
                    left.clone()
                }
                Node::Lazy(force) => force(),
            };
            current = next;
        }
    }

    // `first`, then `pending` from the top of the stack down.
    fn chain(first: Seq<E>, pending: Vec<Seq<E>>) -> Seq<E> {
        let rest = pending
            .iter()
            .fold(Seq::empty(), |rest, part| part.append(&rest));
        first.append(&rest)
    }

    pub fn is_empty(&self) -> bool {
        let mut pending = vec![self.clone()];
        while let Some(seq) = pending.pop() {
            match &*seq.0 {
                Node::Nil => {}
                Node::Slice { .. } => return false,
                Node::Concat { left, right } => {
                    pending.push(right.clone());
                    pending.push(left.clone());
                }
                Node::Lazy(force) => pending.push(force()),
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut pending = vec![self.clone()];
        while let Some(seq) = pending.pop() {
            match &*seq.0 {
                Node::Nil => {}
                Node::Slice { start, end, .. } => len += end - start,
                Node::Concat { left, right } => {
                    pending.push(right.clone());
                    pending.push(left.clone());
                }
                Node::Lazy(force) => pending.push(force()),
            }
        }
        len
    }

    pub fn iter(&self) -> Elements<E> {
        Elements { rest: self.clone() }
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.iter().collect()
    }

    /// First `n` elements, or the whole sequence if it is shorter.
    pub fn take(&self, n: usize) -> Seq<E> {
        if let Node::Lazy(_) = &*self.0 {
            let this = self.clone();
            return Seq::lazy(move || this.force_once().take(n));
        }
        let mut parts = Vec::new();
        let mut remaining = n;
        let mut pending = vec![self.clone()];
        while remaining > 0 {
            let Some(seq) = pending.pop() else {
                break;
            };
            match &*seq.0 {
                Node::Nil => {}
                Node::Slice { items, start, end } => {
                    let len = end - start;
                    if remaining < len {
                        let cut = start + remaining;
                        parts.push(Self::slice(items, *start, cut));
                        remaining = 0;
                    } else {
                        parts.push(seq.clone());
                        remaining -= len;
                    }
                }
                Node::Concat { left, right } => {
                    pending.push(right.clone());
                    pending.push(left.clone());
                }
                Node::Lazy(force) => pending.push(force()),
            }
        }
        parts
            .iter()
            .rev()
            .fold(Seq::empty(), |rest, part| part.append(&rest))
    }

    /// Everything after the first `n` elements.
    pub fn drop(&self, n: usize) -> Seq<E> {
        if let Node::Lazy(_) = &*self.0 {
            let this = self.clone();
            return Seq::lazy(move || this.force_once().drop(n));
        }
        let mut remaining = n;
        let mut current = self.clone();
        let mut pending = Vec::new();
        loop {
            if remaining == 0 {
                return Self::chain(current, pending);
            }
            let next = match &*current.0 {
                Node::Nil => pending.pop(),
                Node::Slice { items, start, end } => {
                    let len = end - start;
                    if remaining < len {
                        let rest = Self::slice(items, start + remaining, *end);
                        return Self::chain(rest, pending);
                    }
                    remaining -= len;
                    pending.pop()
                }
                Node::Concat { left, right } => {
                    pending.push(right.clone());
                    Some(left.clone())
                }
                Node::Lazy(force) => Some(force()),
            };
            match next {
                Some(next) => current = next,
                None => return Seq::empty(),
            }
        }
    }

    /// `len` elements starting at `pos`; `None` when the range does not fit.
    pub fn sub(&self, pos: usize, len: usize) -> Option<Seq<E>> {
        let end = pos.checked_add(len)?;
        if end > self.len() {
            return None;
        }
        Some(self.drop(pos).take(len))
    }

    fn force_once(&self) -> Seq<E> {
        match &*self.0 {
            Node::Lazy(force) => force(),
            _ => self.clone(),
        }
    }

    pub fn map(&self, mut f: impl FnMut(&E) -> E) -> Seq<E> {
        Self::from_vec(self.iter().map(|e| f(&e)).collect())
    }

    pub fn for_each(&self, mut f: impl FnMut(&E)) {
        self.iter().for_each(|e| f(&e));
    }

    pub fn find(&self, mut pred: impl FnMut(&E) -> bool) -> Option<E> {
        self.iter().find(|e| pred(e))
    }

    pub fn exists(&self, mut pred: impl FnMut(&E) -> bool) -> bool {
        self.iter().any(|e| pred(&e))
    }

    pub fn for_all(&self, mut pred: impl FnMut(&E) -> bool) -> bool {
        self.iter().all(|e| pred(&e))
    }

    pub fn count(&self, mut pred: impl FnMut(&E) -> bool) -> usize {
        self.iter().filter(|e| pred(e)).count()
    }

    pub fn mem(&self, item: &E) -> bool
    where
        E: PartialEq,
    {
        self.iter().any(|e| e == *item)
    }
}

/// Consuming traversal built on [`Seq::split`].
pub struct Elements<E> {
    rest: Seq<E>,
}

impl<E: Clone + Send + Sync + 'static> Iterator for Elements<E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        let (head, tail) = self.rest.split()?;
        self.rest = tail;
        Some(head)
    }
}

impl<E: Clone + Send + Sync + 'static> FromIterator<E> for Seq<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<E: Clone + PartialEq + Send + Sync + 'static> PartialEq for Seq<E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.iter().eq(other.iter())
    }
}

impl<E: Clone + fmt::Debug + Send + Sync + 'static> fmt::Debug for Seq<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

enum CursorState<E> {
    HasValue(E, Seq<E>),
    Exhausted,
}

/// Pull cursor over a [`Seq`]. Owns its own state; the source is never
/// touched, so any number of cursors may walk one sequence.
pub struct Cursor<E> {
    source: Seq<E>,
    state: CursorState<E>,
}

impl<E: Clone + Send + Sync + 'static> Cursor<E> {
    pub fn new(source: Seq<E>) -> Self {
        let state = Self::derive(&source);
        Self { source, state }
    }

    fn derive(seq: &Seq<E>) -> CursorState<E> {
        match seq.split() {
            Some((head, tail)) => CursorState::HasValue(head, tail),
            None => CursorState::Exhausted,
        }
    }

    /// Returns the current element and moves past it.
    pub fn next(&mut self) -> Option<E> {
        match mem::replace(&mut self.state, CursorState::Exhausted) {
            CursorState::HasValue(head, rest) => {
                self.state = Self::derive(&rest);
                Some(head)
            }
            CursorState::Exhausted => None,
        }
    }

    pub fn value(&self) -> Option<&E> {
        match &self.state {
            CursorState::HasValue(head, _) => Some(head),
            CursorState::Exhausted => None,
        }
    }

    pub fn has_next(&self) -> bool {
        matches!(self.state, CursorState::HasValue(..))
    }

    /// Re-derives the first state from the source, re-forcing any lazy
    /// nodes in front of it.
    pub fn reset(&mut self) {
        self.state = Self::derive(&self.source);
    }
}
