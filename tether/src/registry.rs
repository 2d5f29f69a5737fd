use std::{
    any::Any,
    collections::{HashMap, HashSet},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use parking_lot::RwLock;

use crate::UsageError;

/// Identity of a registered type, allocated in registration order.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered type's identity plus the Rust representation of its values.
///
/// Several tags may share a representation (e.g. two registered types both
/// stored as `String`); the tag, not the Rust type, is what a handle is
/// checked against.
pub struct Tag<T> {
    id: TypeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Tag<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Tag<T> {}

impl<T> fmt::Debug for Tag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.id)
    }
}

impl<T> Tag<T> {
    #[inline]
    pub fn id(self) -> TypeId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: Arc<str>,
    pub compatible: HashSet<TypeId>,
}

/// Converts a boxed subtype value into the base type's representation.
pub(crate) type Upcast = Arc<
    dyn Fn(&(dyn Any + Send + Sync)) -> Option<Box<dyn Any + Send>>
        + Send
        + Sync,
>;

struct TypeRegistryImpl {
    types: Vec<TypeDescriptor>,
    by_name: HashMap<Arc<str>, TypeId>,
    // keyed by (sub, base)
    upcasts: HashMap<(TypeId, TypeId), Upcast>,
}

pub struct TypeRegistry(RwLock<TypeRegistryImpl>);

impl TypeRegistryImpl {
    fn new() -> Self {
        Self {
            types: Vec::new(),
            by_name: HashMap::new(),
            upcasts: HashMap::new(),
        }
    }

    fn register(&mut self, name: &str) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        let name: Arc<str> = Arc::from(name);
        if self.by_name.contains_key(&name) {
            log::warn!("type name `{name}` registered again as {id}");
        }
        self.by_name.insert(name.clone(), id);
        self.types.push(TypeDescriptor {
            id,
            name,
            compatible: HashSet::new(),
        });
        id
    }

    fn get(&self, id: TypeId) -> Result<&TypeDescriptor, UsageError> {
        self.types
            .get(id.index())
            .ok_or(UsageError::UnknownType { id })
    }

    fn get_mut(
        &mut self,
        id: TypeId,
    ) -> Result<&mut TypeDescriptor, UsageError> {
        self.types
            .get_mut(id.index())
            .ok_or(UsageError::UnknownType { id })
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self(RwLock::new(TypeRegistryImpl::new()))
    }

    /// Allocates the next identity for a type whose values are stored as `T`.
    pub fn register<T: Any + Send>(&self, name: &str) -> Tag<T> {
        let id = self.0.write().register(name);
        log::debug!("registered type `{name}` as {id}");
        Tag {
            id,
            _marker: PhantomData,
        }
    }

    /// Makes handles tagged `sub` readable through `base`. One-directional
    /// and not transitive.
    pub fn declare_subtype(
        &self,
        sub: TypeId,
        base: TypeId,
    ) -> Result<(), UsageError> {
        let mut inner = self.0.write();
        inner.get(sub)?;
        inner.get_mut(base)?.compatible.insert(sub);
        Ok(())
    }

    /// Like [`declare_subtype`](Self::declare_subtype), for a subtype whose
    /// representation differs from the base's.
    pub fn declare_subtype_with<S, B, F>(
        &self,
        sub: Tag<S>,
        base: Tag<B>,
        upcast: F,
    ) -> Result<(), UsageError>
    where
        S: Any + Send + Sync,
        B: Any + Send,
        F: Fn(&S) -> B + Send + Sync + 'static,
    {
        self.declare_subtype(sub.id, base.id)?;
        let upcast: Upcast = Arc::new(move |value: &(dyn Any + Send + Sync)| {
            let value = value.downcast_ref::<S>()?;
            Some(Box::new(upcast(value)) as Box<dyn Any + Send>)
        });
        self.0.write().upcasts.insert((sub.id, base.id), upcast);
        Ok(())
    }

    pub fn is_compatible(&self, actual: TypeId, expected: TypeId) -> bool {
        if actual == expected {
            return true;
        }
        self.0
            .read()
            .get(expected)
            .is_ok_and(|d| d.compatible.contains(&actual))
    }

    pub(crate) fn upcast(&self, sub: TypeId, base: TypeId) -> Option<Upcast> {
        self.0.read().upcasts.get(&(sub, base)).cloned()
    }

    pub fn descriptor(&self, id: TypeId) -> Option<TypeDescriptor> {
        self.0.read().get(id).ok().cloned()
    }

    pub fn name_of(&self, id: TypeId) -> Arc<str> {
        match self.0.read().get(id) {
            Ok(d) => d.name.clone(),
            Err(_) => Arc::from(format!("<unregistered {id}>")),
        }
    }

    /// Latest registration under `name`.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.0.read().by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.read().types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
