//! Type-erased resolved values, resolve arguments and their identities

use crate::{
    error::{BoxError, Error},
    context::AfterResolveContext
};
use futures_util::future::BoxFuture;
use std::{
    any::{Any, TypeId, type_name},
    fmt,
    future::Future,
    hash::{Hash, Hasher},
    sync::Arc
};

pub(crate) type AnyArc = Arc<
    dyn Any
    + Send
    + Sync
>;

/// A resolve argument, passed to providers and used to key scoped caches
pub type Argument = AnyArc;

/// Wraps a value into an [`Argument`]
#[inline]
pub fn argument<T: Send + Sync + 'static>(value: T) -> Argument {
    Arc::new(value)
}

/// A value that needs to release its resources synchronously when its injector is disposed
pub trait Dispose: Send + Sync {
    /// Releases the resources held by the value
    fn dispose(&self) -> Result<(), BoxError>;
}

/// A value that needs to release its resources asynchronously when its injector is disposed
pub trait AsyncDispose: Send + Sync {
    /// Releases the resources held by the value
    fn dispose(&self) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// A value that wants to be notified once the whole object graph of a resolve call is built
pub trait AfterResolve: Send + Sync {
    /// Called after all forward references of the resolve call were patched
    fn after_resolve(&self, context: &AfterResolveContext) -> Result<(), BoxError>;
}

/// An asynchronous version of [`AfterResolve`]; values with it can only be resolved with the async API
pub trait AsyncAfterResolve: Send + Sync {
    /// Called after all forward references of the resolve call were patched
    fn after_resolve(&self, context: AfterResolveContext) -> impl Future<Output = Result<(), BoxError>> + Send;
}

#[derive(Clone, Copy)]
pub(crate) enum Disposer {
    Sync(fn(&AnyArc) -> Result<(), BoxError>),
    Async(fn(AnyArc) -> BoxFuture<'static, Result<(), BoxError>>),
}

impl Disposer {
    pub(crate) fn of<T: Dispose + 'static>() -> Self {
        Self::Sync(|value| match value.downcast_ref::<T>() {
            Some(value) => value.dispose(),
            None => Ok(())
        })
    }

    pub(crate) fn of_async<T: AsyncDispose + 'static>() -> Self {
        Self::Async(|value| Box::pin(async move {
            match value.downcast::<T>() {
                Ok(value) => value.dispose().await,
                Err(_) => Ok(())
            }
        }))
    }
}

#[derive(Clone, Copy)]
pub(crate) enum ValueHook {
    Sync(fn(&AnyArc, &AfterResolveContext) -> Result<(), BoxError>),
    Async(fn(AnyArc, AfterResolveContext) -> BoxFuture<'static, Result<(), BoxError>>),
}

impl ValueHook {
    pub(crate) fn of<T: AfterResolve + 'static>() -> Self {
        Self::Sync(|value, context| match value.downcast_ref::<T>() {
            Some(value) => value.after_resolve(context),
            None => Ok(())
        })
    }

    pub(crate) fn of_async<T: AsyncAfterResolve + 'static>() -> Self {
        Self::Async(|value, context| Box::pin(async move {
            match value.downcast::<T>() {
                Ok(value) => value.after_resolve(context).await,
                Err(_) => Ok(())
            }
        }))
    }
}

/// A resolved value.
///
/// Wraps a shared pointer to a value of any type together with the capabilities
/// the injector has to know about: how to dispose the value and the value's own after-resolve hook.
/// Cloning an [`Instance`] clones the pointer, so two clones are the same instance.
#[derive(Clone)]
pub struct Instance {
    value: AnyArc,
    type_name: &'static str,
    disposer: Option<Disposer>,
    hook: Option<ValueHook>,
}

impl Instance {
    /// Wraps a plain value
    #[inline]
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value
    #[inline]
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: type_name::<T>(),
            disposer: None,
            hook: None
        }
    }

    /// Wraps a value that is disposed together with the injector that resolved it
    #[inline]
    pub fn disposable<T: Dispose + 'static>(value: T) -> Self {
        Self::new(value).with_disposer(Disposer::of::<T>())
    }

    /// Wraps a value that is disposed asynchronously together with the injector that resolved it
    #[inline]
    pub fn async_disposable<T: AsyncDispose + 'static>(value: T) -> Self {
        Self::new(value).with_disposer(Disposer::of_async::<T>())
    }

    /// Wraps a value whose [`AfterResolve`] hook runs once the resolve call that produced it
    /// has built the whole object graph
    #[inline]
    pub fn after_resolve<T: AfterResolve + 'static>(value: T) -> Self {
        Self::new(value).with_hook(ValueHook::of::<T>())
    }

    /// Wraps a value whose [`AsyncAfterResolve`] hook runs once the resolve call that produced it
    /// has built the whole object graph; such a value can only be resolved with the async API
    #[inline]
    pub fn async_after_resolve<T: AsyncAfterResolve + 'static>(value: T) -> Self {
        Self::new(value).with_hook(ValueHook::of_async::<T>())
    }

    #[inline]
    pub(crate) fn with_disposer(mut self, disposer: Disposer) -> Self {
        self.disposer = Some(disposer);
        self
    }

    #[inline]
    pub(crate) fn with_hook(mut self, hook: ValueHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Returns a shared pointer to the value if it is of type `T`
    #[inline]
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// Returns a shared pointer to the value or a type mismatch error
    #[inline]
    pub fn try_downcast<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.downcast::<T>()
            .ok_or_else(|| Error::type_mismatch(type_name::<T>(), self.type_name))
    }

    /// Returns a reference to the value if it is of type `T`
    #[inline]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Downcasts every element of a value produced by a `resolve_all` style provider
    pub fn downcast_all<T: Send + Sync + 'static>(&self) -> Option<Vec<Arc<T>>> {
        self.downcast_ref::<Vec<Instance>>()?
            .iter()
            .map(Instance::downcast::<T>)
            .collect()
    }

    /// Returns `true` if the value is of type `T`
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.value.as_ref().type_id() == TypeId::of::<T>()
    }

    /// Name of the wrapped type
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the value gets disposed with its injector
    #[inline]
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    /// Returns `true` if both instances point to the same value
    #[inline]
    pub fn ptr_eq(this: &Instance, other: &Instance) -> bool {
        this.id() == other.id()
    }

    /// Address of the shared value, unique while the instance is alive
    #[inline]
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.value).cast::<()>() as usize
    }

    #[inline]
    pub(crate) fn value(&self) -> &AnyArc {
        &self.value
    }

    #[inline]
    pub(crate) fn disposer(&self) -> Option<Disposer> {
        self.disposer
    }

    #[inline]
    pub(crate) fn hook(&self) -> Option<ValueHook> {
        self.hook
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}

/// A key that can be compared and hashed without knowing its type
pub(crate) trait IdentityKey: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn IdentityKey) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
}

impl<K: Hash + Eq + Send + Sync + 'static> IdentityKey for K {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn eq_key(&self, other: &dyn IdentityKey) -> bool {
        other.as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }

    #[inline]
    fn hash_key(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// The cache key derived from a resolve argument
#[derive(Clone)]
pub(crate) enum ArgumentIdentity {
    None,
    Reference(usize),
    Key(Arc<dyn IdentityKey>),
}

impl ArgumentIdentity {
    /// Reference identity of an argument
    #[inline]
    pub(crate) fn of(argument: Option<&Argument>) -> Self {
        match argument {
            Some(argument) => Self::Reference(Arc::as_ptr(argument).cast::<()>() as usize),
            None => Self::None
        }
    }

    #[inline]
    pub(crate) fn key<K: Hash + Eq + Send + Sync + 'static>(key: K) -> Self {
        Self::Key(Arc::new(key))
    }
}

impl PartialEq for ArgumentIdentity {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Key(a), Self::Key(b)) => a.eq_key(b.as_ref()),
            _ => false
        }
    }
}

impl Eq for ArgumentIdentity {}

impl Hash for ArgumentIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::None => state.write_u8(0),
            Self::Reference(address) => {
                state.write_u8(1);
                address.hash(state);
            },
            Self::Key(key) => {
                state.write_u8(2);
                key.hash_key(state);
            }
        }
    }
}

/// A cached instance together with the argument it was created for.
///
/// Keeping the argument alive keeps its address, and therefore its reference identity, unique.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    pub(crate) instance: Instance,
    _argument: Option<Argument>,
}

impl CacheEntry {
    #[inline]
    pub(crate) fn new(instance: Instance, argument: Option<Argument>) -> Self {
        Self { instance, _argument: argument }
    }
}
