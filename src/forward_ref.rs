//! Placeholders that break circular dependencies

use crate::{Instance, Token};
use std::{
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        OnceLock,
        atomic::{AtomicBool, Ordering}
    }
};

struct Slot {
    token: Token,
    value: OnceLock<Instance>,
    sealed: AtomicBool,
}

/// The shared cell behind a [`ForwardRef`].
///
/// It's created pending, back-patched when the deferred resolution completes
/// and sealed by the dereference pass; only then it exposes the value.
#[derive(Clone)]
pub(crate) struct ForwardSlot(Arc<Slot>);

impl ForwardSlot {
    pub(crate) fn pending(token: Token) -> Self {
        Self(Arc::new(Slot {
            token,
            value: OnceLock::new(),
            sealed: AtomicBool::new(false)
        }))
    }

    pub(crate) fn resolved(token: Token, instance: Instance) -> Self {
        let slot = Self::pending(token);
        slot.patch(instance);
        slot.seal();
        slot
    }

    #[inline]
    pub(crate) fn token(&self) -> &Token {
        &self.0.token
    }

    /// Stores the real value, the first patch wins
    #[inline]
    pub(crate) fn patch(&self, instance: Instance) {
        let _ = self.0.value.set(instance);
    }

    #[inline]
    pub(crate) fn seal(&self) {
        self.0.sealed.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_sealed(&self) -> bool {
        self.0.sealed.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn instance(&self) -> Option<&Instance> {
        if self.is_sealed() {
            self.0.value.get()
        } else {
            None
        }
    }
}

/// A reference to a dependency that is resolved after the dependent is constructed.
///
/// A constructor receives a pending [`ForwardRef`]; once the whole resolve call
/// has built its object graph, the reference is patched with the real value
/// and [`ForwardRef::get`] starts returning it. Every clone of the reference observes the patch,
/// so after-resolve hooks and any code running after the resolve call can use it.
///
/// A patched reference holds the referenced value strongly. When the referenced value
/// also holds the dependent, as in `A -> B -> ForwardRef<A>`, the two form a reference cycle
/// and are never freed. Singleton and injector-scoped graphs are built once per cache, but a
/// transient or resolution-scoped cycle leaks on every resolve call.
///
/// # Example
/// ```
/// use arbor_di::{Injector, Lifecycle, Parameter, Provider, RegistrationOptions, TypeInfo, ForwardRef};
/// use std::sync::Arc;
///
/// struct Parent { child: Arc<Child> }
/// struct Child { parent: ForwardRef<Parent> }
///
/// TypeInfo::builder::<Parent>()
///     .parameter(Parameter::of::<Child>())
///     .register(|args| Ok(Parent { child: args.get(0)? }));
/// TypeInfo::builder::<Child>()
///     .parameter(Parameter::of::<Parent>().forward_ref())
///     .register(|args| Ok(Child { parent: args.forward_ref(0)? }));
///
/// let injector = Injector::new("root");
/// let options = RegistrationOptions::new().lifecycle(Lifecycle::Resolution);
/// injector.register(arbor_di::Token::of::<Parent>(), Provider::class::<Parent>(), options.clone()).unwrap();
/// injector.register(arbor_di::Token::of::<Child>(), Provider::class::<Child>(), options).unwrap();
///
/// let parent = injector.resolve::<Parent>().unwrap();
/// assert!(Arc::ptr_eq(&parent.child.parent.get().unwrap(), &parent));
/// ```
pub struct ForwardRef<T> {
    slot: ForwardSlot,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ForwardRef<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            _marker: PhantomData
        }
    }
}

impl<T: Send + Sync + 'static> ForwardRef<T> {
    #[inline]
    pub(crate) fn new(slot: ForwardSlot) -> Self {
        Self { slot, _marker: PhantomData }
    }

    /// Returns the referenced value, or `None` while the reference is still pending
    /// or if the deferred dependency was optional and missing
    #[inline]
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot
            .instance()
            .and_then(Instance::downcast::<T>)
    }

    /// Returns `true` once the owning resolve call patched this reference
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.slot.is_sealed()
    }

    /// The token this reference points to
    #[inline]
    pub fn token(&self) -> &Token {
        self.slot.token()
    }
}

impl<T> fmt::Debug for ForwardRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardRef")
            .field("token", self.slot.token())
            .field("resolved", &self.slot.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ForwardRef, ForwardSlot};
    use crate::{Instance, Token};

    #[test]
    fn it_hides_patched_value_until_sealed() {
        let slot = ForwardSlot::pending(Token::named("value"));
        let reference = ForwardRef::<u32>::new(slot.clone());

        slot.patch(Instance::new(42u32));
        assert!(reference.get().is_none());
        assert!(!reference.is_resolved());

        slot.seal();
        assert_eq!(*reference.get().unwrap(), 42);
        assert!(reference.clone().is_resolved());
    }

    #[test]
    fn it_keeps_the_first_patch() {
        let slot = ForwardSlot::resolved(Token::named("value"), Instance::new(1u32));
        slot.patch(Instance::new(2u32));

        assert_eq!(*ForwardRef::<u32>::new(slot).get().unwrap(), 1);
    }

    #[test]
    fn it_returns_none_for_wrong_type() {
        let slot = ForwardSlot::resolved(Token::named("value"), Instance::new(1u32));

        assert!(ForwardRef::<String>::new(slot).get().is_none());
    }
}
