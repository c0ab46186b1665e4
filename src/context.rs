//! Per-call resolution state and the capabilities handed to providers and hooks

use crate::{
    Argument, ForwardRef, Injector, Instance, ResolveOptions, Token,
    chain::{ChainNode, ResolveChain},
    config::InjectorConfig,
    error::{BoxError, Error},
    forward_ref::ForwardSlot,
    injector::{DisposeHandler, Resolved},
    instance::{ArgumentIdentity, CacheEntry},
    registration::Registration
};
use http::Extensions;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    future::Future,
    sync::{Arc, Mutex}
};
use tokio_util::sync::CancellationToken;

/// A type map shared by everything that takes part in one top-level resolve call
///
/// # Example
/// ```
/// use arbor_di::DataBag;
///
/// #[derive(Clone)]
/// struct RequestId(u64);
///
/// let bag = DataBag::default();
/// bag.insert(RequestId(7));
///
/// assert_eq!(bag.get::<RequestId>().unwrap().0, 7);
/// assert!(bag.get::<String>().is_none());
/// ```
#[derive(Clone, Default)]
pub struct DataBag(Arc<Mutex<Extensions>>);

impl DataBag {
    /// Inserts a value, returning the previous value of the same type
    #[inline]
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.0
            .lock()
            .expect("data bag lock poisoned")
            .insert(value)
    }

    /// Returns a clone of the value of type `T`
    #[inline]
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.0
            .lock()
            .expect("data bag lock poisoned")
            .get::<T>()
            .cloned()
    }

    /// Removes the value of type `T`
    #[inline]
    pub fn remove<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.0
            .lock()
            .expect("data bag lock poisoned")
            .remove::<T>()
    }

    /// Returns `true` if there is a value of type `T`
    #[inline]
    pub fn contains<T: Clone + Send + Sync + 'static>(&self) -> bool {
        self.0
            .lock()
            .expect("data bag lock poisoned")
            .get::<T>()
            .is_some()
    }
}

impl fmt::Debug for DataBag {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataBag(..)")
    }
}

/// A constructed value recorded for post-processing
pub(crate) struct Resolution {
    pub(crate) registration: Arc<Registration>,
    pub(crate) instance: Instance,
    pub(crate) argument: Option<Argument>,
    pub(crate) chain: ResolveChain,
    pub(crate) injector: Injector,
}

/// A forward reference that still has to be resolved
pub(crate) struct DeferredEdge {
    pub(crate) injector: Injector,
    pub(crate) token: Token,
    pub(crate) argument: Option<Argument>,
    pub(crate) options: ResolveOptions,
    pub(crate) chain: ResolveChain,
    pub(crate) slot: ForwardSlot,
}

#[derive(Default)]
struct StateInner {
    resolving: HashSet<Token>,
    scoped: HashMap<(Token, ArgumentIdentity), CacheEntry>,
    resolutions: Vec<Resolution>,
    deferred: VecDeque<DeferredEdge>,
    forward_refs: Vec<ForwardSlot>,
    count: usize,
}

/// State of one top-level resolve call, dropped once the call returns
#[derive(Default)]
pub(crate) struct ResolveState {
    inner: Mutex<StateInner>,
    data: DataBag,
}

impl ResolveState {
    #[inline]
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    fn lock(&self) -> std::sync::MutexGuard<'_, StateInner> {
        self.inner
            .lock()
            .expect("resolve state lock poisoned")
    }

    #[inline]
    pub(crate) fn data(&self) -> &DataBag {
        &self.data
    }

    /// Applies the overflow and self-cycle guards and marks `token` as being resolved
    pub(crate) fn enter(&self, token: &Token, chain: &ResolveChain, config: &InjectorConfig) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.count += 1;
        if chain.len() > config.max_chain_length() || inner.count > config.max_resolutions() {
            return Err(Error::overflow(chain));
        }
        if !inner.resolving.insert(token.clone()) {
            return Err(Error::circular(token, chain));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn leave(&self, token: &Token) {
        self.lock().resolving.remove(token);
    }

    #[inline]
    pub(crate) fn scoped(&self, token: &Token, identity: &ArgumentIdentity) -> Option<Instance> {
        self.lock()
            .scoped
            .get(&(token.clone(), identity.clone()))
            .map(|entry| entry.instance.clone())
    }

    #[inline]
    pub(crate) fn store_scoped(&self, token: Token, identity: ArgumentIdentity, entry: CacheEntry) -> Instance {
        self.lock()
            .scoped
            .entry((token, identity))
            .or_insert(entry)
            .instance
            .clone()
    }

    #[inline]
    pub(crate) fn record(&self, resolution: Resolution) {
        self.lock().resolutions.push(resolution);
    }

    /// Queues a deferred edge and remembers its placeholder
    pub(crate) fn defer(&self, edge: DeferredEdge) {
        let mut inner = self.lock();
        inner.forward_refs.push(edge.slot.clone());
        inner.deferred.push_back(edge);
    }

    #[inline]
    pub(crate) fn next_deferred(&self) -> Option<DeferredEdge> {
        self.lock().deferred.pop_front()
    }

    #[inline]
    pub(crate) fn take_forward_refs(&self) -> Vec<ForwardSlot> {
        std::mem::take(&mut self.lock().forward_refs)
    }

    #[inline]
    pub(crate) fn take_resolutions(&self) -> Vec<Resolution> {
        std::mem::take(&mut self.lock().resolutions)
    }
}

/// Everything an after-resolve hook may need about the value it is called for
#[derive(Clone)]
pub struct AfterResolveContext {
    injector: Injector,
    argument: Option<Argument>,
    data: DataBag,
    chain: ResolveChain,
}

impl AfterResolveContext {
    #[inline]
    pub(crate) fn new(injector: Injector, argument: Option<Argument>, data: DataBag, chain: ResolveChain) -> Self {
        Self { injector, argument, data, chain }
    }

    /// The injector that resolved the value
    #[inline]
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// The argument the value was resolved with
    #[inline]
    pub fn argument(&self) -> Option<&Argument> {
        self.argument.as_ref()
    }

    /// The cancellation signal of the injector that resolved the value
    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.injector.cancellation_token()
    }

    /// The data bag of the resolve call
    #[inline]
    pub fn data(&self) -> &DataBag {
        &self.data
    }

    /// The resolve chain that led to the value
    #[inline]
    pub fn chain(&self) -> &ResolveChain {
        &self.chain
    }
}

impl fmt::Debug for AfterResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AfterResolveContext")
            .field("injector", &self.injector.name())
            .field("chain", &self.chain)
            .finish()
    }
}

/// The capability handed to factory providers.
///
/// Nested resolve calls made through it are part of the resolve call that invoked the factory:
/// they share its resolution-scoped cache, cycle detection and data bag, and their values are
/// post-processed together with the rest of the object graph.
#[derive(Clone)]
pub struct ResolveContext {
    injector: Injector,
    state: Arc<ResolveState>,
    chain: ResolveChain,
}

impl ResolveContext {
    #[inline]
    pub(crate) fn new(injector: Injector, state: Arc<ResolveState>, chain: ResolveChain) -> Self {
        Self { injector, state, chain }
    }

    /// Resolves a dependency of type `T`
    #[inline]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.resolve_token(Token::of::<T>())
    }

    /// Resolves `token` into a value of type `T`
    pub fn resolve_token<T: Send + Sync + 'static>(&self, token: impl Into<Token>) -> Result<Arc<T>, Error> {
        let token = token.into();
        self.resolve_with(token.clone(), None, ResolveOptions::new())?
            .ok_or_else(|| Error::no_provider(&token, &self.chain))?
            .try_downcast()
    }

    /// Resolves a dependency of type `T`, `None` if it is not registered
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, Error> {
        self.resolve_with(Token::of::<T>(), None, ResolveOptions::new().optional())?
            .map(|instance| instance.try_downcast())
            .transpose()
    }

    /// Resolves `token` with an argument and options.
    ///
    /// Use [`ResolveContext::forward_ref`] to defer a resolution.
    pub fn resolve_with(
        &self,
        token: impl Into<Token>,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> Result<Option<Instance>, Error> {
        let token = token.into();
        self.injector
            .resolve_in(&self.state, &token, argument, options.without_forward_ref(), &self.chain)
            .map(Resolved::into_instance)
    }

    /// Resolves every registration of `T`
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, Error> {
        self.resolve_all_with(Token::of::<T>(), None, ResolveOptions::new())?
            .iter()
            .map(Instance::try_downcast)
            .collect()
    }

    /// Resolves every registration of `token` with an argument and options
    pub fn resolve_all_with(
        &self,
        token: impl Into<Token>,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> Result<Vec<Instance>, Error> {
        let token = token.into();
        self.injector.resolve_all_in(&self.state, &token, argument, options, &self.chain)
    }

    /// Resolves a dependency of type `T` with the async API
    #[inline]
    pub async fn resolve_async<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.resolve_token_async(Token::of::<T>()).await
    }

    /// Resolves `token` into a value of type `T` with the async API
    pub async fn resolve_token_async<T: Send + Sync + 'static>(&self, token: Token) -> Result<Arc<T>, Error> {
        self.resolve_with_async(token.clone(), None, ResolveOptions::new())
            .await?
            .ok_or_else(|| Error::no_provider(&token, &self.chain))?
            .try_downcast()
    }

    /// Resolves `token` with an argument and options with the async API
    pub async fn resolve_with_async(
        &self,
        token: Token,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> Result<Option<Instance>, Error> {
        self.injector
            .resolve_in_async(&self.state, &token, argument, options.without_forward_ref(), &self.chain)
            .await
            .map(Resolved::into_instance)
    }

    /// Resolves every registration of `T` with the async API
    pub async fn resolve_all_async<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, Error> {
        self.resolve_all_with_async(Token::of::<T>(), None, ResolveOptions::new())
            .await?
            .iter()
            .map(Instance::try_downcast)
            .collect()
    }

    /// Resolves every registration of `token` with an argument and options with the async API
    pub async fn resolve_all_with_async(
        &self,
        token: Token,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> Result<Vec<Instance>, Error> {
        self.injector
            .resolve_all_in_async(&self.state, &token, argument, options, &self.chain)
            .await
    }

    /// Returns a placeholder for `token` that is patched once the resolve call built its object graph
    pub fn forward_ref<T: Send + Sync + 'static>(&self, token: impl Into<Token>) -> Result<ForwardRef<T>, Error> {
        let token = token.into();
        match self.injector.resolve_in(&self.state, &token, None, ResolveOptions::new().forward_ref(), &self.chain)? {
            Resolved::Forward(slot) => Ok(ForwardRef::new(slot)),
            _ => Err(Error::no_provider(&token, &self.chain.add(ChainNode::ForwardRef(token.clone()))))
        }
    }

    /// The injector that invoked the factory
    #[inline]
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// The cancellation signal of the injector that invoked the factory
    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.injector.cancellation_token()
    }

    /// The data bag of the resolve call
    #[inline]
    pub fn data(&self) -> &DataBag {
        self.state.data()
    }

    /// The resolve chain that led to the factory
    #[inline]
    pub fn chain(&self) -> &ResolveChain {
        &self.chain
    }

    /// Runs `handler` when the injector that invoked the factory is disposed
    pub fn add_dispose_handler<F>(&self, handler: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static
    {
        self.injector.push_dispose_handler(DisposeHandler::Sync(Box::new(handler)));
    }

    /// Awaits `handler` when the injector that invoked the factory is disposed
    pub fn add_async_dispose_handler<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static
    {
        self.injector.push_dispose_handler(DisposeHandler::Async(Box::new(move || Box::pin(handler()))));
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("injector", &self.injector.name())
            .field("chain", &self.chain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn it_guards_against_self_cycles() {
        let state = ResolveState::new();
        let config = InjectorConfig::new();
        let token = Token::named("a");
        let chain = ResolveChain::new().add(ChainNode::Token(token.clone()));

        state.enter(&token, &chain, &config).unwrap();
        let err = state.enter(&token, &chain, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);

        state.leave(&token);
        assert!(state.enter(&token, &chain, &config).is_ok());
    }

    #[test]
    fn it_guards_against_overflow() {
        let state = ResolveState::new();
        let config = InjectorConfig::new().with_max_resolutions(2);
        let chain = ResolveChain::new();

        state.enter(&Token::named("a"), &chain, &config).unwrap();
        state.enter(&Token::named("b"), &chain, &config).unwrap();
        let err = state.enter(&Token::named("c"), &chain, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);

        let config = InjectorConfig::new().with_max_chain_length(1);
        let chain = chain
            .add(ChainNode::Token(Token::named("a")))
            .add(ChainNode::Token(Token::named("b")));
        let err = ResolveState::new().enter(&Token::named("b"), &chain, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
    }

    #[test]
    fn it_keeps_the_first_scoped_value() {
        let state = ResolveState::new();
        let token = Token::named("scoped");

        assert!(state.scoped(&token, &ArgumentIdentity::None).is_none());
        let first = state.store_scoped(token.clone(), ArgumentIdentity::None, CacheEntry::new(Instance::new(1u8), None));
        let second = state.store_scoped(token.clone(), ArgumentIdentity::None, CacheEntry::new(Instance::new(2u8), None));

        assert!(Instance::ptr_eq(&first, &second));
        assert!(state.scoped(&token, &ArgumentIdentity::None).is_some());
    }

    #[test]
    fn it_shares_the_data_bag() {
        let bag = DataBag::default();
        let clone = bag.clone();

        assert!(bag.insert(5u32).is_none());
        assert!(clone.contains::<u32>());
        assert_eq!(clone.remove::<u32>(), Some(5));
        assert!(!bag.contains::<u32>());
    }
}
