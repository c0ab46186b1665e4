//! Hierarchical injectors: registration, lookup and the public resolve API

use crate::{
    Argument, Instance, Token,
    chain::ResolveChain,
    config::InjectorConfig,
    context::ResolveState,
    error::Error,
    instance::{ArgumentIdentity, CacheEntry},
    provider::Providers,
    registration::{Registration, RegistrationOptions, Registrations, global}
};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering}
    }
};
use tokio_util::sync::CancellationToken;

pub(crate) use disposal::DisposeHandler;
pub(crate) use resolve::Resolved;

mod disposal;
mod post_process;
mod resolve;
mod resolve_async;

type ScopedCache = HashMap<(Token, ArgumentIdentity), CacheEntry>;

/// Options of a registration lookup
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LookupOptions {
    skip_self: bool,
    only_self: bool,
}

impl LookupOptions {
    /// Looks in the injector first, then in its ancestors
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the lookup at the parent
    #[inline]
    pub fn skip_self(mut self) -> Self {
        self.skip_self = true;
        self
    }

    /// Does not look in the ancestors
    #[inline]
    pub fn only_self(mut self) -> Self {
        self.only_self = true;
        self
    }
}

/// Options of a resolve call
///
/// # Example
/// ```
/// use arbor_di::{Injector, ResolveOptions, Token};
///
/// let injector = Injector::new("root");
/// let value = injector
///     .resolve_with(Token::named("missing"), None, ResolveOptions::new().optional())
///     .unwrap();
///
/// assert!(value.is_none());
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    optional: bool,
    skip_self: bool,
    only_self: bool,
    forward_ref: bool,
}

impl ResolveOptions {
    /// Creates default options: required, looked up in the whole hierarchy
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves to nothing instead of failing if the token is not registered
    #[inline]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Resolves with the parent injector
    #[inline]
    pub fn skip_self(mut self) -> Self {
        self.skip_self = true;
        self
    }

    /// Does not look for registrations in the ancestors
    #[inline]
    pub fn only_self(mut self) -> Self {
        self.only_self = true;
        self
    }

    /// Defers the resolution after the current object graph is built
    #[inline]
    pub fn forward_ref(mut self) -> Self {
        self.forward_ref = true;
        self
    }

    /// Returns `true` if a missing registration resolves to nothing
    #[inline]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns `true` if the resolution starts at the parent injector
    #[inline]
    pub fn is_skip_self(&self) -> bool {
        self.skip_self
    }

    /// Returns `true` if ancestors are ignored
    #[inline]
    pub fn is_only_self(&self) -> bool {
        self.only_self
    }

    /// Returns `true` if the resolution is deferred
    #[inline]
    pub fn is_forward_ref(&self) -> bool {
        self.forward_ref
    }

    #[inline]
    pub(crate) fn without_forward_ref(mut self) -> Self {
        self.forward_ref = false;
        self
    }

    #[inline]
    pub(crate) fn without_skip_self(mut self) -> Self {
        self.skip_self = false;
        self
    }

    #[inline]
    pub(crate) fn lookup(&self) -> LookupOptions {
        LookupOptions {
            skip_self: self.skip_self,
            only_self: self.only_self
        }
    }
}

pub(crate) struct InjectorInner {
    name: Arc<str>,
    parent: Option<Injector>,
    config: InjectorConfig,
    registrations: RwLock<HashMap<Token, Registrations>>,
    scoped: Mutex<ScopedCache>,
    disposal: Mutex<disposal::DisposalStack>,
    cancellation: CancellationToken,
    disposed: AtomicBool,
}

/// A node of an injector tree.
///
/// An injector owns its registrations, its injector-scoped cache, a cancellation signal and
/// a disposal stack. Lookups that fail in an injector continue in its parent; a root injector
/// additionally falls back to the global registrations.
///
/// Cloning an [`Injector`] is cheap and every clone refers to the same node.
///
/// # Example
/// ```
/// use arbor_di::{Injector, Provider, RegistrationOptions, Token};
///
/// struct Config { port: u16 }
///
/// let root = Injector::new("root");
/// root.register_singleton(Token::of::<Config>(), Provider::value(Config { port: 8080 }), RegistrationOptions::new()).unwrap();
///
/// let child = root.fork("request");
/// assert_eq!(child.resolve::<Config>().unwrap().port, 8080);
/// ```
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("name", &self.inner.name)
            .field("parent", &self.inner.parent.as_ref().map(Injector::name))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Injector {
    /// Creates a root injector with the default configuration
    #[inline]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_config(name, InjectorConfig::default())
    }

    /// Creates a root injector with a specific configuration
    pub fn with_config(name: impl Into<Arc<str>>, config: InjectorConfig) -> Self {
        Self::create(name.into(), None, config, CancellationToken::new())
    }

    fn create(
        name: Arc<str>,
        parent: Option<Injector>,
        config: InjectorConfig,
        cancellation: CancellationToken
    ) -> Self {
        let inner = InjectorInner {
            name,
            parent,
            config,
            registrations: RwLock::new(HashMap::new()),
            scoped: Mutex::new(HashMap::new()),
            disposal: Mutex::new(disposal::DisposalStack::default()),
            cancellation,
            disposed: AtomicBool::new(false)
        };
        Self { inner: Arc::new(inner) }
    }

    #[inline]
    pub(crate) fn from_inner(inner: Arc<InjectorInner>) -> Self {
        Self { inner }
    }

    /// Creates a child injector.
    ///
    /// The child inherits the configuration, its cancellation signal is a child of this one,
    /// and it is disposed together with this injector.
    pub fn fork(&self, name: impl Into<Arc<str>>) -> Injector {
        let child = Self::create(
            name.into(),
            Some(self.clone()),
            self.inner.config,
            self.inner.cancellation.child_token());

        #[cfg(feature = "tracing")]
        tracing::trace!("injector {} forked from {}", child.name(), self.name());

        self.push_child(&child);
        child
    }

    /// Name of the injector
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent injector, `None` for a root
    #[inline]
    pub fn parent(&self) -> Option<&Injector> {
        self.inner.parent.as_ref()
    }

    /// Returns `true` if the injector has no parent
    #[inline]
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// The configuration of the injector
    #[inline]
    pub fn config(&self) -> &InjectorConfig {
        &self.inner.config
    }

    /// The cancellation signal, cancelled when the injector or one of its ancestors is disposed
    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// Returns `true` once disposal has started
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same injector
    #[inline]
    pub fn ptr_eq(this: &Injector, other: &Injector) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    #[inline]
    pub(crate) fn ensure_alive(&self) -> Result<(), Error> {
        if self.is_disposed() {
            Err(Error::disposed(self.name()))
        } else {
            Ok(())
        }
    }

    /// Registers one provider, or a list of providers as a multi token.
    ///
    /// A single registration replaces the previous single registration of the token,
    /// multi registrations are appended. Mixing both for one token fails.
    pub fn register(
        &self,
        token: impl Into<Token>,
        providers: impl Into<Providers>,
        options: RegistrationOptions
    ) -> Result<(), Error> {
        self.ensure_alive()?;
        let token = token.into();
        let providers = providers.into();
        if providers.providers.is_empty() {
            return Ok(());
        }

        let multi = providers.multi || options.multi;
        let owner = Arc::downgrade(&self.inner);
        let added = providers.providers
            .into_iter()
            .map(|provider| Registration::new(token.clone(), provider, options.clone(), owner.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut registrations = self.inner.registrations
            .write()
            .expect("registrations lock poisoned");
        let merged = Registrations::merge(registrations.get(&token).cloned(), &token, added, multi)?;

        #[cfg(feature = "tracing")]
        tracing::trace!("{token} registered in injector {}", self.name());

        registrations.insert(token, merged);
        Ok(())
    }

    /// Registers providers with the [`Singleton`](crate::Lifecycle::Singleton) lifecycle
    #[inline]
    pub fn register_singleton(
        &self,
        token: impl Into<Token>,
        providers: impl Into<Providers>,
        options: RegistrationOptions
    ) -> Result<(), Error> {
        self.register(token, providers, options.singleton())
    }

    /// Registers providers in the process-wide table.
    ///
    /// A root injector picks them up the first time it looks up the token and does not find it locally.
    ///
    /// # Example
    /// ```
    /// use arbor_di::{Injector, Provider, RegistrationOptions, Token};
    ///
    /// let token = Token::symbol("greeting");
    /// Injector::register_global(token.clone(), Provider::value("hello"), RegistrationOptions::new()).unwrap();
    ///
    /// let injector = Injector::new("root");
    /// assert_eq!(*injector.resolve_token::<&str>(token).unwrap(), "hello");
    /// ```
    #[inline]
    pub fn register_global(
        token: impl Into<Token>,
        providers: impl Into<Providers>,
        options: RegistrationOptions
    ) -> Result<(), Error> {
        global::register(token.into(), providers.into(), options)
    }

    /// Registers providers in the process-wide table with the [`Singleton`](crate::Lifecycle::Singleton) lifecycle
    #[inline]
    pub fn register_global_singleton(
        token: impl Into<Token>,
        providers: impl Into<Providers>,
        options: RegistrationOptions
    ) -> Result<(), Error> {
        Self::register_global(token, providers, options.singleton())
    }

    /// Returns `true` if `token` has a global registration
    #[inline]
    pub fn has_global_registration(token: &Token) -> bool {
        global::contains(token)
    }

    /// Removes every global registration.
    ///
    /// Registrations already picked up by root injectors stay there.
    #[inline]
    pub fn clear_global_registrations() {
        global::clear();
    }

    /// Returns `true` if the injector's own map holds `token`.
    ///
    /// Unlike the other lookups it never picks up global registrations.
    #[inline]
    pub fn has_own_registration(&self, token: &Token) -> bool {
        self.inner.registrations
            .read()
            .expect("registrations lock poisoned")
            .contains_key(token)
    }

    /// Returns `true` if `token` can be found
    #[inline]
    pub fn has_registration(&self, token: &Token, options: LookupOptions) -> bool {
        self.try_get_registration(token, options).is_some()
    }

    /// Looks up the registrations of `token`
    pub fn try_get_registration(&self, token: &Token, options: LookupOptions) -> Option<Registrations> {
        if !options.skip_self {
            let found = if self.is_root() {
                self.own_or_promoted(token)
            } else {
                self.own_registration(token)
            };
            if found.is_some() {
                return found;
            }
        }
        if options.only_self {
            return None;
        }
        self.inner.parent
            .as_ref()?
            .try_get_registration(token, LookupOptions::new())
    }

    /// Looks up the registrations of `token`, failing if there are none
    pub fn get_registration(&self, token: &Token, options: LookupOptions) -> Result<Registrations, Error> {
        self.try_get_registration(token, options)
            .ok_or_else(|| Error::no_provider(token, &ResolveChain::new()))
    }

    #[inline]
    fn own_registration(&self, token: &Token) -> Option<Registrations> {
        self.inner.registrations
            .read()
            .expect("registrations lock poisoned")
            .get(token)
            .cloned()
    }

    fn own_or_promoted(&self, token: &Token) -> Option<Registrations> {
        if let Some(found) = self.own_registration(token) {
            return Some(found);
        }
        if self.is_disposed() {
            return None;
        }

        let mut registrations = self.inner.registrations
            .write()
            .expect("registrations lock poisoned");
        if let Some(found) = registrations.get(token) {
            return Some(found.clone());
        }

        let promoted = global::materialize(token, Arc::downgrade(&self.inner))?;

        #[cfg(feature = "tracing")]
        tracing::trace!("global registration of {token} promoted into injector {}", self.name());

        registrations.insert(token.clone(), promoted.clone());
        Some(promoted)
    }

    #[inline]
    pub(crate) fn scoped(&self, token: &Token, identity: &ArgumentIdentity) -> Option<Instance> {
        self.inner.scoped
            .lock()
            .expect("injector cache lock poisoned")
            .get(&(token.clone(), identity.clone()))
            .map(|entry| entry.instance.clone())
    }

    #[inline]
    pub(crate) fn store_scoped(&self, token: Token, identity: ArgumentIdentity, entry: CacheEntry) -> Instance {
        self.inner.scoped
            .lock()
            .expect("injector cache lock poisoned")
            .entry((token, identity))
            .or_insert(entry)
            .instance
            .clone()
    }

    /// Resolves a value of type `T` registered under its type token
    #[inline]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.resolve_token(Token::of::<T>())
    }

    /// Resolves `token` into a value of type `T`
    pub fn resolve_token<T: Send + Sync + 'static>(&self, token: impl Into<Token>) -> Result<Arc<T>, Error> {
        let token = token.into();
        self.resolve_with(token.clone(), None, ResolveOptions::new())?
            .ok_or_else(|| Error::no_provider(&token, &ResolveChain::new()))?
            .try_downcast()
    }

    /// Resolves a value of type `T`, `None` if it is not registered
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, Error> {
        self.resolve_with(Token::of::<T>(), None, ResolveOptions::new().optional())?
            .map(|instance| instance.try_downcast())
            .transpose()
    }

    /// Resolves a value of type `T` with an argument
    pub fn resolve_argument<T: Send + Sync + 'static>(&self, argument: Argument) -> Result<Arc<T>, Error> {
        let token = Token::of::<T>();
        self.resolve_with(token.clone(), Some(argument), ResolveOptions::new())?
            .ok_or_else(|| Error::no_provider(&token, &ResolveChain::new()))?
            .try_downcast()
    }

    /// Resolves `token` with an argument and options.
    ///
    /// Returns `None` only if the resolution is optional and `token` is not registered.
    pub fn resolve_with(
        &self,
        token: impl Into<Token>,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> Result<Option<Instance>, Error> {
        let token = token.into();

        #[cfg(feature = "tracing")]
        tracing::debug!("resolving {token} with injector {}", self.name());

        let state = ResolveState::new();
        let resolved = self.resolve_in(&state, &token, argument, options, &ResolveChain::new())?;
        Self::post_process(&state)?;
        Ok(resolved.into_instance())
    }

    /// Resolves every registration of `T`
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, Error> {
        self.resolve_all_with(Token::of::<T>(), None, ResolveOptions::new())?
            .iter()
            .map(Instance::try_downcast)
            .collect()
    }

    /// Resolves every registration of `token`; a single registration gives one value.
    ///
    /// An optional resolution of an unknown token gives no values.
    pub fn resolve_all_with(
        &self,
        token: impl Into<Token>,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> Result<Vec<Instance>, Error> {
        let token = token.into();

        #[cfg(feature = "tracing")]
        tracing::debug!("resolving all of {token} with injector {}", self.name());

        let state = ResolveState::new();
        let instances = self.resolve_all_in(&state, &token, argument, options, &ResolveChain::new())?;
        Self::post_process(&state)?;
        Ok(instances)
    }

    /// Resolves several tokens within one resolve call, so they share resolution-scoped values
    pub fn resolve_many(&self, tokens: &[Token]) -> Result<Vec<Instance>, Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!("resolving {} tokens with injector {}", tokens.len(), self.name());

        let state = ResolveState::new();
        let chain = ResolveChain::new();
        let mut instances = Vec::with_capacity(tokens.len());
        for token in tokens {
            let instance = self.resolve_in(&state, token, None, ResolveOptions::new(), &chain)?;
            instances.push(instance);
        }
        Self::post_process(&state)?;
        instances
            .into_iter()
            .zip(tokens)
            .map(|(resolved, token)| resolved
                .into_instance()
                .ok_or_else(|| Error::no_provider(token, &chain)))
            .collect()
    }

    /// Resolves a value of type `T` with the async API
    #[inline]
    pub async fn resolve_async<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.resolve_token_async(Token::of::<T>()).await
    }

    /// Resolves `token` into a value of type `T` with the async API
    pub fn resolve_token_async<T: Send + Sync + 'static>(
        &self,
        token: impl Into<Token>
    ) -> impl Future<Output = Result<Arc<T>, Error>> + Send + '_ {
        let token = token.into();
        async move {
            self.resolve_with_async(token.clone(), None, ResolveOptions::new())
                .await?
                .ok_or_else(|| Error::no_provider(&token, &ResolveChain::new()))?
                .try_downcast()
        }
    }

    /// Resolves a value of type `T` with the async API, `None` if it is not registered
    pub async fn try_resolve_async<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, Error> {
        self.resolve_with_async(Token::of::<T>(), None, ResolveOptions::new().optional())
            .await?
            .map(|instance| instance.try_downcast())
            .transpose()
    }

    /// Resolves a value of type `T` with an argument with the async API
    pub async fn resolve_argument_async<T: Send + Sync + 'static>(&self, argument: Argument) -> Result<Arc<T>, Error> {
        let token = Token::of::<T>();
        self.resolve_with_async(token.clone(), Some(argument), ResolveOptions::new())
            .await?
            .ok_or_else(|| Error::no_provider(&token, &ResolveChain::new()))?
            .try_downcast()
    }

    /// Resolves `token` with an argument and options with the async API
    pub fn resolve_with_async(
        &self,
        token: impl Into<Token>,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> impl Future<Output = Result<Option<Instance>, Error>> + Send + '_ {
        let token = token.into();
        async move {
            #[cfg(feature = "tracing")]
            tracing::debug!("resolving {token} with injector {}", self.name());

            let state = ResolveState::new();
            let resolved = self.resolve_in_async(&state, &token, argument, options, &ResolveChain::new()).await?;
            Self::post_process_async(&state).await?;
            Ok(resolved.into_instance())
        }
    }

    /// Resolves every registration of `T` with the async API
    pub async fn resolve_all_async<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, Error> {
        self.resolve_all_with_async(Token::of::<T>(), None, ResolveOptions::new())
            .await?
            .iter()
            .map(Instance::try_downcast)
            .collect()
    }

    /// Resolves every registration of `token` with the async API
    pub fn resolve_all_with_async(
        &self,
        token: impl Into<Token>,
        argument: Option<Argument>,
        options: ResolveOptions
    ) -> impl Future<Output = Result<Vec<Instance>, Error>> + Send + '_ {
        let token = token.into();
        async move {
            #[cfg(feature = "tracing")]
            tracing::debug!("resolving all of {token} with injector {}", self.name());

            let state = ResolveState::new();
            let instances = self.resolve_all_in_async(&state, &token, argument, options, &ResolveChain::new()).await?;
            Self::post_process_async(&state).await?;
            Ok(instances)
        }
    }

    /// Resolves several tokens within one resolve call with the async API
    pub async fn resolve_many_async(&self, tokens: &[Token]) -> Result<Vec<Instance>, Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!("resolving {} tokens with injector {}", tokens.len(), self.name());

        let state = ResolveState::new();
        let chain = ResolveChain::new();
        let mut instances = Vec::with_capacity(tokens.len());
        for token in tokens {
            let instance = self.resolve_in_async(&state, token, None, ResolveOptions::new(), &chain).await?;
            instances.push(instance);
        }
        Self::post_process_async(&state).await?;
        instances
            .into_iter()
            .zip(tokens)
            .map(|(resolved, token)| resolved
                .into_instance()
                .ok_or_else(|| Error::no_provider(token, &chain)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Lifecycle, Provider};

    #[test]
    fn it_looks_up_registrations_in_ancestors() {
        let root = Injector::new("root");
        let child = root.fork("child");
        let token = Token::named("value");
        root.register(token.clone(), Provider::value(1u8), RegistrationOptions::new()).unwrap();

        assert!(child.has_registration(&token, LookupOptions::new()));
        assert!(!child.has_registration(&token, LookupOptions::new().only_self()));
        assert!(!root.has_registration(&token, LookupOptions::new().skip_self()));
        assert!(child.get_registration(&token, LookupOptions::new()).is_ok());
        assert_eq!(
            child.get_registration(&token, LookupOptions::new().only_self()).unwrap_err().kind(),
            ErrorKind::NoProvider);
    }

    #[test]
    fn it_rejects_registration_on_disposed_injector() {
        let injector = Injector::new("root");
        injector.inner.disposed.store(true, Ordering::Release);

        let err = injector
            .register(Token::named("value"), Provider::value(1u8), RegistrationOptions::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposed);
    }

    #[test]
    fn it_inherits_config_and_cancellation() {
        let root = Injector::with_config("root", InjectorConfig::new().with_max_chain_length(5));
        let child = root.fork("child");

        assert_eq!(child.config().max_chain_length(), 5);
        assert!(child.parent().is_some_and(|parent| Injector::ptr_eq(parent, &root)));
        assert!(!child.is_root());

        root.cancellation_token().cancel();
        assert!(child.cancellation_token().is_cancelled());
    }

    #[test]
    fn it_forces_singleton_lifecycle() {
        let injector = Injector::new("root");
        let token = Token::named("value");
        injector.register_singleton(token.clone(), Provider::value(1u8), RegistrationOptions::new()).unwrap();

        let registrations = injector.get_registration(&token, LookupOptions::new()).unwrap();
        assert_eq!(registrations.last().unwrap().lifecycle(), Lifecycle::Singleton);
    }

    #[test]
    fn it_ignores_empty_provider_lists() {
        let injector = Injector::new("root");
        let token = Token::named("empty");
        injector.register(token.clone(), Vec::<Provider>::new(), RegistrationOptions::new()).unwrap();

        assert!(!injector.has_own_registration(&token));
    }
}
