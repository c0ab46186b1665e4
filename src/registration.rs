//! Registrations: tokens bound to providers together with their lifecycle and options

use crate::{
    Argument, Instance, Token, TypeInfo,
    chain::ResolveChain,
    error::Error,
    injector::{Injector, InjectorInner},
    instance::{ArgumentIdentity, CacheEntry},
    provider::{AfterResolveHook, Provider}
};
use futures_util::future::BoxFuture;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, Weak}
};

pub(crate) mod global;

/// Describes how long a resolved value is cached
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// A new value on every resolve
    #[default]
    Transient,

    /// One value per argument identity, shared by the owning injector and all its descendants
    Singleton,

    /// One value per token and argument identity within a single top-level resolve call
    Resolution,

    /// One value per token and argument identity within the injector that resolves it
    Injector,
}

type ArgumentProviderFn = Arc<
    dyn Fn() -> Argument
    + Send
    + Sync
>;

type AsyncArgumentProviderFn = Arc<
    dyn Fn() -> BoxFuture<'static, Argument>
    + Send
    + Sync
>;

type IdentityFn = Arc<
    dyn Fn(&Argument) -> ArgumentIdentity
    + Send
    + Sync
>;

/// The argument used when a resolve call does not pass one
#[derive(Clone)]
pub(crate) enum DefaultArgument {
    Value(Argument),
    Provider(ArgumentProviderFn),
    AsyncProvider(AsyncArgumentProviderFn),
}

/// Represents the options of a registration
///
/// # Example
/// ```
/// use arbor_di::{Lifecycle, RegistrationOptions, argument};
///
/// let options = RegistrationOptions::new()
///     .lifecycle(Lifecycle::Singleton)
///     .default_argument(argument(String::from("default")))
///     .argument_identity(|arg| arg.downcast_ref::<String>().cloned());
///
/// assert_eq!(options.get_lifecycle(), Lifecycle::Singleton);
/// ```
#[derive(Clone, Default)]
pub struct RegistrationOptions {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) default_argument: Option<DefaultArgument>,
    pub(crate) identity: Option<IdentityFn>,
    pub(crate) multi: bool,
    pub(crate) after_resolve: Option<AfterResolveHook>,
}

impl RegistrationOptions {
    /// Creates default options: transient, single, no default argument
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lifecycle
    ///
    /// Default: [`Lifecycle::Transient`]
    #[inline]
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Shorthand for `lifecycle(Lifecycle::Singleton)`
    #[inline]
    pub fn singleton(self) -> Self {
        self.lifecycle(Lifecycle::Singleton)
    }

    /// Uses `argument` when a resolve call passes no argument
    #[inline]
    pub fn default_argument(mut self, argument: Argument) -> Self {
        self.default_argument = Some(DefaultArgument::Value(argument));
        self
    }

    /// Calls `provider` for an argument when a resolve call passes no argument
    pub fn default_argument_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Argument + Send + Sync + 'static
    {
        self.default_argument = Some(DefaultArgument::Provider(Arc::new(provider)));
        self
    }

    /// Awaits `provider` for an argument when a resolve call passes no argument.
    /// The token can then only be resolved with the async API.
    pub fn async_default_argument_provider<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Argument> + Send + 'static
    {
        self.default_argument = Some(DefaultArgument::AsyncProvider(Arc::new(move || Box::pin(provider()))));
        self
    }

    /// Derives the cache key from the argument instead of using the argument's reference identity
    pub fn argument_identity<K, F>(mut self, identity: F) -> Self
    where
        K: Hash + Eq + Send + Sync + 'static,
        F: Fn(&Argument) -> K + Send + Sync + 'static
    {
        self.identity = Some(Arc::new(move |argument| ArgumentIdentity::key(identity(argument))));
        self
    }

    /// Registers the provider in addition to the existing ones of the token
    #[inline]
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Attaches a registration level after-resolve hook
    #[inline]
    pub fn after_resolve(mut self, hook: AfterResolveHook) -> Self {
        self.after_resolve = Some(hook);
        self
    }

    /// Returns the lifecycle
    #[inline]
    pub fn get_lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Returns `true` if the options register a multi token
    #[inline]
    pub fn is_multi(&self) -> bool {
        self.multi
    }
}

impl fmt::Debug for RegistrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationOptions")
            .field("lifecycle", &self.lifecycle)
            .field("default_argument", &self.default_argument.is_some())
            .field("identity", &self.identity.is_some())
            .field("multi", &self.multi)
            .field("after_resolve", &self.after_resolve.is_some())
            .finish()
    }
}

/// A token bound to a provider.
///
/// A singleton registration caches its values itself, so every injector
/// that finds it through the hierarchy shares them.
pub struct Registration {
    token: Token,
    provider: Provider,
    options: RegistrationOptions,
    owner: Weak<InjectorInner>,
    singletons: Mutex<HashMap<ArgumentIdentity, CacheEntry>>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("token", &self.token)
            .field("provider", &self.provider)
            .field("options", &self.options)
            .finish()
    }
}

impl Registration {
    /// Creates a registration, a class provider must target an injectable type
    pub(crate) fn new(
        token: Token,
        provider: Provider,
        options: RegistrationOptions,
        owner: Weak<InjectorInner>
    ) -> Result<Self, Error> {
        let provider = provider.prepare()?;
        Ok(Self::prepared(token, provider, options, owner))
    }

    /// Creates a registration from a provider that went through [`Provider::prepare`]
    pub(crate) fn prepared(
        token: Token,
        provider: Provider,
        options: RegistrationOptions,
        owner: Weak<InjectorInner>
    ) -> Self {
        Self {
            token,
            provider,
            options,
            owner,
            singletons: Mutex::new(HashMap::new())
        }
    }

    /// The registered token
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// The provider that produces values
    #[inline]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// The registration options
    #[inline]
    pub fn options(&self) -> &RegistrationOptions {
        &self.options
    }

    /// The lifecycle of produced values
    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.options.lifecycle
    }

    /// The constructor metadata of a class provider
    #[inline]
    pub fn type_info(&self) -> Option<&Arc<TypeInfo>> {
        match &self.provider {
            Provider::Class(class) => class.type_info().ok(),
            _ => None
        }
    }

    /// The injector this registration belongs to, if it is still alive
    #[inline]
    pub(crate) fn owner(&self) -> Option<Injector> {
        self.owner.upgrade().map(Injector::from_inner)
    }

    /// Computes the argument when the resolve call passed none
    pub(crate) fn default_argument(&self, chain: &ResolveChain) -> Result<Option<Argument>, Error> {
        match &self.options.default_argument {
            None => Ok(None),
            Some(DefaultArgument::Value(argument)) => Ok(Some(argument.clone())),
            Some(DefaultArgument::Provider(provider)) => Ok(Some(provider())),
            Some(DefaultArgument::AsyncProvider(_)) => Err(Error::sync_requires_async(
                &format!("default argument provider of {}", self.token),
                chain))
        }
    }

    /// Computes the argument when the resolve call passed none, awaiting async providers
    pub(crate) async fn default_argument_async(&self) -> Option<Argument> {
        match &self.options.default_argument {
            None => None,
            Some(DefaultArgument::Value(argument)) => Some(argument.clone()),
            Some(DefaultArgument::Provider(provider)) => Some(provider()),
            Some(DefaultArgument::AsyncProvider(provider)) => Some(provider().await)
        }
    }

    /// The cache key of an argument
    #[inline]
    pub(crate) fn identity(&self, argument: Option<&Argument>) -> ArgumentIdentity {
        match (&self.options.identity, argument) {
            (Some(identity), Some(argument)) => identity(argument),
            (_, argument) => ArgumentIdentity::of(argument)
        }
    }

    #[inline]
    pub(crate) fn singleton(&self, identity: &ArgumentIdentity) -> Option<Instance> {
        self.singletons
            .lock()
            .expect("singleton cache lock poisoned")
            .get(identity)
            .map(|entry| entry.instance.clone())
    }

    /// Stores a singleton value; if another call stored one first, that one is returned
    pub(crate) fn store_singleton(&self, identity: ArgumentIdentity, entry: CacheEntry) -> Instance {
        self.singletons
            .lock()
            .expect("singleton cache lock poisoned")
            .entry(identity)
            .or_insert(entry)
            .instance
            .clone()
    }

    pub(crate) fn clear(&self) {
        self.singletons
            .lock()
            .expect("singleton cache lock poisoned")
            .clear();
    }
}

/// The registrations of a token: exactly one, or an ordered list for multi tokens
#[derive(Debug, Clone)]
pub enum Registrations {
    /// A single registration
    Single(Arc<Registration>),

    /// A multi token, in registration order
    Multi(Vec<Arc<Registration>>),
}

impl Registrations {
    /// Returns `true` for multi tokens
    #[inline]
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// The registration a plain resolve uses: the single one, or the last one of a multi token
    #[inline]
    pub fn last(&self) -> Option<&Arc<Registration>> {
        match self {
            Self::Single(registration) => Some(registration),
            Self::Multi(registrations) => registrations.last(),
        }
    }

    /// All registrations in registration order
    #[inline]
    pub fn as_slice(&self) -> &[Arc<Registration>] {
        match self {
            Self::Single(registration) => std::slice::from_ref(registration),
            Self::Multi(registrations) => registrations,
        }
    }

    /// Number of registrations
    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns `true` if there are no registrations
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Merges new registrations of `token` into the existing ones
    pub(crate) fn merge(
        existing: Option<Self>,
        token: &Token,
        mut added: Vec<Arc<Registration>>,
        multi: bool
    ) -> Result<Self, Error> {
        match (existing, multi) {
            (None | Some(Self::Single(_)), false) => added
                .pop()
                .map(Self::Single)
                .ok_or_else(|| Error::registration_conflict(token)),
            (None, true) => Ok(Self::Multi(added)),
            (Some(Self::Multi(mut registrations)), true) => {
                registrations.append(&mut added);
                Ok(Self::Multi(registrations))
            },
            _ => Err(Error::registration_conflict(token))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, argument};

    fn registration(value: u32) -> Arc<Registration> {
        Arc::new(Registration::new(
            Token::named("value"),
            Provider::value(value),
            RegistrationOptions::new(),
            Weak::new()).unwrap())
    }

    #[test]
    fn it_replaces_single_registrations() {
        let token = Token::named("value");
        let first = Registrations::merge(None, &token, vec![registration(1)], false).unwrap();
        let second = Registrations::merge(Some(first), &token, vec![registration(2)], false).unwrap();

        assert!(!second.is_multi());
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn it_appends_multi_registrations() {
        let token = Token::named("value");
        let first = Registrations::merge(None, &token, vec![registration(1), registration(2)], true).unwrap();
        let second = Registrations::merge(Some(first), &token, vec![registration(3)], true).unwrap();

        assert!(second.is_multi());
        assert_eq!(second.len(), 3);
        assert!(Arc::ptr_eq(second.last().unwrap(), &second.as_slice()[2]));
    }

    #[test]
    fn it_rejects_mixing_single_and_multi() {
        let token = Token::named("value");
        let single = Registrations::merge(None, &token, vec![registration(1)], false).unwrap();
        let err = Registrations::merge(Some(single), &token, vec![registration(2)], true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RegistrationConflict);

        let multi = Registrations::merge(None, &token, vec![registration(1)], true).unwrap();
        let err = Registrations::merge(Some(multi), &token, vec![registration(2)], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RegistrationConflict);
    }

    #[test]
    fn it_uses_custom_argument_identity() {
        let registration = Registration::new(
            Token::named("value"),
            Provider::value(1u32),
            RegistrationOptions::new().argument_identity(|arg| arg.downcast_ref::<u32>().copied()),
            Weak::new()).unwrap();

        let first = registration.identity(Some(&argument(5u32)));
        let second = registration.identity(Some(&argument(5u32)));
        assert!(first == second);
        assert!(registration.identity(None) == ArgumentIdentity::None);
    }

    #[test]
    fn it_keeps_the_first_singleton() {
        let registration = registration(1);
        let first = registration.store_singleton(ArgumentIdentity::None, CacheEntry::new(Instance::new(1u32), None));
        let second = registration.store_singleton(ArgumentIdentity::None, CacheEntry::new(Instance::new(2u32), None));

        assert!(Instance::ptr_eq(&first, &second));
        assert!(registration.singleton(&ArgumentIdentity::None).is_some());

        registration.clear();
        assert!(registration.singleton(&ArgumentIdentity::None).is_none());
    }

    #[test]
    fn it_rejects_async_default_arguments_in_sync_api() {
        let registration = Registration::new(
            Token::named("value"),
            Provider::value(1u32),
            RegistrationOptions::new().async_default_argument_provider(|| async { argument(1u8) }),
            Weak::new()).unwrap();

        let err = registration.default_argument(&ResolveChain::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyncRequiresAsync);
    }
}
