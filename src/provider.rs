//! Strategies that produce values for tokens

use crate::{
    Argument, Instance, Token, TypeInfo,
    context::{AfterResolveContext, ResolveContext},
    error::{BoxError, Error},
    type_info::ParameterArgument
};
use futures_util::future::BoxFuture;
use std::{
    any::{TypeId, type_name},
    fmt,
    future::Future,
    sync::Arc
};

pub(crate) type FactoryFn = Arc<
    dyn Fn(Option<Argument>, &ResolveContext) -> Result<Instance, BoxError>
    + Send
    + Sync
>;

pub(crate) type AsyncFactoryFn = Arc<
    dyn Fn(Option<Argument>, ResolveContext) -> BoxFuture<'static, Result<Instance, BoxError>>
    + Send
    + Sync
>;

type SyncHookFn = Arc<
    dyn Fn(&Instance, &AfterResolveContext) -> Result<(), BoxError>
    + Send
    + Sync
>;

type AsyncHookFn = Arc<
    dyn Fn(Instance, AfterResolveContext) -> BoxFuture<'static, Result<(), BoxError>>
    + Send
    + Sync
>;

#[derive(Clone)]
pub(crate) enum HookFn {
    Sync(SyncHookFn),
    Async(AsyncHookFn),
}

/// A callback invoked once the whole object graph of a resolve call is built.
///
/// It can be attached to a factory provider or to a registration.
#[derive(Clone)]
pub struct AfterResolveHook(pub(crate) HookFn);

impl AfterResolveHook {
    /// Creates a synchronous hook
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&Instance, &AfterResolveContext) -> Result<(), BoxError> + Send + Sync + 'static
    {
        Self(HookFn::Sync(Arc::new(hook)))
    }

    /// Creates an asynchronous hook, values with it can only be resolved with the async API
    pub fn new_async<F, Fut>(hook: F) -> Self
    where
        F: Fn(Instance, AfterResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static
    {
        Self(HookFn::Async(Arc::new(move |instance, context| Box::pin(hook(instance, context)))))
    }

    /// Creates a synchronous hook for values of type `T`
    pub fn of<T, F>(hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &AfterResolveContext) -> Result<(), BoxError> + Send + Sync + 'static
    {
        Self::new(move |instance, context| match instance.downcast_ref::<T>() {
            Some(value) => hook(value, context),
            None => Err(Error::type_mismatch(type_name::<T>(), instance.type_name()).into())
        })
    }

    /// Returns `true` if the hook can only run in the async API
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self.0, HookFn::Async(_))
    }
}

impl fmt::Debug for AfterResolveHook {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AfterResolveHook(..)")
    }
}

/// Constructs a type from its recorded [`TypeInfo`]
#[derive(Clone)]
pub struct ClassProvider {
    type_id: TypeId,
    type_name: &'static str,
    info: Option<Arc<TypeInfo>>,
}

impl ClassProvider {
    /// Name of the constructed type
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Looks up the type info in the side table if it was not attached yet
    pub(crate) fn prepare(self) -> Result<Self, Error> {
        if self.info.is_some() {
            return Ok(self);
        }
        let info = TypeInfo::get(self.type_id)
            .ok_or_else(|| Error::not_injectable(self.type_name))?;
        Ok(Self { info: Some(info), ..self })
    }

    #[inline]
    pub(crate) fn type_info(&self) -> Result<&Arc<TypeInfo>, Error> {
        self.info
            .as_ref()
            .ok_or_else(|| Error::not_injectable(self.type_name))
    }
}

/// Redirects a token to another token
#[derive(Clone)]
pub struct TokenProvider {
    pub(crate) token: Token,
    pub(crate) resolve_all: bool,
    pub(crate) argument: Option<ParameterArgument>,
}

impl TokenProvider {
    /// Redirects to `token`
    #[inline]
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            resolve_all: false,
            argument: None
        }
    }

    /// Redirects to every registration of a multi token instead of just the last one
    #[inline]
    pub fn all(mut self) -> Self {
        self.resolve_all = true;
        self
    }

    /// Transforms the resolve argument before it is passed to the target token
    pub fn map_argument<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Option<&Argument>) -> Option<Argument> + Send + Sync + 'static
    {
        self.argument = Some(ParameterArgument::Map(Arc::new(mapper)));
        self
    }

    /// The target token
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    #[inline]
    pub(crate) fn argument(&self, argument: Option<&Argument>) -> Option<Argument> {
        match &self.argument {
            Some(mapper) => mapper.apply(argument),
            None => argument.cloned()
        }
    }
}

/// Produces values with a synchronous function
#[derive(Clone)]
pub struct FactoryProvider {
    pub(crate) factory: FactoryFn,
    pub(crate) hook: Option<AfterResolveHook>,
}

impl FactoryProvider {
    /// Creates a factory that returns a raw [`Instance`]
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(Option<Argument>, &ResolveContext) -> Result<Instance, BoxError> + Send + Sync + 'static
    {
        Self { factory: Arc::new(factory), hook: None }
    }

    /// Attaches a provider level after-resolve hook
    #[inline]
    pub fn after_resolve(mut self, hook: AfterResolveHook) -> Self {
        self.hook = Some(hook);
        self
    }
}

/// Produces values with an asynchronous function
#[derive(Clone)]
pub struct AsyncFactoryProvider {
    pub(crate) factory: AsyncFactoryFn,
    pub(crate) hook: Option<AfterResolveHook>,
}

impl AsyncFactoryProvider {
    /// Creates an async factory that returns a raw [`Instance`]
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn(Option<Argument>, ResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Instance, BoxError>> + Send + 'static
    {
        Self {
            factory: Arc::new(move |argument, context| Box::pin(factory(argument, context))),
            hook: None
        }
    }

    /// Attaches a provider level after-resolve hook
    #[inline]
    pub fn after_resolve(mut self, hook: AfterResolveHook) -> Self {
        self.hook = Some(hook);
        self
    }
}

/// A strategy that produces a value for a token
#[derive(Clone)]
pub enum Provider {
    /// A precomputed instance
    Value(Instance),

    /// Constructs a type from its recorded constructor metadata
    Class(ClassProvider),

    /// Redirects to another token
    Token(TokenProvider),

    /// Calls a synchronous function
    Factory(FactoryProvider),

    /// Calls an asynchronous function
    AsyncFactory(AsyncFactoryProvider),
}

impl Provider {
    /// A provider that always returns `value`
    #[inline]
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Instance::new(value))
    }

    /// A provider that always returns the same `instance`
    #[inline]
    pub fn instance(instance: Instance) -> Self {
        Self::Value(instance)
    }

    /// A provider that constructs `T` from its [`TypeInfo`]
    #[inline]
    pub fn class<T: Send + Sync + 'static>() -> Self {
        Self::Class(ClassProvider {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            info: None
        })
    }

    /// A provider that constructs `T` with [`Default`], no [`TypeInfo`] required
    #[inline]
    pub fn class_default<T: Default + Send + Sync + 'static>() -> Self {
        Self::Class(ClassProvider {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            info: Some(Arc::new(TypeInfo::trivial(T::default)))
        })
    }

    /// A provider that redirects to `token`
    #[inline]
    pub fn alias(token: impl Into<Token>) -> Self {
        Self::Token(TokenProvider::new(token))
    }

    /// A provider that redirects to every registration of a multi `token`
    #[inline]
    pub fn alias_all(token: impl Into<Token>) -> Self {
        Self::Token(TokenProvider::new(token).all())
    }

    /// A provider that calls `factory` with the resolve argument
    ///
    /// # Example
    /// ```
    /// use arbor_di::{Injector, Provider, RegistrationOptions, Token};
    ///
    /// struct Config { url: String }
    /// struct Client { url: String }
    ///
    /// let injector = Injector::new("root");
    /// injector.register(Token::of::<Config>(), Provider::value(Config { url: "db://".into() }), RegistrationOptions::new()).unwrap();
    /// injector.register(Token::of::<Client>(), Provider::factory(|_, ctx| {
    ///     let config = ctx.resolve::<Config>()?;
    ///     Ok::<_, arbor_di::Error>(Client { url: config.url.clone() })
    /// }), RegistrationOptions::new()).unwrap();
    ///
    /// assert_eq!(injector.resolve::<Client>().unwrap().url, "db://");
    /// ```
    pub fn factory<T, E, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(Option<Argument>, &ResolveContext) -> Result<T, E> + Send + Sync + 'static
    {
        Self::Factory(FactoryProvider::new(move |argument, context| factory(argument, context)
            .map(Instance::new)
            .map_err(Into::into)))
    }

    /// A provider that calls `factory` that builds the [`Instance`] itself, e.g. a disposable one
    #[inline]
    pub fn factory_instance<F>(factory: F) -> Self
    where
        F: Fn(Option<Argument>, &ResolveContext) -> Result<Instance, BoxError> + Send + Sync + 'static
    {
        Self::Factory(FactoryProvider::new(factory))
    }

    /// A provider that awaits `factory`, it can only be resolved with the async API
    pub fn async_factory<T, E, F, Fut>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(Option<Argument>, ResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static
    {
        Self::AsyncFactory(AsyncFactoryProvider::new(move |argument, context| {
            let future = factory(argument, context);
            async move {
                future.await
                    .map(Instance::new)
                    .map_err(Into::into)
            }
        }))
    }

    /// An async provider that builds the [`Instance`] itself
    #[inline]
    pub fn async_factory_instance<F, Fut>(factory: F) -> Self
    where
        F: Fn(Option<Argument>, ResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Instance, BoxError>> + Send + 'static
    {
        Self::AsyncFactory(AsyncFactoryProvider::new(factory))
    }

    /// The provider level after-resolve hook
    #[inline]
    pub fn hook(&self) -> Option<&AfterResolveHook> {
        match self {
            Self::Factory(factory) => factory.hook.as_ref(),
            Self::AsyncFactory(factory) => factory.hook.as_ref(),
            _ => None
        }
    }

    /// Returns `true` if the provider can only be resolved with the async API
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self, Self::AsyncFactory(_))
    }

    pub(crate) fn prepare(self) -> Result<Self, Error> {
        match self {
            Self::Class(class) => class.prepare().map(Self::Class),
            provider => Ok(provider)
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Class(_) => "class",
            Self::Token(_) => "token",
            Self::Factory(_) => "factory",
            Self::AsyncFactory(_) => "async factory",
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(class) => write!(f, "Provider::Class({})", class.type_name),
            Self::Token(alias) => write!(f, "Provider::Token({}, all: {})", alias.token, alias.resolve_all),
            provider => write!(f, "Provider({})", provider.kind())
        }
    }
}

impl From<Instance> for Provider {
    #[inline]
    fn from(instance: Instance) -> Self {
        Self::Value(instance)
    }
}

impl From<ClassProvider> for Provider {
    #[inline]
    fn from(class: ClassProvider) -> Self {
        Self::Class(class)
    }
}

impl From<TokenProvider> for Provider {
    #[inline]
    fn from(alias: TokenProvider) -> Self {
        Self::Token(alias)
    }
}

impl From<FactoryProvider> for Provider {
    #[inline]
    fn from(factory: FactoryProvider) -> Self {
        Self::Factory(factory)
    }
}

impl From<AsyncFactoryProvider> for Provider {
    #[inline]
    fn from(factory: AsyncFactoryProvider) -> Self {
        Self::AsyncFactory(factory)
    }
}

/// One provider or a list of providers.
///
/// A list always registers a multi token, even if it has a single element.
#[derive(Clone, Debug)]
pub struct Providers {
    pub(crate) providers: Vec<Provider>,
    pub(crate) multi: bool,
}

impl From<Provider> for Providers {
    #[inline]
    fn from(provider: Provider) -> Self {
        Self { providers: vec![provider], multi: false }
    }
}

macro_rules! impl_single_providers {
    ($($provider:ty),*) => {
        $(impl From<$provider> for Providers {
            #[inline]
            fn from(provider: $provider) -> Self {
                Provider::from(provider).into()
            }
        })*
    };
}

impl_single_providers! { Instance, ClassProvider, TokenProvider, FactoryProvider, AsyncFactoryProvider }

impl From<Vec<Provider>> for Providers {
    #[inline]
    fn from(providers: Vec<Provider>) -> Self {
        Self { providers, multi: true }
    }
}

impl<const N: usize> From<[Provider; N]> for Providers {
    #[inline]
    fn from(providers: [Provider; N]) -> Self {
        Self { providers: providers.into(), multi: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument;

    #[derive(Default)]
    struct Plain;

    struct Unmarked;

    #[test]
    fn it_requires_type_info_for_classes() {
        let err = Provider::class::<Unmarked>().prepare().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotInjectable);

        assert!(Provider::class_default::<Plain>().prepare().is_ok());
    }

    #[test]
    fn it_maps_alias_arguments() {
        let alias = TokenProvider::new("target");
        let arg = argument(1u8);
        assert!(alias.argument(Some(&arg)).is_some());

        let alias = TokenProvider::new("target")
            .all()
            .map_argument(|_| None);
        assert!(alias.resolve_all);
        assert!(alias.argument(Some(&arg)).is_none());
    }

    #[test]
    fn it_marks_lists_as_multi() {
        let single = Providers::from(Provider::value(1u8));
        let list = Providers::from(vec![Provider::value(1u8)]);
        let array = Providers::from([Provider::value(1u8), Provider::value(2u8)]);

        assert!(!single.multi);
        assert!(list.multi);
        assert!(array.multi);
        assert_eq!(array.providers.len(), 2);
    }

    #[test]
    fn it_exposes_provider_hooks() {
        let provider = Provider::from(FactoryProvider::new(|_, _| Ok(Instance::new(1u8)))
            .after_resolve(AfterResolveHook::new(|_, _| Ok(()))));
        assert!(provider.hook().is_some());
        assert!(!provider.is_async());

        let provider = Provider::async_factory(|_, _| async { Ok::<_, BoxError>(1u8) });
        assert!(provider.hook().is_none());
        assert!(provider.is_async());
    }
}
