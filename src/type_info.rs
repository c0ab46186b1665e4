//! Constructor metadata of injectable types
//!
//! A class provider does not know how to build a value on its own; it relies on the
//! [`TypeInfo`] recorded for the target type: the ordered list of constructor [`Parameter`]s
//! and the constructor itself. The metadata lives in a process-wide side table keyed by type.

use crate::{
    Argument, Instance, Token, ForwardRef,
    error::{BoxError, Error},
    forward_ref::ForwardSlot,
    instance::{Disposer, ValueHook, Dispose, AsyncDispose, AfterResolve, AsyncAfterResolve}
};
use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{Arc, OnceLock, RwLock}
};

/// Maps the argument of a dependent to the argument of one of its dependencies
pub type ArgumentMapper = Arc<
    dyn Fn(Option<&Argument>) -> Option<Argument>
    + Send
    + Sync
>;

type Constructor = Arc<
    dyn Fn(Arguments) -> Result<Instance, BoxError>
    + Send
    + Sync
>;

#[derive(Clone)]
pub(crate) enum ParameterArgument {
    Value(Argument),
    Map(ArgumentMapper),
}

impl ParameterArgument {
    #[inline]
    pub(crate) fn apply(&self, argument: Option<&Argument>) -> Option<Argument> {
        match self {
            ParameterArgument::Value(value) => Some(value.clone()),
            ParameterArgument::Map(mapper) => mapper(argument),
        }
    }
}

/// Describes a single constructor parameter of an injectable type
#[derive(Clone, Default)]
pub struct Parameter {
    pub(crate) token: Option<Token>,
    pub(crate) optional: bool,
    pub(crate) resolve_all: bool,
    pub(crate) forward_ref: bool,
    pub(crate) inject_argument: bool,
    pub(crate) argument: Option<ParameterArgument>,
}

impl Parameter {
    /// A parameter without a token; resolving it fails unless a token is set with [`Parameter::inject`]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A parameter resolved by the type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::token(Token::of::<T>())
    }

    /// A parameter resolved by an explicit token
    #[inline]
    pub fn token(token: impl Into<Token>) -> Self {
        Self { token: Some(token.into()), ..Self::default() }
    }

    /// A parameter that receives the resolve argument of the type being constructed
    #[inline]
    pub fn resolve_argument() -> Self {
        Self { inject_argument: true, ..Self::default() }
    }

    /// Overrides the token this parameter is resolved by
    #[inline]
    pub fn inject(mut self, token: impl Into<Token>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Resolves to nothing instead of failing if the token is not registered
    #[inline]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Resolves every registration of a multi token.
    ///
    /// Can't be combined with [`Parameter::forward_ref`].
    #[inline]
    pub fn all(mut self) -> Self {
        self.resolve_all = true;
        self.forward_ref = false;
        self
    }

    /// Defers the resolution after the dependent is constructed, see [`ForwardRef`]
    #[inline]
    pub fn forward_ref(mut self) -> Self {
        self.forward_ref = !self.resolve_all;
        self
    }

    /// Resolves the parameter with a fixed argument
    #[inline]
    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.argument = Some(ParameterArgument::Value(argument));
        self
    }

    /// Resolves the parameter with an argument derived from the argument of the dependent
    pub fn map_argument<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Option<&Argument>) -> Option<Argument> + Send + Sync + 'static
    {
        self.argument = Some(ParameterArgument::Map(Arc::new(mapper)));
        self
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("token", &self.token)
            .field("optional", &self.optional)
            .field("resolve_all", &self.resolve_all)
            .field("forward_ref", &self.forward_ref)
            .field("inject_argument", &self.inject_argument)
            .finish()
    }
}

/// A resolved constructor argument
pub(crate) enum ParameterValue {
    Instance(Instance),
    Missing,
    All(Vec<Instance>),
    Forward(ForwardSlot),
    Argument(Option<Argument>),
}

/// The resolved parameters handed to a constructor, in declaration order
pub struct Arguments {
    type_name: &'static str,
    values: Vec<ParameterValue>,
}

impl Arguments {
    #[inline]
    pub(crate) fn new(type_name: &'static str, values: Vec<ParameterValue>) -> Self {
        Self { type_name, values }
    }

    /// Number of parameters
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the constructor has no parameters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the required parameter at `index`
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, Error> {
        self.optional(index)?
            .ok_or_else(|| self.mismatch::<T>(index, "missing"))
    }

    /// Returns the parameter at `index`, `None` if it was optional and not registered
    pub fn optional<T: Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>, Error> {
        match self.value(index)? {
            ParameterValue::Instance(instance) => instance
                .downcast::<T>()
                .map(Some)
                .ok_or_else(|| self.mismatch::<T>(index, instance.type_name())),
            ParameterValue::Missing => Ok(None),
            ParameterValue::All(_) => Err(self.mismatch::<T>(index, "a list")),
            ParameterValue::Forward(_) => Err(self.mismatch::<T>(index, "a forward reference")),
            ParameterValue::Argument(_) => Err(self.mismatch::<T>(index, "the resolve argument")),
        }
    }

    /// Returns every value of a parameter declared with [`Parameter::all`]
    pub fn all<T: Send + Sync + 'static>(&self, index: usize) -> Result<Vec<Arc<T>>, Error> {
        match self.value(index)? {
            ParameterValue::All(instances) => instances
                .iter()
                .map(|instance| instance
                    .downcast::<T>()
                    .ok_or_else(|| self.mismatch::<T>(index, instance.type_name())))
                .collect(),
            ParameterValue::Instance(instance) => instance
                .downcast::<T>()
                .map(|value| vec![value])
                .ok_or_else(|| self.mismatch::<T>(index, instance.type_name())),
            ParameterValue::Missing => Ok(Vec::new()),
            ParameterValue::Forward(_) => Err(self.mismatch::<Vec<T>>(index, "a forward reference")),
            ParameterValue::Argument(_) => Err(self.mismatch::<Vec<T>>(index, "the resolve argument")),
        }
    }

    /// Returns a parameter declared with [`Parameter::forward_ref`]
    pub fn forward_ref<T: Send + Sync + 'static>(&self, index: usize) -> Result<ForwardRef<T>, Error> {
        match self.value(index)? {
            ParameterValue::Forward(slot) => Ok(ForwardRef::new(slot.clone())),
            ParameterValue::Instance(instance) if instance.is::<T>() => {
                let token = Token::of::<T>();
                Ok(ForwardRef::new(ForwardSlot::resolved(token, instance.clone())))
            },
            _ => Err(self.mismatch::<ForwardRef<T>>(index, "not a forward reference")),
        }
    }

    /// Returns the resolve argument if the parameter was declared with [`Parameter::resolve_argument`]
    pub fn argument<A: Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<A>>, Error> {
        match self.value(index)? {
            ParameterValue::Argument(None) => Ok(None),
            ParameterValue::Argument(Some(argument)) => argument
                .clone()
                .downcast::<A>()
                .map(Some)
                .map_err(|_| self.mismatch::<A>(index, "an argument of another type")),
            _ => Err(self.mismatch::<A>(index, "not the resolve argument")),
        }
    }

    /// Returns the raw instance at `index`, if the parameter resolved to a single value
    #[inline]
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        match self.values.get(index) {
            Some(ParameterValue::Instance(instance)) => Some(instance),
            _ => None
        }
    }

    fn value(&self, index: usize) -> Result<&ParameterValue, Error> {
        self.values
            .get(index)
            .ok_or_else(|| Error::type_mismatch(
                &format!("parameter {index} of {}", self.type_name),
                &format!("only {} parameter(s) declared", self.values.len())))
    }

    fn mismatch<T>(&self, index: usize, actual: &str) -> Error {
        Error::type_mismatch(
            &format!("{} for parameter {index} of {}", type_name::<T>(), self.type_name),
            actual)
    }
}

/// Constructor metadata of an injectable type
pub struct TypeInfo {
    type_id: TypeId,
    type_name: &'static str,
    parameters: Vec<Parameter>,
    constructor: Constructor,
    disposer: Option<Disposer>,
    hook: Option<ValueHook>,
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("type_name", &self.type_name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

type TypeInfoMap = HashMap<TypeId, Arc<TypeInfo>>;

fn table() -> &'static RwLock<TypeInfoMap> {
    static TABLE: OnceLock<RwLock<TypeInfoMap>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

impl TypeInfo {
    /// Starts recording the metadata of `T`
    #[inline]
    pub fn builder<T: Send + Sync + 'static>() -> TypeInfoBuilder<T> {
        TypeInfoBuilder::new()
    }

    /// Returns the recorded metadata of a type
    pub fn get(type_id: TypeId) -> Option<Arc<TypeInfo>> {
        table()
            .read()
            .expect("type info table lock poisoned")
            .get(&type_id)
            .cloned()
    }

    /// Returns the recorded metadata of `T`
    #[inline]
    pub fn of<T: 'static>() -> Option<Arc<TypeInfo>> {
        Self::get(TypeId::of::<T>())
    }

    /// Returns `true` if metadata was recorded for `T`
    #[inline]
    pub fn is_injectable<T: 'static>() -> bool {
        Self::of::<T>().is_some()
    }

    /// Metadata of a type that is built without any parameters
    pub(crate) fn trivial<T: Send + Sync + 'static>(constructor: fn() -> T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            parameters: Vec::new(),
            constructor: Arc::new(move |_| Ok(Instance::new(constructor()))),
            disposer: None,
            hook: None
        }
    }

    /// Id of the described type
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the described type
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Constructor parameters in declaration order
    #[inline]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub(crate) fn construct(&self, arguments: Arguments) -> Result<Instance, BoxError> {
        let mut instance = (self.constructor)(arguments)?;
        if let Some(disposer) = self.disposer {
            instance = instance.with_disposer(disposer);
        }
        if let Some(hook) = self.hook {
            instance = instance.with_hook(hook);
        }
        Ok(instance)
    }
}

/// Records the [`TypeInfo`] of `T`
///
/// # Example
/// ```
/// use arbor_di::{Parameter, TypeInfo};
/// use std::sync::Arc;
///
/// struct Config;
/// struct Repository { config: Arc<Config>, cache: Option<Arc<String>> }
///
/// TypeInfo::builder::<Repository>()
///     .parameter(Parameter::of::<Config>())
///     .parameter(Parameter::token("cache").optional())
///     .register(|args| Ok(Repository {
///         config: args.get(0)?,
///         cache: args.optional(1)?
///     }));
///
/// assert!(TypeInfo::is_injectable::<Repository>());
/// ```
pub struct TypeInfoBuilder<T> {
    parameters: Vec<Parameter>,
    disposer: Option<Disposer>,
    hook: Option<ValueHook>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TypeInfoBuilder<T> {
    #[inline]
    fn new() -> Self {
        Self {
            parameters: Vec::new(),
            disposer: None,
            hook: None,
            _marker: PhantomData
        }
    }

    /// Appends the next constructor parameter
    #[inline]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Disposes constructed values together with their injector
    #[inline]
    pub fn disposable(mut self) -> Self
    where
        T: Dispose
    {
        self.disposer = Some(Disposer::of::<T>());
        self
    }

    /// Disposes constructed values asynchronously together with their injector
    #[inline]
    pub fn async_disposable(mut self) -> Self
    where
        T: AsyncDispose
    {
        self.disposer = Some(Disposer::of_async::<T>());
        self
    }

    /// Calls [`AfterResolve::after_resolve`] on constructed values
    #[inline]
    pub fn after_resolve(mut self) -> Self
    where
        T: AfterResolve
    {
        self.hook = Some(ValueHook::of::<T>());
        self
    }

    /// Calls [`AsyncAfterResolve::after_resolve`] on constructed values
    #[inline]
    pub fn async_after_resolve(mut self) -> Self
    where
        T: AsyncAfterResolve
    {
        self.hook = Some(ValueHook::of_async::<T>());
        self
    }

    /// Stores the metadata in the side table, replacing any previous metadata of `T`
    pub fn register<F>(self, constructor: F) -> Arc<TypeInfo>
    where
        F: Fn(Arguments) -> Result<T, BoxError> + Send + Sync + 'static
    {
        let info = Arc::new(TypeInfo {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            parameters: self.parameters,
            constructor: Arc::new(move |args| constructor(args).map(Instance::new)),
            disposer: self.disposer,
            hook: self.hook
        });

        #[cfg(feature = "tracing")]
        tracing::trace!("type info recorded for {}", info.type_name);

        table()
            .write()
            .expect("type info table lock poisoned")
            .insert(info.type_id, info.clone());
        info
    }
}

/// Records the [`TypeInfo`] of a struct whose fields are all resolved by their type
///
/// # Macro Syntax
/// ```ignore
/// injectable! {
///     TypeName { field1: Dependency1, field2: Dependency2 }
/// };
/// ```
/// Each field must be an `Arc` of the dependency type.
///
/// # Example
/// ```
/// use arbor_di::{injectable, TypeInfo};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Logger;
///
/// struct Service {
///     logger: Arc<Logger>,
/// }
///
/// injectable! { Service { logger: Logger } };
///
/// assert_eq!(TypeInfo::of::<Service>().unwrap().parameters().len(), 1);
/// ```
#[macro_export]
macro_rules! injectable {
    ($name:ident { $($field:ident : $dependency:ty),* $(,)? }) => {
        $crate::TypeInfo::builder::<$name>()
            $(.parameter($crate::Parameter::of::<$dependency>()))*
            .register(|args| $crate::injectable!(@fields $name, args, 0usize, [] $($field : $dependency,)*))
    };
    (@fields $name:ident, $args:ident, $index:expr, [$($built:tt)*]) => {
        Ok($name { $($built)* })
    };
    (@fields $name:ident, $args:ident, $index:expr, [$($built:tt)*] $field:ident : $dependency:ty, $($rest:tt)*) => {
        $crate::injectable!(
            @fields $name, $args, $index + 1usize,
            [$($built)* $field: $args.get::<$dependency>($index)?,]
            $($rest)*)
    };
}
