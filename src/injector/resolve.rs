//! Synchronous resolution and the steps it shares with the asynchronous one

use super::Injector;
use crate::{
    Argument, Instance, Lifecycle, Provider, ResolveOptions, Token,
    chain::{ChainNode, ResolveChain},
    context::{DeferredEdge, Resolution, ResolveContext, ResolveState},
    error::Error,
    forward_ref::ForwardSlot,
    instance::{ArgumentIdentity, CacheEntry},
    provider::TokenProvider,
    registration::{Registration, Registrations},
    type_info::{Arguments, Parameter, ParameterValue, TypeInfo}
};
use std::sync::Arc;

/// Outcome of resolving a single token
pub(crate) enum Resolved {
    Instance(Instance),
    Missing,
    Forward(ForwardSlot),
}

impl Resolved {
    /// The value a caller sees once post-processing is done
    #[inline]
    pub(crate) fn into_instance(self) -> Option<Instance> {
        match self {
            Resolved::Instance(instance) => Some(instance),
            Resolved::Missing => None,
            Resolved::Forward(slot) => slot.instance().cloned(),
        }
    }

    #[inline]
    pub(super) fn into_parameter(self) -> ParameterValue {
        match self {
            Resolved::Instance(instance) => ParameterValue::Instance(instance),
            Resolved::Missing => ParameterValue::Missing,
            Resolved::Forward(slot) => ParameterValue::Forward(slot),
        }
    }
}

/// Where the lookup of a token ended
pub(super) enum Route {
    Done(Resolved),
    Delegate(Injector, ResolveOptions),
    Found(Registrations),
}

/// What to do with a constructor parameter
pub(super) enum ParameterStep {
    Value(ParameterValue),
    Resolve {
        token: Token,
        argument: Option<Argument>,
        options: ResolveOptions,
        all: bool,
        chain: ResolveChain,
    },
}

impl Injector {
    /// Disposed check, forward references, `skip_self` delegation and the lookup
    pub(super) fn route(
        &self,
        state: &ResolveState,
        token: &Token,
        argument: Option<&Argument>,
        options: ResolveOptions,
        chain: &ResolveChain
    ) -> Result<Route, Error> {
        self.ensure_alive()?;

        if options.is_forward_ref() {
            let slot = ForwardSlot::pending(token.clone());
            state.defer(DeferredEdge {
                injector: self.clone(),
                token: token.clone(),
                argument: argument.cloned(),
                options: options.without_forward_ref(),
                chain: chain.add(ChainNode::ForwardRef(token.clone())),
                slot: slot.clone()
            });
            return Ok(Route::Done(Resolved::Forward(slot)));
        }

        if options.is_skip_self() {
            return match (self.parent(), options.is_only_self()) {
                (Some(parent), false) => Ok(Route::Delegate(parent.clone(), options.without_skip_self())),
                _ => missing(token, options, chain).map(Route::Done)
            };
        }

        match self.try_get_registration(token, options.lookup()) {
            Some(registrations) if !registrations.is_empty() => Ok(Route::Found(registrations)),
            _ => missing(token, options, chain).map(Route::Done)
        }
    }

    /// Overflow and self-cycle guards
    pub(super) fn enter(
        &self,
        state: &ResolveState,
        registration: &Registration,
        chain: &ResolveChain
    ) -> Result<ResolveChain, Error> {
        let chain = chain.add(ChainNode::Token(registration.token().clone()));
        state.enter(registration.token(), &chain, self.config())?;
        Ok(chain)
    }

    /// Looks up the lifecycle cache of a registration
    pub(super) fn cached(
        &self,
        state: &ResolveState,
        registration: &Registration,
        identity: &ArgumentIdentity
    ) -> Option<Instance> {
        match registration.lifecycle() {
            Lifecycle::Transient => None,
            Lifecycle::Singleton => registration.singleton(identity),
            Lifecycle::Resolution => state.scoped(registration.token(), identity),
            Lifecycle::Injector => self.scoped(registration.token(), identity),
        }
    }

    /// Caches a produced value, schedules its disposal and records it for post-processing.
    ///
    /// If another call cached a value first, that value is returned instead.
    pub(super) fn complete(
        &self,
        state: &ResolveState,
        registration: &Arc<Registration>,
        instance: Instance,
        argument: Option<Argument>,
        identity: ArgumentIdentity,
        chain: ResolveChain
    ) -> Instance {
        let entry = CacheEntry::new(instance.clone(), argument.clone());
        let token = registration.token().clone();
        let stored = match registration.lifecycle() {
            Lifecycle::Transient => instance.clone(),
            Lifecycle::Singleton => registration.store_singleton(identity, entry),
            Lifecycle::Resolution => state.store_scoped(token, identity, entry),
            Lifecycle::Injector => self.store_scoped(token, identity, entry),
        };
        if !Instance::ptr_eq(&stored, &instance) {
            return stored;
        }

        if instance.is_disposable() {
            match registration.lifecycle() {
                Lifecycle::Singleton => registration
                    .owner()
                    .unwrap_or_else(|| self.clone())
                    .push_disposable(&instance),
                _ => self.push_disposable(&instance)
            }
        }

        state.record(Resolution {
            registration: registration.clone(),
            instance: instance.clone(),
            argument,
            chain,
            injector: self.clone()
        });
        instance
    }

    /// Resolves a single token
    pub(crate) fn resolve_in(
        &self,
        state: &Arc<ResolveState>,
        token: &Token,
        argument: Option<Argument>,
        options: ResolveOptions,
        chain: &ResolveChain
    ) -> Result<Resolved, Error> {
        match self.route(state, token, argument.as_ref(), options, chain)? {
            Route::Done(resolved) => Ok(resolved),
            Route::Delegate(parent, options) => parent.resolve_in(state, token, argument, options, chain),
            Route::Found(registrations) => match registrations.last() {
                Some(registration) => self
                    .resolve_registration(state, registration, argument, chain)
                    .map(Resolved::Instance),
                None => missing(token, options, chain)
            }
        }
    }

    /// Resolves every registration of a token
    pub(crate) fn resolve_all_in(
        &self,
        state: &Arc<ResolveState>,
        token: &Token,
        argument: Option<Argument>,
        options: ResolveOptions,
        chain: &ResolveChain
    ) -> Result<Vec<Instance>, Error> {
        let options = options.without_forward_ref();
        match self.route(state, token, argument.as_ref(), options, chain)? {
            Route::Done(_) => Ok(Vec::new()),
            Route::Delegate(parent, options) => parent.resolve_all_in(state, token, argument, options, chain),
            Route::Found(registrations) => registrations
                .as_slice()
                .iter()
                .map(|registration| self.resolve_registration(state, registration, argument.clone(), chain))
                .collect()
        }
    }

    fn resolve_registration(
        &self,
        state: &Arc<ResolveState>,
        registration: &Arc<Registration>,
        argument: Option<Argument>,
        chain: &ResolveChain
    ) -> Result<Instance, Error> {
        let chain = self.enter(state, registration, chain)?;
        let result = self.produce(state, registration, argument, chain);
        state.leave(registration.token());
        result
    }

    fn produce(
        &self,
        state: &Arc<ResolveState>,
        registration: &Arc<Registration>,
        argument: Option<Argument>,
        chain: ResolveChain
    ) -> Result<Instance, Error> {
        let argument = match argument {
            Some(argument) => Some(argument),
            None => registration.default_argument(&chain)?
        };
        let identity = registration.identity(argument.as_ref());
        if let Some(instance) = self.cached(state, registration, &identity) {
            return Ok(instance);
        }

        let instance = match registration.provider() {
            Provider::Value(instance) => instance.clone(),
            Provider::Class(class) => {
                let info = class.type_info()?;
                let mut values = Vec::with_capacity(info.parameters().len());
                for (index, parameter) in info.parameters().iter().enumerate() {
                    let value = match parameter_step(info, index, parameter, argument.as_ref(), &chain)? {
                        ParameterStep::Value(value) => value,
                        ParameterStep::Resolve { token, argument, options, all: true, chain } =>
                            ParameterValue::All(self.resolve_all_in(state, &token, argument, options, &chain)?),
                        ParameterStep::Resolve { token, argument, options, all: false, chain } =>
                            self.resolve_in(state, &token, argument, options, &chain)?.into_parameter(),
                    };
                    values.push(value);
                }
                construct(info, values, &chain)?
            },
            Provider::Token(alias) => {
                let (argument, chain) = alias_step(alias, argument.as_ref(), &chain);
                if alias.resolve_all {
                    Instance::new(self.resolve_all_in(state, &alias.token, argument, ResolveOptions::new(), &chain)?)
                } else {
                    self.resolve_in(state, &alias.token, argument, ResolveOptions::new(), &chain)?
                        .into_instance()
                        .ok_or_else(|| Error::no_provider(&alias.token, &chain))?
                }
            },
            Provider::Factory(factory) => {
                let context = ResolveContext::new(self.clone(), state.clone(), chain.clone());
                (factory.factory)(argument.clone(), &context)
                    .map_err(|err| Error::factory(registration.token(), &chain, err))?
            },
            Provider::AsyncFactory(_) => return Err(Error::sync_requires_async(
                &format!("async factory of {}", registration.token()),
                &chain))
        };

        Ok(self.complete(state, registration, instance, argument, identity, chain))
    }
}

/// The result of a lookup that found nothing
#[inline]
pub(super) fn missing(token: &Token, options: ResolveOptions, chain: &ResolveChain) -> Result<Resolved, Error> {
    if options.is_optional() {
        Ok(Resolved::Missing)
    } else {
        Err(Error::no_provider(token, &chain.add(ChainNode::Token(token.clone()))))
    }
}

/// Decides how a constructor parameter gets its value
pub(super) fn parameter_step(
    info: &TypeInfo,
    index: usize,
    parameter: &Parameter,
    argument: Option<&Argument>,
    chain: &ResolveChain
) -> Result<ParameterStep, Error> {
    let chain = chain.add(ChainNode::Parameter {
        type_name: info.type_name(),
        index,
        token: parameter.token.clone()
    });
    if parameter.inject_argument {
        return Ok(ParameterStep::Value(ParameterValue::Argument(argument.cloned())));
    }

    let token = parameter.token
        .clone()
        .ok_or_else(|| Error::token_undefined(&chain))?;
    let argument = parameter.argument
        .as_ref()
        .and_then(|mapper| mapper.apply(argument));

    let mut options = ResolveOptions::new();
    if parameter.optional {
        options = options.optional();
    }
    if parameter.forward_ref {
        options = options.forward_ref();
    }
    Ok(ParameterStep::Resolve {
        token,
        argument,
        options,
        all: parameter.resolve_all,
        chain
    })
}

/// The argument and chain an alias resolves its target with
#[inline]
pub(super) fn alias_step(
    alias: &TokenProvider,
    argument: Option<&Argument>,
    chain: &ResolveChain
) -> (Option<Argument>, ResolveChain) {
    (alias.argument(argument), chain.add(ChainNode::Alias(alias.token.clone())))
}

/// Calls the constructor of a class provider
#[inline]
pub(super) fn construct(info: &TypeInfo, values: Vec<ParameterValue>, chain: &ResolveChain) -> Result<Instance, Error> {
    info.construct(Arguments::new(info.type_name(), values))
        .map_err(|err| Error::constructor(info.type_name(), chain, err))
}
