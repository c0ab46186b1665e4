//! Asynchronous resolution
//!
//! Follows the same steps as the synchronous resolution, but awaits async factories,
//! async default arguments and async hooks instead of failing on them.
//! Constructor parameters are still resolved one at a time, in declaration order.

use super::{
    Injector,
    resolve::{ParameterStep, Resolved, Route, alias_step, construct, missing, parameter_step}
};
use crate::{
    Argument, Instance, Provider, ResolveOptions, Token,
    chain::ResolveChain,
    context::{ResolveContext, ResolveState},
    error::Error,
    registration::Registration,
    type_info::ParameterValue
};
use futures_util::future::BoxFuture;
use std::sync::Arc;

impl Injector {
    /// Resolves a single token with the async API
    pub(crate) fn resolve_in_async<'a>(
        &'a self,
        state: &'a Arc<ResolveState>,
        token: &'a Token,
        argument: Option<Argument>,
        options: ResolveOptions,
        chain: &'a ResolveChain
    ) -> BoxFuture<'a, Result<Resolved, Error>> {
        Box::pin(async move {
            match self.route(state, token, argument.as_ref(), options, chain)? {
                Route::Done(resolved) => Ok(resolved),
                Route::Delegate(parent, options) => parent
                    .resolve_in_async(state, token, argument, options, chain)
                    .await,
                Route::Found(registrations) => match registrations.last() {
                    Some(registration) => self
                        .resolve_registration_async(state, registration, argument, chain)
                        .await
                        .map(Resolved::Instance),
                    None => missing(token, options, chain)
                }
            }
        })
    }

    /// Resolves every registration of a token with the async API
    pub(crate) fn resolve_all_in_async<'a>(
        &'a self,
        state: &'a Arc<ResolveState>,
        token: &'a Token,
        argument: Option<Argument>,
        options: ResolveOptions,
        chain: &'a ResolveChain
    ) -> BoxFuture<'a, Result<Vec<Instance>, Error>> {
        Box::pin(async move {
            let options = options.without_forward_ref();
            match self.route(state, token, argument.as_ref(), options, chain)? {
                Route::Done(_) => Ok(Vec::new()),
                Route::Delegate(parent, options) => parent
                    .resolve_all_in_async(state, token, argument, options, chain)
                    .await,
                Route::Found(registrations) => {
                    let mut instances = Vec::with_capacity(registrations.len());
                    for registration in registrations.as_slice() {
                        let instance = self
                            .resolve_registration_async(state, registration, argument.clone(), chain)
                            .await?;
                        instances.push(instance);
                    }
                    Ok(instances)
                }
            }
        })
    }

    async fn resolve_registration_async(
        &self,
        state: &Arc<ResolveState>,
        registration: &Arc<Registration>,
        argument: Option<Argument>,
        chain: &ResolveChain
    ) -> Result<Instance, Error> {
        let chain = self.enter(state, registration, chain)?;
        let result = self.produce_async(state, registration, argument, chain).await;
        state.leave(registration.token());
        result
    }

    async fn produce_async(
        &self,
        state: &Arc<ResolveState>,
        registration: &Arc<Registration>,
        argument: Option<Argument>,
        chain: ResolveChain
    ) -> Result<Instance, Error> {
        let argument = match argument {
            Some(argument) => Some(argument),
            None => registration.default_argument_async().await
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
                        ParameterStep::Resolve { token, argument, options, all: true, chain } => ParameterValue::All(self
                            .resolve_all_in_async(state, &token, argument, options, &chain)
                            .await?),
                        ParameterStep::Resolve { token, argument, options, all: false, chain } => self
                            .resolve_in_async(state, &token, argument, options, &chain)
                            .await?
                            .into_parameter(),
                    };
                    values.push(value);
                }
                construct(info, values, &chain)?
            },
            Provider::Token(alias) => {
                let (argument, chain) = alias_step(alias, argument.as_ref(), &chain);
                if alias.resolve_all {
                    let instances = self
                        .resolve_all_in_async(state, &alias.token, argument, ResolveOptions::new(), &chain)
                        .await?;
                    Instance::new(instances)
                } else {
                    self.resolve_in_async(state, &alias.token, argument, ResolveOptions::new(), &chain)
                        .await?
                        .into_instance()
                        .ok_or_else(|| Error::no_provider(&alias.token, &chain))?
                }
            },
            Provider::Factory(factory) => {
                let context = ResolveContext::new(self.clone(), state.clone(), chain.clone());
                (factory.factory)(argument.clone(), &context)
                    .map_err(|err| Error::factory(registration.token(), &chain, err))?
            },
            Provider::AsyncFactory(factory) => {
                let context = ResolveContext::new(self.clone(), state.clone(), chain.clone());
                (factory.factory)(argument.clone(), context)
                    .await
                    .map_err(|err| Error::factory(registration.token(), &chain, err))?
            }
        };

        Ok(self.complete(state, registration, instance, argument, identity, chain))
    }
}
