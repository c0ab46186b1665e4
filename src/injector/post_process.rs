//! Post-processing of the outermost resolve call
//!
//! Once the object graph is built: deferred edges are resolved in FIFO order and patched into
//! their placeholders, every placeholder is sealed, then after-resolve hooks run over the
//! recorded resolutions from the most recently constructed value to the first one.

use super::Injector;
use crate::{
    context::{AfterResolveContext, Resolution, ResolveState},
    error::{BoxError, Error},
    instance::ValueHook,
    provider::{AfterResolveHook, HookFn}
};
use std::sync::Arc;

impl Injector {
    pub(crate) fn post_process(state: &Arc<ResolveState>) -> Result<(), Error> {
        while let Some(edge) = state.next_deferred() {
            let resolved = edge.injector.resolve_in(state, &edge.token, edge.argument, edge.options, &edge.chain)?;
            if let Some(instance) = resolved.into_instance() {
                edge.slot.patch(instance);
            }
        }
        seal(state);

        for resolution in state.take_resolutions().into_iter().rev() {
            let context = hook_context(state, &resolution);
            if let Some(hook) = resolution.instance.hook() {
                let result = match hook {
                    ValueHook::Sync(hook) => hook(resolution.instance.value(), &context),
                    ValueHook::Async(_) => return Err(async_hook(&resolution))
                };
                result.map_err(|err| hook_failed(&resolution, err))?;
            }
            for hook in hooks(&resolution) {
                let result = match &hook.0 {
                    HookFn::Sync(hook) => hook(&resolution.instance, &context),
                    HookFn::Async(_) => return Err(async_hook(&resolution))
                };
                result.map_err(|err| hook_failed(&resolution, err))?;
            }
        }
        Ok(())
    }

    pub(crate) async fn post_process_async(state: &Arc<ResolveState>) -> Result<(), Error> {
        while let Some(edge) = state.next_deferred() {
            let resolved = edge.injector
                .resolve_in_async(state, &edge.token, edge.argument, edge.options, &edge.chain)
                .await?;
            if let Some(instance) = resolved.into_instance() {
                edge.slot.patch(instance);
            }
        }
        seal(state);

        for resolution in state.take_resolutions().into_iter().rev() {
            let context = hook_context(state, &resolution);
            if let Some(hook) = resolution.instance.hook() {
                let result = match hook {
                    ValueHook::Sync(hook) => hook(resolution.instance.value(), &context),
                    ValueHook::Async(hook) => hook(resolution.instance.value().clone(), context.clone()).await
                };
                result.map_err(|err| hook_failed(&resolution, err))?;
            }
            for hook in hooks(&resolution) {
                let result = match &hook.0 {
                    HookFn::Sync(hook) => hook(&resolution.instance, &context),
                    HookFn::Async(hook) => hook(resolution.instance.clone(), context.clone()).await
                };
                result.map_err(|err| hook_failed(&resolution, err))?;
            }
        }
        Ok(())
    }
}

#[inline]
fn seal(state: &ResolveState) {
    for slot in state.take_forward_refs() {
        slot.seal();
    }
}

#[inline]
fn hook_context(state: &ResolveState, resolution: &Resolution) -> AfterResolveContext {
    AfterResolveContext::new(
        resolution.injector.clone(),
        resolution.argument.clone(),
        state.data().clone(),
        resolution.chain.clone())
}

/// The provider hook first, then the registration hook
#[inline]
fn hooks(resolution: &Resolution) -> impl Iterator<Item = &AfterResolveHook> {
    let registration = &resolution.registration;
    registration.provider()
        .hook()
        .into_iter()
        .chain(registration.options().after_resolve.as_ref())
}

#[inline]
fn async_hook(resolution: &Resolution) -> Error {
    Error::sync_requires_async(
        &format!("after-resolve hook of {}", resolution.registration.token()),
        &resolution.chain)
}

#[inline]
fn hook_failed(resolution: &Resolution, err: BoxError) -> Error {
    Error::after_resolve(resolution.registration.token(), &resolution.chain, err)
}
