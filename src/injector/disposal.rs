//! Disposal stack and the async disposal of an injector tree

use super::Injector;
use crate::{
    Instance,
    error::{BoxError, Error},
    instance::Disposer
};
use futures_util::future::BoxFuture;
use std::{
    collections::HashSet,
    sync::atomic::Ordering
};

type SyncHandler = Box<
    dyn FnOnce() -> Result<(), BoxError>
    + Send
>;

type AsyncHandler = Box<
    dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>>
    + Send
>;

/// A callback registered through a resolve context
pub(crate) enum DisposeHandler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

pub(super) enum DisposeEntry {
    Instance(Instance),
    Injector(Injector),
    Handler(DisposeHandler),
}

/// LIFO stack of cleanup actions; a value is pushed at most once
#[derive(Default)]
pub(super) struct DisposalStack {
    entries: Vec<DisposeEntry>,
    seen: HashSet<usize>,
}

impl DisposalStack {
    fn push_instance(&mut self, instance: &Instance) {
        if self.seen.insert(instance.id()) {
            self.entries.push(DisposeEntry::Instance(instance.clone()));
        }
    }

    #[inline]
    fn pop(&mut self) -> Option<DisposeEntry> {
        self.entries.pop()
    }

    #[inline]
    fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }
}

impl Injector {
    #[inline]
    fn disposal(&self) -> std::sync::MutexGuard<'_, DisposalStack> {
        self.inner.disposal
            .lock()
            .expect("disposal stack lock poisoned")
    }

    pub(crate) fn push_disposable(&self, instance: &Instance) {
        self.disposal().push_instance(instance);
    }

    pub(crate) fn push_dispose_handler(&self, handler: DisposeHandler) {
        self.disposal().entries.push(DisposeEntry::Handler(handler));
    }

    /// Children that were already disposed are pruned before the new one is pushed
    pub(super) fn push_child(&self, child: &Injector) {
        let mut disposal = self.disposal();
        disposal.entries.retain(|entry| match entry {
            DisposeEntry::Injector(existing) => !existing.is_disposed(),
            _ => true
        });
        disposal.entries.push(DisposeEntry::Injector(child.clone()));
    }

    fn remove_child(&self, child: &Injector) {
        self.disposal().entries.retain(|entry| match entry {
            DisposeEntry::Injector(existing) => !Injector::ptr_eq(existing, child),
            _ => true
        });
    }

    #[inline]
    fn pop_disposal(&self) -> Option<DisposeEntry> {
        self.disposal().pop()
    }

    /// Disposes the injector.
    ///
    /// Flips the cancellation signal, then unwinds the disposal stack in reverse order:
    /// forked children, disposable values and dispose handlers. Finally drops every
    /// registration and cached value. Further resolve calls fail.
    ///
    /// Every entry is disposed even if some fail; the failures are returned together.
    /// Disposing an injector again does nothing.
    ///
    /// A forked child stays in its parent's disposal stack until it is disposed, even if
    /// every handle to it was dropped. A child that is disposed on its own leaves that stack.
    ///
    /// # Example
    /// ```
    /// use arbor_di::{Injector, Token};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let root = Injector::new("root");
    /// let child = root.fork("child");
    ///
    /// root.dispose().await.unwrap();
    ///
    /// assert!(child.is_disposed());
    /// assert!(child.cancellation_token().is_cancelled());
    /// assert!(child.resolve_with(Token::named("any"), None, Default::default()).is_err());
    /// # }
    /// ```
    pub async fn dispose(&self) -> Result<(), Error> {
        self.clone().dispose_boxed().await
    }

    fn dispose_boxed(self) -> BoxFuture<'static, Result<(), Error>> {
        Box::pin(async move {
            if self.inner.disposed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            self.inner.cancellation.cancel();

            #[cfg(feature = "tracing")]
            tracing::trace!("disposing injector {}", self.name());

            let mut errors = Vec::new();
            while let Some(entry) = self.pop_disposal() {
                let result = match entry {
                    DisposeEntry::Instance(instance) => match instance.disposer() {
                        Some(Disposer::Sync(dispose)) => dispose(instance.value()),
                        Some(Disposer::Async(dispose)) => dispose(instance.value().clone()).await,
                        None => Ok(())
                    },
                    DisposeEntry::Injector(child) => child
                        .dispose_boxed()
                        .await
                        .map_err(BoxError::from),
                    DisposeEntry::Handler(DisposeHandler::Sync(handler)) => handler(),
                    DisposeEntry::Handler(DisposeHandler::Async(handler)) => handler().await,
                };
                if let Err(err) = result {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("dispose handler of injector {} failed: {err:#}", self.name());
                    errors.push(err);
                }
            }
            self.clear();
            if let Some(parent) = self.parent() {
                parent.remove_child(&self);
            }

            if errors.is_empty() {
                Ok(())
            } else {
                Err(Error::dispose_failed(self.name(), errors))
            }
        })
    }

    fn clear(&self) {
        let registrations = std::mem::take(&mut *self.inner.registrations
            .write()
            .expect("registrations lock poisoned"));
        for registration in registrations.values().flat_map(|registrations| registrations.as_slice()) {
            if registration.owner().is_some_and(|owner| Injector::ptr_eq(&owner, self)) {
                registration.clear();
            }
        }
        self.inner.scoped
            .lock()
            .expect("injector cache lock poisoned")
            .clear();
        self.disposal().clear();
    }
}
