//! Describes dependency resolution errors

use crate::{ResolveChain, Token};
use std::{
    error::Error as StdError,
    fmt
};

/// A boxed error produced by user code: constructors, factories, hooks and dispose handlers
pub type BoxError = Box<
    dyn StdError
    + Send
    + Sync
>;

/// The condition that caused an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The token is not registered anywhere in the injector hierarchy
    NoProvider,
    /// A parameter without a token reached the resolver
    TokenUndefined,
    /// A token was requested again while it was still being resolved
    CircularDependency,
    /// The resolve chain or the number of resolutions in one call exceeded its limit
    Overflow,
    /// A class provider targets a type without injectable metadata
    NotInjectable,
    /// An asynchronous provider, default argument or hook was reached by the synchronous API
    SyncRequiresAsync,
    /// A constructor of an injectable type failed
    Constructor,
    /// A factory provider failed
    Factory,
    /// An after-resolve hook failed
    AfterResolve,
    /// A token was registered as single and multi at the same time
    RegistrationConflict,
    /// A resolved value is not of the requested type
    TypeMismatch,
    /// The injector is disposed
    Disposed,
    /// One or more dispose handlers failed
    DisposeFailed,
}

/// Dependency injection error
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    chain: ResolveChain,
    inner: Option<BoxError>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(inner) = &self.inner {
            write!(f, ": {inner}")?;
        }
        if !self.chain.is_empty() {
            write!(f, "\n    chain: {}", self.chain)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

impl Error {
    /// Creates a new error
    #[inline]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            chain: ResolveChain::new(),
            inner: None
        }
    }

    /// Attaches the resolve chain that was active at the point of failure
    #[inline]
    pub fn with_chain(mut self, chain: &ResolveChain) -> Self {
        self.chain = chain.clone();
        self
    }

    /// Attaches the original error
    #[inline]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.inner = Some(cause.into());
        self
    }

    /// The condition that caused this error
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Error message without the cause and the chain
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The resolve chain that was active at the point of failure
    #[inline]
    pub fn chain(&self) -> &ResolveChain {
        &self.chain
    }

    /// Consumes the error and returns the original error, if any
    #[inline]
    pub fn into_cause(self) -> Option<BoxError> {
        self.inner
    }

    pub(crate) fn no_provider(token: &Token, chain: &ResolveChain) -> Self {
        Self::new(ErrorKind::NoProvider, format!("no provider for {token} registered"))
            .with_chain(chain)
    }

    pub(crate) fn token_undefined(chain: &ResolveChain) -> Self {
        Self::new(ErrorKind::TokenUndefined, "token is undefined, this might be caused by a broken forward reference")
            .with_chain(chain)
    }

    pub(crate) fn circular(token: &Token, chain: &ResolveChain) -> Self {
        Self::new(ErrorKind::CircularDependency, format!("circular dependency to itself detected for {token}, use a forward reference"))
            .with_chain(chain)
    }

    pub(crate) fn overflow(chain: &ResolveChain) -> Self {
        Self::new(ErrorKind::Overflow, "resolve stack overflow, this can happen on circular dependencies with transient lifecycles and self reference, use a forward reference")
            .with_chain(chain)
    }

    pub(crate) fn not_injectable(type_name: &str) -> Self {
        Self::new(ErrorKind::NotInjectable, format!("{type_name} is not injectable, register its type info first"))
    }

    pub(crate) fn sync_requires_async(what: &str, chain: &ResolveChain) -> Self {
        Self::new(ErrorKind::SyncRequiresAsync, format!("{what} requires async resolution, use the async api"))
            .with_chain(chain)
    }

    pub(crate) fn constructor(type_name: &str, chain: &ResolveChain, cause: BoxError) -> Self {
        Self::new(ErrorKind::Constructor, format!("error in constructor of {type_name}"))
            .with_chain(chain)
            .with_cause(cause)
    }

    pub(crate) fn factory(token: &Token, chain: &ResolveChain, cause: BoxError) -> Self {
        Self::new(ErrorKind::Factory, format!("error in factory of {token}"))
            .with_chain(chain)
            .with_cause(cause)
    }

    pub(crate) fn after_resolve(token: &Token, chain: &ResolveChain, cause: BoxError) -> Self {
        Self::new(ErrorKind::AfterResolve, format!("error in after-resolve hook of {token}"))
            .with_chain(chain)
            .with_cause(cause)
    }

    pub(crate) fn registration_conflict(token: &Token) -> Self {
        Self::new(ErrorKind::RegistrationConflict, format!("{token} can not be registered as single and multi at the same time"))
    }

    pub(crate) fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::new(ErrorKind::TypeMismatch, format!("expected {expected}, but the resolved value is {actual}"))
    }

    pub(crate) fn disposed(name: &str) -> Self {
        Self::new(ErrorKind::Disposed, format!("injector {name} is disposed"))
    }

    pub(crate) fn dispose_failed(name: &str, errors: Vec<BoxError>) -> Self {
        Self::new(ErrorKind::DisposeFailed, format!("{} dispose handler(s) of injector {name} failed", errors.len()))
            .with_cause(DisposeErrors(errors))
    }
}

/// Errors collected while unwinding a disposal stack
#[derive(Debug)]
pub struct DisposeErrors(pub Vec<BoxError>);

impl fmt::Display for DisposeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl StdError for DisposeErrors {}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, DisposeErrors};
    use crate::{ChainNode, ResolveChain, Token};
    use std::error::Error as StdError;

    #[test]
    fn it_displays_message_cause_and_chain() {
        let chain = ResolveChain::new()
            .add(ChainNode::Token(Token::named("a")))
            .add(ChainNode::Token(Token::named("b")));
        let err = Error::factory(&Token::named("b"), &chain, "boom".into());

        assert_eq!(err.kind(), ErrorKind::Factory);
        assert_eq!(err.to_string(), "error in factory of \"b\": boom\n    chain: \"a\" -> \"b\"");
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn it_aggregates_dispose_errors() {
        let err = Error::dispose_failed("root", vec!["first".into(), "second".into()]);

        assert_eq!(err.kind(), ErrorKind::DisposeFailed);
        assert!(err.chain().is_empty());

        let cause = err.into_cause().unwrap();
        let errors = cause.downcast_ref::<DisposeErrors>().unwrap();
        assert_eq!(errors.0.len(), 2);
        assert_eq!(errors.to_string(), "first; second");
    }
}
