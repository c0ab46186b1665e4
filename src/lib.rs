//! # Arbor DI
//!
//! > Hierarchical dependency injection with scoped lifecycles, forward references and async disposal.
//!
//! ## Features
//! * A tree of injectors, lookups fall back to the ancestors and finally to global registrations
//! * Transient, singleton, resolution-scoped and injector-scoped lifecycles
//! * Value, class, alias, factory and async factory providers
//! * Circular dependencies through forward references
//! * After-resolve hooks that run once the whole object graph is built
//! * Async disposal of injector trees with cooperative cancellation
//!
//! ## Example
//! ```toml
//! [dependencies]
//! arbor-di = "0.1.0"
//! ```
//! ```
//! use arbor_di::*;
//! use std::sync::Arc;
//!
//! struct Config { url: String }
//! struct Repository { config: Arc<Config> }
//!
//! injectable! { Repository { config: Config } };
//!
//! let root = Injector::new("root");
//! root.register_singleton(Token::of::<Config>(), Provider::value(Config { url: "db://".into() }), RegistrationOptions::new()).unwrap();
//! root.register(Token::of::<Repository>(), Provider::class::<Repository>(), RegistrationOptions::new()).unwrap();
//!
//! let scope = root.fork("request");
//! let repository = scope.resolve::<Repository>().unwrap();
//! assert_eq!(repository.config.url, "db://");
//! ```

#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

pub use self::{
    chain::{ChainNode, ResolveChain},
    config::InjectorConfig,
    context::{AfterResolveContext, DataBag, ResolveContext},
    error::{BoxError, DisposeErrors, Error, ErrorKind},
    forward_ref::ForwardRef,
    injector::{Injector, LookupOptions, ResolveOptions},
    instance::{AfterResolve, Argument, AsyncAfterResolve, AsyncDispose, Dispose, Instance, argument},
    provider::{
        AfterResolveHook, AsyncFactoryProvider, ClassProvider,
        FactoryProvider, Provider, Providers, TokenProvider
    },
    registration::{Lifecycle, Registration, RegistrationOptions, Registrations},
    token::Token,
    type_info::{ArgumentMapper, Arguments, Parameter, TypeInfo, TypeInfoBuilder}
};

mod chain;
mod config;
mod context;
mod error;
mod forward_ref;
mod injector;
mod instance;
mod provider;
mod registration;
mod token;
mod type_info;
