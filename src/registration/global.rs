//! The process-wide registration table
//!
//! Global registrations are not owned by any injector. A root injector materializes
//! the registrations of a token into itself the first time it looks the token up
//! and finds nothing locally; after that they behave as its own registrations.

use super::{Registration, RegistrationOptions, Registrations};
use crate::{
    Provider, Token,
    error::Error,
    injector::InjectorInner,
    provider::Providers
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, Weak}
};

#[derive(Clone)]
struct GlobalEntry {
    multi: bool,
    providers: Vec<(Provider, RegistrationOptions)>,
}

type GlobalTable = HashMap<Token, GlobalEntry>;

fn table() -> &'static Mutex<GlobalTable> {
    static TABLE: OnceLock<Mutex<GlobalTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Adds providers of `token` to the global table
pub(crate) fn register(token: Token, providers: Providers, options: RegistrationOptions) -> Result<(), Error> {
    let multi = providers.multi || options.multi;
    let prepared = providers.providers
        .into_iter()
        .map(|provider| provider
            .prepare()
            .map(|provider| (provider, options.clone())))
        .collect::<Result<Vec<_>, Error>>()?;

    #[cfg(feature = "tracing")]
    tracing::trace!("global registration of {token} added");

    let mut table = table()
        .lock()
        .expect("global registrations lock poisoned");
    match table.get_mut(&token) {
        None => {
            table.insert(token, GlobalEntry { multi, providers: prepared });
        },
        Some(entry) if entry.multi != multi => return Err(Error::registration_conflict(&token)),
        Some(entry) if multi => entry.providers.extend(prepared),
        Some(entry) => entry.providers = prepared,
    }
    Ok(())
}

/// Builds registrations of `token` owned by `owner`, if the token is registered globally
pub(crate) fn materialize(token: &Token, owner: Weak<InjectorInner>) -> Option<Registrations> {
    let entry = table()
        .lock()
        .expect("global registrations lock poisoned")
        .get(token)
        .cloned()?;

    let mut registrations = entry.providers
        .into_iter()
        .map(|(provider, options)| Arc::new(Registration::prepared(
            token.clone(),
            provider,
            options,
            owner.clone())))
        .collect::<Vec<_>>();

    if entry.multi {
        Some(Registrations::Multi(registrations))
    } else {
        registrations.pop().map(Registrations::Single)
    }
}

/// Returns `true` if `token` is registered globally
pub(crate) fn contains(token: &Token) -> bool {
    table()
        .lock()
        .expect("global registrations lock poisoned")
        .contains_key(token)
}

/// Removes every global registration
pub(crate) fn clear() {
    table()
        .lock()
        .expect("global registrations lock poisoned")
        .clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn it_materializes_fresh_registrations() {
        let token = Token::symbol("global value");
        register(token.clone(), Provider::value(1u32).into(), RegistrationOptions::new()).unwrap();

        assert!(contains(&token));
        let first = materialize(&token, Weak::new()).unwrap();
        let second = materialize(&token, Weak::new()).unwrap();

        assert!(!first.is_multi());
        assert!(!Arc::ptr_eq(first.last().unwrap(), second.last().unwrap()));
    }

    #[test]
    fn it_collects_multi_registrations() {
        let token = Token::symbol("global list");
        register(token.clone(), vec![Provider::value(1u32)].into(), RegistrationOptions::new()).unwrap();
        register(token.clone(), Provider::value(2u32).into(), RegistrationOptions::new().multi()).unwrap();

        let registrations = materialize(&token, Weak::new()).unwrap();
        assert!(registrations.is_multi());
        assert_eq!(registrations.len(), 2);

        let err = register(token, Provider::value(3u32).into(), RegistrationOptions::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RegistrationConflict);
    }

    #[test]
    fn it_ignores_unknown_tokens() {
        assert!(materialize(&Token::symbol("unknown"), Weak::new()).is_none());
    }
}
