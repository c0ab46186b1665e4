//! Tokens that identify requestable dependencies

use std::{
    any::{TypeId, type_name},
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering}
    }
};

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// An opaque identifier of a dependency.
///
/// There are three flavours of tokens:
/// - **type** tokens created with [`Token::of`], two of them are equal when they refer to the same type;
/// - **named** tokens created with [`Token::named`] (or from a string), compared by value;
/// - **symbol** tokens created with [`Token::symbol`], unique per call, the description is for display only.
///
/// # Example
/// ```
/// use arbor_di::Token;
///
/// struct Logger;
///
/// assert_eq!(Token::of::<Logger>(), Token::of::<Logger>());
/// assert_eq!(Token::named("config"), Token::from("config"));
/// assert_ne!(Token::symbol("config"), Token::symbol("config"));
/// ```
#[derive(Clone)]
pub struct Token(Repr);

#[derive(Clone)]
enum Repr {
    Type { id: TypeId, name: &'static str },
    Named(Arc<str>),
    Symbol { id: u64, description: Arc<str> },
}

impl Token {
    /// Creates a token that identifies the type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Repr::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>()
        })
    }

    /// Creates a token that is equal to every other token with the same name
    #[inline]
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self(Repr::Named(name.into()))
    }

    /// Creates a unique token; the `description` is used only for diagnostics
    pub fn symbol(description: impl Into<Arc<str>>) -> Self {
        let id = NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed);
        Self(Repr::Symbol { id, description: description.into() })
    }

    /// Returns `true` if the token was created with [`Token::of`] for `T`
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        matches!(self.0, Repr::Type { id, .. } if id == TypeId::of::<T>())
    }

    /// Returns a human-readable name of the token
    pub fn name(&self) -> &str {
        match &self.0 {
            Repr::Type { name, .. } => *name,
            Repr::Named(name) => name.as_ref(),
            Repr::Symbol { description, .. } => description.as_ref(),
        }
    }
}

impl PartialEq for Token {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Type { id: a, .. }, Repr::Type { id: b, .. }) => a == b,
            (Repr::Named(a), Repr::Named(b)) => a == b,
            (Repr::Symbol { id: a, .. }, Repr::Symbol { id: b, .. }) => a == b,
            _ => false
        }
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Repr::Type { id, .. } => {
                state.write_u8(0);
                id.hash(state);
            },
            Repr::Named(name) => {
                state.write_u8(1);
                name.hash(state);
            },
            Repr::Symbol { id, .. } => {
                state.write_u8(2);
                id.hash(state);
            }
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Type { name, .. } => f.write_str(name),
            Repr::Named(name) => write!(f, "\"{name}\""),
            Repr::Symbol { description, .. } => write!(f, "Symbol({description})"),
        }
    }
}

impl fmt::Debug for Token {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({self})")
    }
}

impl From<&'static str> for Token {
    #[inline]
    fn from(name: &'static str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Token {
    #[inline]
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<&Token> for Token {
    #[inline]
    fn from(token: &Token) -> Self {
        token.clone()
    }
}
