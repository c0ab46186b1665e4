//! Diagnostic trail from a resolve request to the point of failure

use crate::Token;
use std::{fmt, sync::Arc};

/// A single step of a [`ResolveChain`]
#[derive(Debug, Clone)]
pub enum ChainNode {
    /// A token that was requested
    Token(Token),

    /// A constructor parameter of an injectable type
    Parameter {
        /// Name of the type whose constructor is being resolved
        type_name: &'static str,
        /// Declaration index of the parameter
        index: usize,
        /// Token of the parameter, if there is one
        token: Option<Token>,
    },

    /// A deferred resolution of a forward reference
    ForwardRef(Token),

    /// A redirect of a token provider to another token
    Alias(Token),
}

impl fmt::Display for ChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainNode::Token(token) => write!(f, "{token}"),
            ChainNode::Parameter { type_name, index, token: Some(token) } => write!(f, "{type_name}[{index}: {token}]"),
            ChainNode::Parameter { type_name, index, token: None } => write!(f, "{type_name}[{index}: ?]"),
            ChainNode::ForwardRef(token) => write!(f, "forward_ref({token})"),
            ChainNode::Alias(token) => write!(f, "alias({token})"),
        }
    }
}

struct Link {
    node: ChainNode,
    prev: Option<Arc<Link>>,
}

/// An immutable, append-only list of [`ChainNode`]s.
///
/// Extending a chain never changes the original one, so it's cheap to keep
/// the chain that was active at every step and attach it to an error.
#[derive(Clone, Default)]
pub struct ResolveChain {
    head: Option<Arc<Link>>,
    len: usize,
}

impl ResolveChain {
    /// Creates an empty chain
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new chain with `node` appended
    #[inline]
    pub fn add(&self, node: ChainNode) -> Self {
        let link = Link { node, prev: self.head.clone() };
        Self {
            head: Some(Arc::new(link)),
            len: self.len + 1
        }
    }

    /// Number of nodes in the chain
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the chain has no nodes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The most recently added node
    #[inline]
    pub fn last(&self) -> Option<&ChainNode> {
        self.head.as_ref().map(|link| &link.node)
    }

    /// Nodes in request order, the first requested token first
    pub fn nodes(&self) -> Vec<&ChainNode> {
        let mut nodes = Vec::with_capacity(self.len);
        let mut current = self.head.as_deref();
        while let Some(link) = current {
            nodes.push(&link.node);
            current = link.prev.as_deref();
        }
        nodes.reverse();
        nodes
    }
}

impl fmt::Display for ResolveChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes().into_iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResolveChain {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.nodes()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChainNode, ResolveChain};
    use crate::Token;

    #[test]
    fn it_appends_without_changing_the_original() {
        let root = ResolveChain::new().add(ChainNode::Token(Token::named("a")));
        let left = root.add(ChainNode::Token(Token::named("b")));
        let right = root.add(ChainNode::Token(Token::named("c")));

        assert_eq!(root.len(), 1);
        assert_eq!(left.len(), 2);
        assert_eq!(right.to_string(), "\"a\" -> \"c\"");
        assert_eq!(left.to_string(), "\"a\" -> \"b\"");
    }

    #[test]
    fn it_displays_parameters() {
        let chain = ResolveChain::new()
            .add(ChainNode::Token(Token::named("service")))
            .add(ChainNode::Parameter { type_name: "Service", index: 1, token: Some(Token::named("db")) })
            .add(ChainNode::Parameter { type_name: "Service", index: 2, token: None });

        assert_eq!(chain.to_string(), "\"service\" -> Service[1: \"db\"] -> Service[2: ?]");
        assert!(matches!(chain.last(), Some(ChainNode::Parameter { index: 2, .. })));
    }

    #[test]
    fn it_is_empty_by_default() {
        let chain = ResolveChain::default();

        assert!(chain.is_empty());
        assert!(chain.last().is_none());
        assert_eq!(chain.to_string(), "");
    }
}
