//! Resolution limits of an injector tree

const DEFAULT_MAX_CHAIN_LENGTH: usize = 100;
const DEFAULT_MAX_RESOLUTIONS: usize = 7500;

/// Represents the configuration of an [`Injector`](crate::Injector).
///
/// Forked injectors inherit the configuration of their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectorConfig {
    /// The maximum number of nodes in a resolve chain
    ///
    /// Default: `100`
    max_chain_length: usize,

    /// The maximum number of registrations resolved within a single top-level resolve call
    ///
    /// Default: `7500`
    max_resolutions: usize,
}

impl Default for InjectorConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            max_resolutions: DEFAULT_MAX_RESOLUTIONS
        }
    }
}

impl InjectorConfig {
    /// Creates a default injector configuration
    ///
    /// Defaults:
    /// - max_chain_length: `100`
    /// - max_resolutions: `7500`
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the maximum length of a resolve chain.
    /// A resolve call that goes deeper fails with an overflow error.
    ///
    /// Default: `100`
    pub fn with_max_chain_length(mut self, max: usize) -> Self {
        self.max_chain_length = max;
        self
    }

    /// Configures the maximum number of registrations resolved by one top-level resolve call.
    /// A resolve call that resolves more fails with an overflow error.
    ///
    /// Default: `7500`
    pub fn with_max_resolutions(mut self, max: usize) -> Self {
        self.max_resolutions = max;
        self
    }

    /// Returns the maximum length of a resolve chain
    #[inline]
    pub fn max_chain_length(&self) -> usize {
        self.max_chain_length
    }

    /// Returns the maximum number of registrations resolved by one top-level resolve call
    #[inline]
    pub fn max_resolutions(&self) -> usize {
        self.max_resolutions
    }
}
