// src/auth/mod.rs

//! HTTP Negotiate (SPNEGO/Kerberos) authentication.
//!
//! A [`Negotiator`] answers each authentication challenge for one mechanism.
//! Its state lives in a shared [`NegotiationCache`]: security contexts that
//! are halfway through a handshake, and completed tokens that later requests
//! to the same host, user and connection can send up front.

mod cache;
pub mod challenge;
mod context;
mod credentials;
mod flags;
mod flow;
pub mod gss;
mod mechanism;
mod negotiate;

use std::time::Duration;

pub use self::cache::{Evicted, NegotiationCache, NegotiationKey};
pub use self::context::{exchange_http_token, http_token, SecurityContext};
pub use self::credentials::{
    CredentialPolicy, CredentialProvider, Credentials, IdentityProvider, SystemIdentity,
};
pub use self::flags::ContextFlags;
pub use self::flow::{execute_with_negotiate, NegotiateAuth, MAX_ROUNDTRIPS};
pub use self::gss::GssApi;
pub use self::mechanism::{
    Mechanism, Oid, GSS_KRB5_MECH, GSS_NT_HOSTBASED_SERVICE, GSS_SPNEGO_MECH,
};
pub use self::negotiate::{Authorization, Negotiator, RequestTarget};

/// Default idle lifetime of a completed token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60);
/// Default idle lifetime of an unfinished security context.
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(10);
/// Default period of the background sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Lifetimes used by the [`NegotiationCache`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub(crate) token_ttl: Duration,
    pub(crate) context_ttl: Duration,
    pub(crate) sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            token_ttl: DEFAULT_TOKEN_TTL,
            context_ttl: DEFAULT_CONTEXT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// How long a completed token may sit unused.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// How long an unfinished context may sit unused. Abandoned contexts
    /// hold native resources, so this is shorter than the token TTL.
    pub fn with_context_ttl(mut self, ttl: Duration) -> Self {
        self.context_ttl = ttl;
        self
    }

    /// Period of the background sweep. Must be non-zero.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Idle lifetime of a completed token.
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Idle lifetime of an unfinished context.
    pub fn context_ttl(&self) -> Duration {
        self.context_ttl
    }

    /// Period of the background sweep.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

/// Configuration for Negotiate authentication.
#[derive(Clone, Debug)]
pub struct NegotiateConfig {
    pub(crate) credentials: Credentials,
    pub(crate) spnego: bool,
    pub(crate) kerberos: bool,
    pub(crate) flags: ContextFlags,
    pub(crate) cache: CacheConfig,
}

impl Default for NegotiateConfig {
    fn default() -> Self {
        Self::current_user()
    }
}

impl NegotiateConfig {
    pub fn current_user() -> Self {
        Self {
            credentials: Credentials::CurrentUser,
            spnego: true,
            kerberos: false,
            flags: ContextFlags::empty(),
            cache: CacheConfig::default(),
        }
    }

    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::explicit(username, password),
            ..Self::current_user()
        }
    }

    /// Enables or disables the `Negotiate` scheme. Enabled by default.
    pub fn spnego(mut self, enabled: bool) -> Self {
        self.spnego = enabled;
        self
    }

    /// Enables or disables the `Kerberos` scheme. Disabled by default.
    pub fn kerberos(mut self, enabled: bool) -> Self {
        self.kerberos = enabled;
        self
    }

    pub fn flags(mut self, flags: ContextFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_enabled(&self, mechanism: Mechanism) -> bool {
        match mechanism {
            Mechanism::SpNego => self.spnego,
            Mechanism::Kerberos => self.kerberos,
        }
    }

    /// Enabled mechanisms, SPNEGO first.
    pub fn mechanisms(&self) -> impl Iterator<Item = Mechanism> + '_ {
        Mechanism::ALL.into_iter().filter(|m| self.is_enabled(*m))
    }
}
