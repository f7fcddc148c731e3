#![deny(missing_debug_implementations)]

//! # negotiate-auth
//!
//! Client side HTTP `Negotiate` (SPNEGO) and `Kerberos` authentication on top
//! of a GSS-API style security library.
//!
//! A negotiation may need several request/response round trips. This crate
//! keeps the in-flight security contexts, and the tokens of completed
//! negotiations, in a shared [`NegotiationCache`] keyed by connection, host
//! and user, so that:
//!
//! - each challenge advances the right context by exactly one round;
//! - later requests with the same connection, host and user can send the
//!   completed token up front (pre-authentication) without running the
//!   handshake again;
//! - abandoned contexts and stale tokens expire on their own.
//!
//! The security library itself is supplied by the caller through the
//! [`GssApi`] trait, and transport stays with the caller's HTTP client.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use negotiate_auth::{GssApi, NegotiateAuth, NegotiateConfig, RequestTarget};
//! # fn gss() -> Arc<dyn GssApi> { unimplemented!() }
//! # async fn run() -> negotiate_auth::Result<()> {
//! let auth = NegotiateAuth::new(NegotiateConfig::current_user(), gss());
//! auth.start()?;
//!
//! let target = RequestTarget::new("conn-1", "http://intranet.corp.com/".parse().unwrap());
//! if let Some(authorization) = auth.authenticate("Negotiate", &target) {
//!     let _header = authorization.to_header_value()?;
//! }
//!
//! auth.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! Every negotiation step is logged through the [`log`] facade at `trace`
//! and `debug` level. Token contents are never logged.

pub use self::auth::challenge;
pub use self::auth::gss;
pub use self::auth::{
    exchange_http_token, execute_with_negotiate, http_token, Authorization, CacheConfig,
    ContextFlags, CredentialPolicy, CredentialProvider, Credentials, Evicted, GssApi,
    IdentityProvider, Mechanism, NegotiateAuth, NegotiateConfig, NegotiationCache,
    NegotiationKey, Negotiator, Oid, RequestTarget, SecurityContext, SystemIdentity,
    DEFAULT_CONTEXT_TTL, DEFAULT_SWEEP_INTERVAL, DEFAULT_TOKEN_TTL, GSS_KRB5_MECH,
    GSS_NT_HOSTBASED_SERVICE, GSS_SPNEGO_MECH, MAX_ROUNDTRIPS,
};
pub use self::error::{Error, Result};

mod auth;
mod error;
