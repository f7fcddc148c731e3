// src/auth/negotiate.rs

//! Per-request Negotiate decisions.
//!
//! The [`Negotiator`] itself is stateless; everything that survives a call
//! lives in the [`NegotiationCache`]. A call either
//!
//! - pre-authenticates: reads a completed token for the key and never
//!   touches the context cache, or
//! - continues a negotiation: feeds the server's challenge into the cached
//!   (or new) security context and returns the next token.

use std::fmt;
use std::sync::Arc;

use http::HeaderValue;
use url::Url;

use super::challenge;
use super::{
    ContextFlags, CredentialPolicy, CredentialProvider, Credentials, GssApi, IdentityProvider,
    Mechanism, NegotiationCache, NegotiationKey, SecurityContext, SystemIdentity,
};
use crate::error;
use crate::Result;

/// The request being authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTarget {
    connection: String,
    uri: Url,
}

impl RequestTarget {
    /// `connection` is an opaque identity chosen by the caller; requests
    /// sharing it share negotiation state.
    pub fn new(connection: impl Into<String>, uri: Url) -> RequestTarget {
        RequestTarget {
            connection: connection.into(),
            uri,
        }
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn host(&self) -> Option<&str> {
        self.uri.host_str()
    }
}

/// An authorization header value to send with a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    message: String,
    finished: bool,
    mutually_authenticated: bool,
}

impl Authorization {
    pub(crate) fn new(mechanism: Mechanism, token: &str, finished: bool) -> Authorization {
        Authorization {
            message: format!("{} {}", mechanism.scheme(), token),
            finished,
            mutually_authenticated: true,
        }
    }

    /// The full header value, `<scheme> <base64 token>`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `false` while the server is expected to answer with another
    /// challenge.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_mutually_authenticated(&self) -> bool {
        self.mutually_authenticated
    }

    pub fn to_header_value(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&self.message).map_err(error::header)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Answers authentication challenges for one mechanism.
#[derive(Clone)]
pub struct Negotiator {
    mechanism: Mechanism,
    flags: ContextFlags,
    gss: Arc<dyn GssApi>,
    cache: NegotiationCache,
    identity: Arc<dyn IdentityProvider>,
    policy: Option<Arc<dyn CredentialPolicy>>,
}

impl Negotiator {
    /// Creates a negotiator backed by `cache`. The current user defaults to
    /// the operating system user.
    pub fn new(mechanism: Mechanism, gss: Arc<dyn GssApi>, cache: NegotiationCache) -> Negotiator {
        Negotiator {
            mechanism,
            flags: ContextFlags::empty(),
            gss,
            cache,
            identity: Arc::new(SystemIdentity),
            policy: None,
        }
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Negotiator {
        self.identity = identity;
        self
    }

    pub fn policy(mut self, policy: Arc<dyn CredentialPolicy>) -> Negotiator {
        self.policy = Some(policy);
        self
    }

    /// Request flags for new contexts.
    pub fn flags(mut self, flags: ContextFlags) -> Negotiator {
        self.flags = flags;
        self
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn cache(&self) -> &NegotiationCache {
        &self.cache
    }

    /// Responds to `challenge`, which may be empty or the bare scheme name on
    /// the first round.
    ///
    /// Returns `None` when this request should not carry an authorization
    /// header: the policy declined, the negotiation failed, or it produced no
    /// token.
    pub fn authenticate(
        &self,
        challenge: &str,
        target: &RequestTarget,
        credentials: Option<&dyn CredentialProvider>,
    ) -> Option<Authorization> {
        log::trace!(
            "Negotiator::authenticate mechanism:{} connection:{} uri:{}",
            self.mechanism,
            target.connection(),
            target.uri()
        );

        let Some(host) = target.host() else {
            log::debug!("{} authentication skipped, {} has no host", self.mechanism, target.uri());
            return None;
        };

        let credential = credentials.and_then(|c| c.credential(target.uri(), self.mechanism));
        let key = NegotiationKey::new(target.connection(), host, &self.resolve_user(credential.as_ref()));

        if let Some(policy) = &self.policy {
            if !policy.should_send_credential(target.uri(), credential.as_ref(), self.mechanism) {
                log::debug!("{} authentication to {} declined by policy", self.mechanism, host);
                return None;
            }
        }

        match self.continue_negotiation(challenge, host, &key) {
            Ok(authorization) => authorization,
            Err(err) => {
                log::debug!("{} authentication to {} failed: {}", self.mechanism, host, err);
                None
            }
        }
    }

    /// Returns the token of a previously completed negotiation, without
    /// running an exchange.
    ///
    /// Returns `None` if nothing is cached; the caller must then wait for a
    /// challenge.
    pub fn pre_authenticate(
        &self,
        target: &RequestTarget,
        credentials: Option<&dyn CredentialProvider>,
    ) -> Option<Authorization> {
        let host = target.host()?;
        let credential = credentials.and_then(|c| c.credential(target.uri(), self.mechanism));
        let key = NegotiationKey::new(target.connection(), host, &self.resolve_user(credential.as_ref()));

        let token = self.cache.get_token(&key);
        log::trace!(
            "Negotiator::pre_authenticate mechanism:{} host:{} cached:{}",
            self.mechanism,
            host,
            token.is_some()
        );

        self.authorization(token, true)
    }

    fn continue_negotiation(
        &self,
        challenge: &str,
        host: &str,
        key: &NegotiationKey,
    ) -> Result<Option<Authorization>> {
        let incoming = challenge::decode(Some(challenge), self.mechanism.scheme()).unwrap_or_default();

        let mut context = self.context(key, host)?;

        // A bare challenge starts over; a context that already produced a
        // token belongs to an abandoned handshake.
        if incoming.is_empty() && context.token().is_some() {
            log::debug!("{} restarting stale negotiation with {}", self.mechanism, host);
            self.discard(key, &context);
            context = self.context(key, host)?;
        }

        let token = match challenge::token_bytes(&incoming).and_then(|input| context.next_round(&input)) {
            Ok(token) => token,
            Err(err) => {
                self.discard(key, &context);
                return Err(err);
            }
        };

        let finished = context.is_complete();
        if finished {
            log::debug!("{} negotiation with {} completed", self.mechanism, host);
            if let Some(token) = &token {
                self.cache.set_token(key, token.clone());
            }
            self.discard(key, &context);
        }

        Ok(self.authorization(token, finished))
    }

    fn context(&self, key: &NegotiationKey, host: &str) -> Result<Arc<SecurityContext>> {
        self.cache.get_or_create_context(key, self.mechanism, || {
            SecurityContext::new(
                self.gss.clone(),
                &format!("HTTP@{host}"),
                self.flags,
                self.mechanism,
            )
        })
    }

    /// Drops `context` from the cache if it is still the cached entry, and
    /// releases it either way.
    fn discard(&self, key: &NegotiationKey, context: &Arc<SecurityContext>) {
        self.cache.delete_context_if(key, self.mechanism, context);
        context.dispose();
    }

    fn authorization(&self, token: Option<String>, finished: bool) -> Option<Authorization> {
        match token {
            Some(token) if !token.trim().is_empty() => {
                Some(Authorization::new(self.mechanism, &token, finished))
            }
            _ => {
                log::trace!("{} produced no token", self.mechanism);
                None
            }
        }
    }

    /// Explicit credentials win; a missing or blank user name falls back to
    /// the current principal.
    fn resolve_user(&self, credential: Option<&Credentials>) -> String {
        credential
            .and_then(Credentials::username)
            .filter(|name| !name.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| self.identity.current_user())
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("mechanism", &self.mechanism)
            .field("flags", &self.flags)
            .field("cache", &self.cache)
            .field("policy", &self.policy.is_some())
            .finish()
    }
}
