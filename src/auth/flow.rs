//! Driving Negotiate authentication across request/response round trips.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use http::{HeaderMap, Request, Response, StatusCode};
use url::Url;

use super::challenge;
use super::{
    Authorization, CredentialPolicy, GssApi, IdentityProvider, Mechanism, NegotiateConfig,
    NegotiationCache, Negotiator, RequestTarget,
};
use crate::Result;

/// Upper bound on authenticated retries of a single request.
pub const MAX_ROUNDTRIPS: usize = 5;

/// The set of enabled Negotiate mechanisms sharing one cache.
///
/// Build one per process (or per client) and keep it for as long as requests
/// are made; [`start`](Self::start) spawns the cache sweep and
/// [`close`](Self::close) stops it and releases every cached context.
pub struct NegotiateAuth {
    config: NegotiateConfig,
    cache: NegotiationCache,
    negotiators: Vec<Negotiator>,
}

impl NegotiateAuth {
    pub fn new(config: NegotiateConfig, gss: Arc<dyn GssApi>) -> NegotiateAuth {
        let cache = NegotiationCache::new(config.cache.clone());
        let negotiators = config
            .mechanisms()
            .map(|mechanism| {
                Negotiator::new(mechanism, gss.clone(), cache.clone()).flags(config.flags)
            })
            .collect();

        NegotiateAuth {
            config,
            cache,
            negotiators,
        }
    }

    /// Replaces the source of the current user name for every mechanism.
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> NegotiateAuth {
        self.negotiators = self
            .negotiators
            .into_iter()
            .map(|n| n.identity(identity.clone()))
            .collect();
        self
    }

    /// Installs a credential policy for every mechanism.
    pub fn policy(mut self, policy: Arc<dyn CredentialPolicy>) -> NegotiateAuth {
        self.negotiators = self
            .negotiators
            .into_iter()
            .map(|n| n.policy(policy.clone()))
            .collect();
        self
    }

    /// Starts the background cache sweep on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.cache.start()
    }

    /// Stops the cache sweep and evicts every entry.
    pub fn close(&self) {
        self.cache.close()
    }

    pub fn config(&self) -> &NegotiateConfig {
        &self.config
    }

    pub fn cache(&self) -> &NegotiationCache {
        &self.cache
    }

    pub fn negotiator(&self, mechanism: Mechanism) -> Option<&Negotiator> {
        self.negotiators.iter().find(|n| n.mechanism() == mechanism)
    }

    /// Answers a single challenge with the mechanism named by its scheme.
    pub fn authenticate(&self, challenge: &str, target: &RequestTarget) -> Option<Authorization> {
        let mechanism = challenge::mechanism_of(challenge)?;
        self.negotiator(mechanism)?
            .authenticate(challenge, target, Some(&self.config.credentials))
    }

    /// Answers the first enabled challenge found in a `401` response.
    pub fn respond(&self, headers: &HeaderMap, target: &RequestTarget) -> Option<Authorization> {
        self.negotiators.iter().find_map(|negotiator| {
            let challenge = challenge::find_challenge(headers, negotiator.mechanism())?;
            negotiator.authenticate(&challenge, target, Some(&self.config.credentials))
        })
    }

    /// Returns a cached token for `target`, trying mechanisms in order.
    pub fn pre_authenticate(&self, target: &RequestTarget) -> Option<Authorization> {
        self.negotiators
            .iter()
            .find_map(|n| n.pre_authenticate(target, Some(&self.config.credentials)))
    }
}

impl fmt::Debug for NegotiateAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiateAuth")
            .field("config", &self.config)
            .field("negotiators", &self.negotiators)
            .finish()
    }
}

/// Execute a request with HTTP Negotiate authentication.
///
/// 1. Attach a cached token, if a previous negotiation with the same
///    connection, host and user completed.
/// 2. Send the request.
/// 3. While the server answers `401` with an enabled challenge, attach the
///    next token and send again, at most [`MAX_ROUNDTRIPS`] times.
///
/// `send` performs the actual transport; the request is rebuilt from
/// `request` for every attempt, so its body must be clonable. The last
/// response is returned as is; when negotiation cannot proceed the `401` is
/// handed back to the caller.
pub async fn execute_with_negotiate<B, RB, E, F, Fut>(
    auth: &NegotiateAuth,
    connection: &str,
    request: &Request<B>,
    mut send: F,
) -> std::result::Result<Response<RB>, E>
where
    B: Clone,
    F: FnMut(Request<B>) -> Fut,
    Fut: Future<Output = std::result::Result<Response<RB>, E>>,
{
    let target = match Url::parse(&request.uri().to_string()) {
        Ok(uri) => Some(RequestTarget::new(connection, uri)),
        Err(e) => {
            log::debug!("Negotiate skipped, request uri is not absolute: {e}");
            None
        }
    };

    let Some(target) = target else {
        return send(replay(request, None)).await;
    };

    let mut response = send(replay(request, auth.pre_authenticate(&target).as_ref())).await?;

    for round in 0..MAX_ROUNDTRIPS {
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(authorization) = auth.respond(response.headers(), &target) else {
            log::debug!("Server returned 401 without a challenge we can answer");
            return Ok(response);
        };

        log::trace!(
            "Negotiate round {} to {} finished:{}",
            round + 1,
            target.uri(),
            authorization.is_finished()
        );

        let finished = authorization.is_finished();
        response = send(replay(request, Some(&authorization))).await?;

        if finished {
            break;
        }
    }

    Ok(response)
}

fn replay<B: Clone>(request: &Request<B>, authorization: Option<&Authorization>) -> Request<B> {
    let mut req = Request::new(request.body().clone());
    *req.method_mut() = request.method().clone();
    *req.uri_mut() = request.uri().clone();
    *req.version_mut() = request.version();
    *req.headers_mut() = request.headers().clone();

    if let Some(authorization) = authorization {
        match authorization.to_header_value() {
            Ok(value) => {
                req.headers_mut().insert(http::header::AUTHORIZATION, value);
            }
            Err(e) => log::debug!("Negotiate token dropped: {e}"),
        }
    }

    req
}
