//! A single security context negotiation.

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use parking_lot::Mutex;

use super::challenge;
use super::gss::{ContextHandle, GssApi, NameHandle, ScopedBuffer};
use super::{ContextFlags, Mechanism, GSS_NT_HOSTBASED_SERVICE};
use crate::error::{self, GssFailure};
use crate::Result;

/// Drives one negotiation, one round per call, and owns the native handles
/// it allocates.
///
/// The handles are released by [`dispose`](SecurityContext::dispose), which
/// is idempotent, or at the latest when the value is dropped. Once
/// [`is_complete`](SecurityContext::is_complete) returns `true` it stays
/// `true`.
pub struct SecurityContext {
    service: String,
    mechanism: Mechanism,
    flags: ContextFlags,
    gss: Arc<dyn GssApi>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    context: Option<ContextHandle>,
    target: Option<NameHandle>,
    token: Option<String>,
    completed: bool,
    disposed: bool,
}

impl SecurityContext {
    /// Imports `service` as a host-based service name and prepares a new
    /// context for it.
    ///
    /// # Errors
    ///
    /// A configuration error when `service` is empty or whitespace, an
    /// initialization error when the name cannot be imported.
    pub fn new(
        gss: Arc<dyn GssApi>,
        service: &str,
        flags: ContextFlags,
        mechanism: Mechanism,
    ) -> Result<SecurityContext> {
        if service.trim().is_empty() {
            return Err(error::config("service name cannot be empty or whitespace"));
        }

        log::trace!(
            "SecurityContext::new service:{} flags:{:?} mechanism:{}",
            service,
            flags,
            mechanism
        );

        let target = gss
            .import_name(service, &GSS_NT_HOSTBASED_SERVICE)
            .map_err(|status| {
                error::init(GssFailure::new(
                    format!("gss_import_name failed for {service}"),
                    status,
                ))
            })?;

        log::trace!("SecurityContext::new gss_import_name service:{service} name:{target:?}");

        Ok(SecurityContext {
            service: service.to_owned(),
            mechanism,
            flags,
            gss,
            state: Mutex::new(State {
                target: Some(target),
                ..State::default()
            }),
        })
    }

    /// Prepares a context for the `HTTP@<host>` service with no request
    /// flags.
    pub fn for_http(gss: Arc<dyn GssApi>, host: &str, mechanism: Mechanism) -> Result<SecurityContext> {
        if host.trim().is_empty() {
            return Err(error::config("host cannot be empty or whitespace"));
        }
        SecurityContext::new(gss, &format!("HTTP@{host}"), ContextFlags::empty(), mechanism)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    /// The last token produced, base64 encoded.
    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().completed
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Runs one exchange round.
    ///
    /// `challenge` holds the decoded bytes of the peer's last token and is
    /// empty on the first round. Returns the context's last token: the output
    /// of this round, or the previous one if this round produced none.
    ///
    /// # Errors
    ///
    /// An exchange error when the primitive reports a failure status, or when
    /// the context was already disposed or completed. A context that failed
    /// must not be used again.
    pub fn next_round(&self, challenge: &[u8]) -> Result<Option<String>> {
        let mut state = self.state.lock();

        if state.disposed {
            return Err(error::exchange("security context has been disposed"));
        }
        if state.completed {
            return Err(error::exchange("security context is already complete"));
        }

        log::trace!(
            "SecurityContext::next_round service:{} challenge:{} bytes",
            self.service,
            challenge.len()
        );

        let State { context, target, .. } = &mut *state;
        let target = target
            .as_ref()
            .ok_or_else(|| error::exchange("security context has no target name"))?;

        let exchange = self.gss.init_sec_context(
            context,
            target,
            &self.mechanism.oid(),
            self.flags,
            challenge,
        );
        let output = ScopedBuffer::new(&*self.gss, exchange.output);

        if exchange.status.is_error() {
            return Err(error::exchange(GssFailure::new(
                format!("gss_init_sec_context failed for {}", self.service),
                exchange.status,
            )));
        }

        if let Some(bytes) = output.contents() {
            state.token = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
        }

        if exchange.status.is_complete() {
            state.completed = true;
        }

        log::trace!(
            "SecurityContext::next_round service:{} status:{} token:{} completed:{}",
            self.service,
            exchange.status,
            state.token.as_ref().map_or(0, String::len),
            state.completed
        );

        Ok(state.token.clone())
    }

    /// Releases the native context and target name, if still held.
    pub fn dispose(&self) {
        self.state.lock().release(&*self.gss, &self.service);
    }
}

impl State {
    fn release(&mut self, gss: &dyn GssApi, service: &str) {
        self.disposed = true;

        if let Some(context) = self.context.take() {
            let status = gss.delete_sec_context(context);
            if status.is_error() {
                log::debug!("gss_delete_sec_context failed for {service}: {status}");
            }
        }

        if let Some(name) = self.target.take() {
            let status = gss.release_name(name);
            if status.is_error() {
                log::debug!("gss_release_name failed for {service}: {status}");
            }
        }
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        self.state.get_mut().release(&*self.gss, &self.service);
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SecurityContext")
            .field("service", &self.service)
            .field("mechanism", &self.mechanism)
            .field("flags", &self.flags)
            .field("completed", &state.completed)
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// Issues the first-round token for `host`.
pub fn http_token(gss: Arc<dyn GssApi>, host: &str, mechanism: Mechanism) -> Result<Option<String>> {
    exchange_http_token(gss, "", host, mechanism)
}

/// Runs a single round against `host` with a throwaway context.
///
/// `challenge` is a base64 token, or empty for the first round.
pub fn exchange_http_token(
    gss: Arc<dyn GssApi>,
    challenge: &str,
    host: &str,
    mechanism: Mechanism,
) -> Result<Option<String>> {
    let input = challenge::token_bytes(challenge)?;
    let context = SecurityContext::for_http(gss, host, mechanism)?;
    let token = context.next_round(&input);
    context.dispose();
    token
}
