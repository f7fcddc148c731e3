//! Who is authenticating, and whether they may.

use std::fmt;

use url::Url;

use super::Mechanism;

/// Credentials for Negotiate authentication.
///
/// Acquiring the actual ticket or key material is left to the security
/// library; only the user name takes part in cache partitioning.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// Use the identity of the current process.
    #[default]
    CurrentUser,

    /// Use explicit credentials.
    Explicit { username: String, password: String },
}

impl Credentials {
    pub fn explicit(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Explicit {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::CurrentUser => None,
            Credentials::Explicit { username, .. } => Some(username),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::CurrentUser => f.write_str("CurrentUser"),
            Credentials::Explicit { username, .. } => f
                .debug_struct("Explicit")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Looks up the credentials supplied for a request target and mechanism.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self, uri: &Url, mechanism: Mechanism) -> Option<Credentials>;
}

impl CredentialProvider for Credentials {
    fn credential(&self, _uri: &Url, _mechanism: Mechanism) -> Option<Credentials> {
        Some(self.clone())
    }
}

impl<F> CredentialProvider for F
where
    F: Fn(&Url, Mechanism) -> Option<Credentials> + Send + Sync,
{
    fn credential(&self, uri: &Url, mechanism: Mechanism) -> Option<Credentials> {
        self(uri, mechanism)
    }
}

/// Supplies the name of the current execution principal.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> String;
}

impl<F> IdentityProvider for F
where
    F: Fn() -> String + Send + Sync,
{
    fn current_user(&self) -> String {
        self()
    }
}

/// The operating system user running this process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemIdentity;

impl IdentityProvider for SystemIdentity {
    fn current_user(&self) -> String {
        whoami::username()
    }
}

/// Decides whether credentials may be sent to a target.
///
/// Declining is a valid outcome, not an error: the request proceeds without
/// an authorization header.
pub trait CredentialPolicy: Send + Sync {
    fn should_send_credential(
        &self,
        uri: &Url,
        credentials: Option<&Credentials>,
        mechanism: Mechanism,
    ) -> bool;
}

impl<F> CredentialPolicy for F
where
    F: Fn(&Url, Option<&Credentials>, Mechanism) -> bool + Send + Sync,
{
    fn should_send_credential(
        &self,
        uri: &Url,
        credentials: Option<&Credentials>,
        mechanism: Mechanism,
    ) -> bool {
        self(uri, credentials, mechanism)
    }
}
