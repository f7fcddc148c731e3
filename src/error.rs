use std::error::Error as StdError;
use std::fmt;

use crate::auth::gss::Status;

/// A `Result` alias where the `Err` case is `negotiate_auth::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The Errors that may occur while negotiating a security context.
///
/// Most callers never see one: the orchestrator turns every failure into a
/// "no credential" outcome. They surface from the lower level pieces
/// ([`SecurityContext`](crate::SecurityContext), the cache and the
/// registry) when those are driven directly.
pub struct Error {
    inner: Box<Inner>,
}

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    /// Returns true if the error is a configuration problem, such as an
    /// empty service name.
    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, Kind::Config)
    }

    /// Returns true if the target name could not be imported.
    pub fn is_init(&self) -> bool {
        matches!(self.inner.kind, Kind::Init)
    }

    /// Returns true if an exchange round failed.
    ///
    /// The context that produced it is unusable and must be discarded.
    pub fn is_exchange(&self) -> bool {
        matches!(self.inner.kind, Kind::Exchange)
    }

    /// Returns true if a token could not be turned into a header value.
    pub fn is_header(&self) -> bool {
        matches!(self.inner.kind, Kind::Header)
    }

    /// Returns the status codes reported by the security primitive, if the
    /// error originated there.
    pub fn gss_status(&self) -> Option<Status> {
        let mut source = self.source();

        while let Some(err) = source {
            if let Some(failure) = err.downcast_ref::<GssFailure>() {
                return Some(failure.status);
            }

            source = err.source();
        }

        None
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("negotiate_auth::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Config => f.write_str("configuration error")?,
            Kind::Init => f.write_str("security context initialization error")?,
            Kind::Exchange => f.write_str("security context exchange error")?,
            Kind::Header => f.write_str("invalid authorization header")?,
        }

        if let Some(e) = &self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Config,
    Init,
    Exchange,
    Header,
}

// constructors

pub(crate) fn config<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Config, Some(e))
}

pub(crate) fn init<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Init, Some(e))
}

pub(crate) fn exchange<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Exchange, Some(e))
}

pub(crate) fn header<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Header, Some(e))
}

/// A failure status returned by the security primitive.
#[derive(Debug)]
pub(crate) struct GssFailure {
    message: String,
    status: Status,
}

impl GssFailure {
    pub(crate) fn new(message: impl Into<String>, status: Status) -> GssFailure {
        GssFailure {
            message: message.into(),
            status,
        }
    }
}

impl fmt::Display for GssFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (major: 0x{:08X}, minor: 0x{:08X})",
            self.message, self.status.major, self.status.minor
        )
    }
}

impl StdError for GssFailure {}
