//! Interface to the security library that produces and verifies tokens.
//!
//! Implementations wrap a native GSS-API (or SSPI) binding. Handles are
//! opaque to this crate and owned: every handle handed out by a provider is
//! given back to it exactly once through the matching release call.

use std::fmt;
use std::num::NonZeroU64;

use super::{ContextFlags, Oid};

/// `GSS_S_COMPLETE`
pub const GSS_S_COMPLETE: u32 = 0;
/// `GSS_S_CONTINUE_NEEDED`
pub const GSS_S_CONTINUE_NEEDED: u32 = 1;

const GSS_ERROR_MASK: u32 = 0xFFFF_0000;

/// Major and minor status codes reported by a primitive call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Status {
    pub major: u32,
    pub minor: u32,
}

impl Status {
    pub const COMPLETE: Status = Status::new(GSS_S_COMPLETE, 0);
    pub const CONTINUE_NEEDED: Status = Status::new(GSS_S_CONTINUE_NEEDED, 0);

    pub const fn new(major: u32, minor: u32) -> Status {
        Status { major, minor }
    }

    /// Calling or routine errors occupy the upper 16 bits of the major code.
    pub const fn is_error(self) -> bool {
        self.major & GSS_ERROR_MASK != 0
    }

    pub const fn is_complete(self) -> bool {
        self.major == GSS_S_COMPLETE
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "major: 0x{:08X} minor: 0x{:08X}", self.major, self.minor)
    }
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Wraps a provider specific handle value.
            pub const fn from_raw(raw: NonZeroU64) -> Self {
                Self(raw)
            }

            pub const fn as_raw(&self) -> NonZeroU64 {
                self.0
            }
        }
    };
}

handle! {
    /// An imported target name (`gss_name_t`).
    NameHandle
}

handle! {
    /// A security context (`gss_ctx_id_t`).
    ContextHandle
}

handle! {
    /// An output buffer allocated by the provider.
    BufferHandle
}

/// Result of one `init_sec_context` call.
#[derive(Debug)]
pub struct Exchange {
    pub status: Status,
    /// Output token, if the provider allocated one. It is released even when
    /// `status` reports an error.
    pub output: Option<BufferHandle>,
}

/// The security primitive.
///
/// Calls are synchronous and of bounded latency.
pub trait GssApi: Send + Sync {
    /// Imports a service name such as `HTTP@host`.
    fn import_name(&self, name: &str, name_type: &Oid) -> Result<NameHandle, Status>;

    /// Runs one initiator round. `context` is `None` on the first call and
    /// may be allocated or replaced by the provider, even on failure.
    fn init_sec_context(
        &self,
        context: &mut Option<ContextHandle>,
        target: &NameHandle,
        mech: &Oid,
        flags: ContextFlags,
        input: &[u8],
    ) -> Exchange;

    /// Copies the contents of an output buffer.
    fn read_buffer(&self, buffer: &BufferHandle) -> Vec<u8>;

    fn release_buffer(&self, buffer: BufferHandle) -> Status;

    fn delete_sec_context(&self, context: ContextHandle) -> Status;

    fn release_name(&self, name: NameHandle) -> Status;
}

/// An output buffer released on drop.
pub(crate) struct ScopedBuffer<'a> {
    gss: &'a dyn GssApi,
    buffer: Option<BufferHandle>,
}

impl<'a> ScopedBuffer<'a> {
    pub(crate) fn new(gss: &'a dyn GssApi, buffer: Option<BufferHandle>) -> ScopedBuffer<'a> {
        ScopedBuffer { gss, buffer }
    }

    /// Returns the buffer contents, or `None` when nothing was produced.
    pub(crate) fn contents(&self) -> Option<Vec<u8>> {
        self.buffer
            .as_ref()
            .map(|buffer| self.gss.read_buffer(buffer))
            .filter(|bytes| !bytes.is_empty())
    }
}

impl Drop for ScopedBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            let status = self.gss.release_buffer(buffer);
            if status.is_error() {
                log::warn!("gss_release_buffer failed: {status}");
            }
        }
    }
}
