use bitflags::bitflags;

bitflags! {
    /// Request flags passed to the exchange primitive unchanged.
    ///
    /// Values follow RFC 2744 `GSS_C_*_FLAG`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u32 {
        /// Delegate credentials to the peer.
        const DELEG = 1;
        /// Request that the peer authenticate itself.
        const MUTUAL = 2;
        /// Detect replayed protected messages.
        const REPLAY = 4;
        /// Detect out-of-sequence protected messages.
        const SEQUENCE = 8;
        const CONF = 16;
        const INTEG = 32;
        /// Do not reveal the initiator's identity.
        const ANON = 64;
        /// Returned only.
        const PROT_READY = 128;
        /// Returned only.
        const TRANS = 256;
        const DELEG_POLICY = 32768;
    }
}
