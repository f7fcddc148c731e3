//! Security mechanisms and their wire identifiers.

use std::fmt;

/// An object identifier in DER content encoding, passed to the security
/// primitive unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(&'static [u8]);

impl Oid {
    /// Raw DER content bytes.
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.0
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Oid(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}

/// 1.3.6.1.5.5.2
pub const GSS_SPNEGO_MECH: Oid = Oid(&[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02]);

/// 1.2.840.113554.1.2.2
pub const GSS_KRB5_MECH: Oid = Oid(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02]);

/// 1.2.840.113554.1.2.1.4, `GSS_C_NT_HOSTBASED_SERVICE`
pub const GSS_NT_HOSTBASED_SERVICE: Oid =
    Oid(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x01, 0x04]);

/// The authentication mechanism a context negotiates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Mechanism {
    /// SPNEGO, sent under the `Negotiate` scheme.
    #[default]
    SpNego,
    /// Raw Kerberos 5, sent under the `Kerberos` scheme.
    Kerberos,
}

impl Mechanism {
    pub const ALL: [Mechanism; 2] = [Mechanism::SpNego, Mechanism::Kerberos];

    /// The mechanism OID handed to the exchange primitive.
    pub const fn oid(self) -> Oid {
        match self {
            Mechanism::SpNego => GSS_SPNEGO_MECH,
            Mechanism::Kerberos => GSS_KRB5_MECH,
        }
    }

    /// The HTTP authentication scheme label.
    pub const fn scheme(self) -> &'static str {
        match self {
            Mechanism::SpNego => "Negotiate",
            Mechanism::Kerberos => "Kerberos",
        }
    }

    /// Looks up a mechanism by scheme label, ignoring ASCII case.
    pub fn from_scheme(label: &str) -> Option<Mechanism> {
        let label = label.trim();
        Mechanism::ALL
            .into_iter()
            .find(|m| m.scheme().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}
