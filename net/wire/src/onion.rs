//! Tor v3 onion addresses.
//!
//! The `onion3` ENR entry and `.onion` hostnames both use the 62-character
//! v3 grammar: 56 base32 characters followed by `.onion`.

use std::{
    fmt::{self, Display, Formatter},
    str::{self, FromStr},
};

use thiserror::Error;

/// A v3, `Copy`able onion address without a port.
///
/// The port of an onion endpoint always comes from elsewhere (the record's
/// TCP entry, defaulting to the protocol port).
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash)]
pub struct OnionAddr {
    /// The 56-character base32 domain, lowercase, without the `.onion` suffix.
    domain: [u8; 56],
}

/// Error enum at parsing onion addresses.
#[derive(Debug, Error)]
pub enum OnionAddrParsingError {
    #[error("address is either too long or short, length: {0}")]
    InvalidLength(usize),
    #[error("this is not an onion address, tld: {0}")]
    InvalidTld(String),
    #[error("domain contains non base32 characters")]
    NonBase32Char,
}

impl OnionAddr {
    /// Validates a complete `.onion` address string.
    ///
    /// Parsing is case-insensitive; the stored domain is always lowercase.
    pub fn check_addr(addr: &str) -> Result<[u8; 56], OnionAddrParsingError> {
        // v3 onion addresses are 62 characters long.
        if addr.len() != 62 {
            return Err(OnionAddrParsingError::InvalidLength(addr.len()));
        }

        let Some((domain, tld)) = addr.split_at_checked(56) else {
            return Err(OnionAddrParsingError::NonBase32Char);
        };

        if !tld.eq_ignore_ascii_case(".onion") {
            return Err(OnionAddrParsingError::InvalidTld(String::from(tld)));
        }

        let mut out = [0_u8; 56];
        for (i, c) in domain.bytes().enumerate() {
            let c = c.to_ascii_lowercase();
            if !(c.is_ascii_lowercase() || (b'2'..=b'7').contains(&c)) {
                return Err(OnionAddrParsingError::NonBase32Char);
            }
            out[i] = c;
        }

        Ok(out)
    }

    /// Whether a hostname is an onion address by suffix alone, without
    /// requiring the full v3 grammar. Such hostnames must never hit DNS.
    pub fn is_onion_hostname(host: &str) -> bool {
        let host = host.strip_suffix('.').unwrap_or(host);
        host.len() >= ".onion".len()
            && host[host.len() - ".onion".len()..].eq_ignore_ascii_case(".onion")
    }

    /// The 56-character domain, without the `.onion` suffix.
    pub const fn domain(&self) -> [u8; 56] {
        self.domain
    }
}

/// Prints the canonical lowercase form, `<domain>.onion`.
impl Display for OnionAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let domain =
            str::from_utf8(&self.domain).expect("onion domains only contain ascii base32");
        f.write_str(domain)?;
        f.write_str(".onion")
    }
}

impl FromStr for OnionAddr {
    type Err = OnionAddrParsingError;

    fn from_str(addr: &str) -> Result<Self, Self::Err> {
        Self::check_addr(addr).map(|domain| Self { domain })
    }
}
