//! Protocol constants, session defaults and SSH algorithm profiles.
//!
//! The NETCONF constants cover the namespaces and capability URIs used when
//! building and decoding messages. The SSH algorithm lists back the
//! security profiles in [`crate::session::ConnectionSecurityOptions`].

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::session::SessionRecordLevel;

/// NETCONF base namespace.
pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Namespace of `<notification>` documents and `<create-subscription>`.
pub const NETCONF_NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// Base protocol 1.0 capability (end-of-message framing).
pub const CAPABILITY_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// Base protocol 1.1 capability (chunked framing).
pub const CAPABILITY_BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

pub const CAPABILITY_CANDIDATE: &str = "urn:ietf:params:netconf:capability:candidate:1.0";
pub const CAPABILITY_CONFIRMED_COMMIT: &str =
    "urn:ietf:params:netconf:capability:confirmed-commit:1.1";
pub const CAPABILITY_CONFIRMED_COMMIT_1_0: &str =
    "urn:ietf:params:netconf:capability:confirmed-commit:1.0";
pub const CAPABILITY_ROLLBACK_ON_ERROR: &str =
    "urn:ietf:params:netconf:capability:rollback-on-error:1.0";
pub const CAPABILITY_VALIDATE: &str = "urn:ietf:params:netconf:capability:validate:1.1";
pub const CAPABILITY_VALIDATE_1_0: &str = "urn:ietf:params:netconf:capability:validate:1.0";
pub const CAPABILITY_STARTUP: &str = "urn:ietf:params:netconf:capability:startup:1.0";
pub const CAPABILITY_URL: &str = "urn:ietf:params:netconf:capability:url:1.0";
pub const CAPABILITY_XPATH: &str = "urn:ietf:params:netconf:capability:xpath:1.0";
pub const CAPABILITY_WRITABLE_RUNNING: &str =
    "urn:ietf:params:netconf:capability:writable-running:1.0";
pub const CAPABILITY_NOTIFICATION: &str = "urn:ietf:params:netconf:capability:notification:1.0";

/// End-of-message marker used by base 1.0 framing.
pub const END_OF_MESSAGE: &[u8] = b"]]>]]>";

/// Terminator of a chunked (base 1.1) message.
pub const END_OF_CHUNKS: &[u8] = b"\n##\n";

/// Largest chunk size allowed by RFC 6242.
pub const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

/// SSH subsystem name for NETCONF.
pub const NETCONF_SUBSYSTEM: &str = "netconf";

/// Default NETCONF-over-SSH port.
pub const NETCONF_PORT: u16 = 830;

/// Settings applied when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionConfig {
    /// Seconds to wait for the peer hello.
    pub hello_timeout_secs: u64,
    /// Default per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Capability URIs advertised in the local hello.
    pub capabilities: Vec<String>,
    /// Largest chunk written in chunked framing mode.
    pub max_chunk_size: usize,
    /// Recording level for the session recorder, if one is attached.
    pub recording: SessionRecordLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hello_timeout_secs: 60,
            request_timeout_secs: 60,
            capabilities: vec![
                CAPABILITY_BASE_1_0.to_string(),
                CAPABILITY_BASE_1_1.to_string(),
            ],
            max_chunk_size: 64 * 1024,
            recording: SessionRecordLevel::Off,
        }
    }
}

impl SessionConfig {
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Modern key exchange algorithms only.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G18_SHA512,
];

/// Modern key exchange plus SHA-256 Diffie-Hellman groups.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::DH_G18_SHA512,
];

/// All supported key exchange algorithms, including SHA-1 groups for
/// older devices.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

pub static SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub static BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_128_CBC,
];

/// CBC ciphers for older devices. NETCONF carries credentials and
/// configuration, so `none` is absent from every profile.
pub static LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

/// Includes DSA and SHA-1 RSA for compatibility with older devices.
pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::SkEcdsaSha2NistP256,
    Algorithm::SkEd25519,
];
