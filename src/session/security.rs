use super::*;

/// SSH algorithm policy of a NETCONF connection.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Modern key exchange, AEAD/CTR ciphers and SHA-2 MACs only.
    #[default]
    Secure,
    /// Adds CBC ciphers, SHA-1 MACs and SHA-256 Diffie-Hellman groups.
    Balanced,
    /// Adds SHA-1 key exchange and DSA host keys for old devices.
    /// Unencrypted ciphers and MACs are never offered.
    LegacyCompatible,
}

impl SecurityLevel {
    /// Host key policy a profile starts from.
    pub fn default_host_key(self) -> HostKeyPolicy {
        match self {
            SecurityLevel::Secure | SecurityLevel::Balanced => HostKeyPolicy::KnownHosts,
            SecurityLevel::LegacyCompatible => HostKeyPolicy::AcceptAny,
        }
    }

    pub(crate) fn preferred(self) -> Preferred {
        let (kex, key, cipher, mac) = match self {
            SecurityLevel::Secure => (
                config::SECURE_KEX_ORDER,
                config::SECURE_KEY_TYPES,
                config::SECURE_CIPHERS,
                config::SECURE_MAC_ALGORITHMS,
            ),
            SecurityLevel::Balanced => (
                config::BALANCED_KEX_ORDER,
                config::BALANCED_KEY_TYPES,
                config::BALANCED_CIPHERS,
                config::BALANCED_MAC_ALGORITHMS,
            ),
            SecurityLevel::LegacyCompatible => (
                config::LEGACY_KEX_ORDER,
                config::LEGACY_KEY_TYPES,
                config::LEGACY_CIPHERS,
                config::LEGACY_MAC_ALGORITHMS,
            ),
        };
        Preferred {
            kex: Cow::Borrowed(kex),
            key: Cow::Borrowed(key),
            cipher: Cow::Borrowed(cipher),
            mac: Cow::Borrowed(mac),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        }
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secure" => Ok(SecurityLevel::Secure),
            "balanced" => Ok(SecurityLevel::Balanced),
            "legacy" | "legacy_compatible" => Ok(SecurityLevel::LegacyCompatible),
            other => Err(NetconfError::InvalidRequest(format!(
                "unknown security level '{other}'"
            ))),
        }
    }
}

/// How the device host key is verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum HostKeyPolicy {
    /// `~/.ssh/known_hosts`.
    KnownHosts,
    /// A known_hosts file at the given path.
    KnownHostsFile(String),
    /// Exactly this base64 OpenSSH public key, as printed by `ssh-keyscan`
    /// without the host and algorithm columns.
    Pinned(String),
    /// Accept any host key.
    AcceptAny,
}

impl HostKeyPolicy {
    pub(crate) fn server_check(&self) -> ServerCheckMethod {
        match self {
            HostKeyPolicy::KnownHosts => ServerCheckMethod::DefaultKnownHostsFile,
            HostKeyPolicy::KnownHostsFile(path) => ServerCheckMethod::KnownHostsFile(path.clone()),
            HostKeyPolicy::Pinned(key) => ServerCheckMethod::PublicKey(key.clone()),
            HostKeyPolicy::AcceptAny => ServerCheckMethod::NoCheck,
        }
    }
}

/// SSH settings used to reach a NETCONF server.
///
/// Serializable so device inventories can carry them next to a
/// [`SessionConfig`]. The [`SessionManager`] only reuses a cached session
/// when these options compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionSecurityOptions {
    pub level: SecurityLevel,
    pub host_key: HostKeyPolicy,
    /// Drops the SSH connection after this many idle seconds.
    pub inactivity_timeout_secs: Option<u64>,
    /// Sends SSH keepalives at this interval, keeping long notification
    /// subscriptions alive through idle periods.
    pub keepalive_secs: Option<u64>,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::secure_default()
    }
}

impl ConnectionSecurityOptions {
    pub fn new(level: SecurityLevel) -> Self {
        Self {
            level,
            host_key: level.default_host_key(),
            inactivity_timeout_secs: Some(60),
            keepalive_secs: None,
        }
    }

    pub fn secure_default() -> Self {
        Self::new(SecurityLevel::Secure)
    }

    pub fn balanced() -> Self {
        Self::new(SecurityLevel::Balanced)
    }

    pub fn legacy_compatible() -> Self {
        Self::new(SecurityLevel::LegacyCompatible)
    }

    pub fn with_host_key(mut self, host_key: HostKeyPolicy) -> Self {
        self.host_key = host_key;
        self
    }

    /// Shorthand for [`HostKeyPolicy::Pinned`].
    pub fn pinned(self, public_key: impl Into<String>) -> Self {
        self.with_host_key(HostKeyPolicy::Pinned(public_key.into()))
    }

    pub fn with_inactivity_timeout(mut self, secs: Option<u64>) -> Self {
        self.inactivity_timeout_secs = secs;
        self
    }

    pub fn with_keepalive(mut self, secs: Option<u64>) -> Self {
        self.keepalive_secs = secs;
        self
    }

    /// Keepalives must fire before the inactivity timeout, otherwise they
    /// never run.
    pub fn validate(&self) -> Result<(), NetconfError> {
        match (self.keepalive_secs, self.inactivity_timeout_secs) {
            (Some(0), _) => Err(NetconfError::InvalidRequest(
                "keepalive interval must be positive".to_string(),
            )),
            (Some(keepalive), Some(idle)) if keepalive >= idle => {
                Err(NetconfError::InvalidRequest(format!(
                    "keepalive interval {keepalive}s must be shorter than inactivity timeout {idle}s"
                )))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn server_check(&self) -> ServerCheckMethod {
        self.host_key.server_check()
    }

    /// Client configuration handed to the SSH library.
    pub(crate) fn ssh_config(&self) -> async_ssh2_tokio::Config {
        async_ssh2_tokio::Config {
            preferred: self.level.preferred(),
            inactivity_timeout: self.inactivity_timeout_secs.map(Duration::from_secs),
            keepalive_interval: self.keepalive_secs.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::{cipher, kex, mac};

    #[test]
    fn profiles_pick_their_host_key_policy() {
        let options = ConnectionSecurityOptions::default();
        assert_eq!(options.level, SecurityLevel::Secure);
        assert_eq!(options.host_key, HostKeyPolicy::KnownHosts);
        assert!(matches!(
            options.server_check(),
            ServerCheckMethod::DefaultKnownHostsFile
        ));

        let legacy = ConnectionSecurityOptions::legacy_compatible();
        assert!(matches!(legacy.server_check(), ServerCheckMethod::NoCheck));

        let pinned = ConnectionSecurityOptions::balanced().pinned("AAAAC3NzaC1lZDI1NTE5AAAAIExample");
        assert_eq!(pinned.level, SecurityLevel::Balanced);
        assert!(matches!(
            pinned.server_check(),
            ServerCheckMethod::PublicKey(ref key) if key == "AAAAC3NzaC1lZDI1NTE5AAAAIExample"
        ));
        assert_ne!(pinned, ConnectionSecurityOptions::balanced());
    }

    #[test]
    fn secure_profile_excludes_weak_algorithms() {
        let preferred = SecurityLevel::Secure.preferred();
        assert!(!preferred.kex.contains(&kex::DH_G1_SHA1));
        assert!(!preferred.cipher.contains(&cipher::AES_128_CBC));
        assert!(!preferred.mac.contains(&mac::HMAC_SHA1));
    }

    #[test]
    fn no_profile_offers_an_unencrypted_channel() {
        for level in [
            SecurityLevel::Secure,
            SecurityLevel::Balanced,
            SecurityLevel::LegacyCompatible,
        ] {
            let preferred = level.preferred();
            assert!(!preferred.kex.contains(&kex::NONE), "{level:?}");
            assert!(!preferred.cipher.contains(&cipher::NONE), "{level:?}");
            assert!(!preferred.cipher.contains(&cipher::CLEAR), "{level:?}");
            assert!(!preferred.mac.contains(&mac::NONE), "{level:?}");
        }
        let legacy = SecurityLevel::LegacyCompatible.preferred();
        assert!(legacy.kex.contains(&kex::DH_G1_SHA1));
        assert!(legacy.mac.contains(&mac::HMAC_SHA1));
    }

    #[test]
    fn ssh_config_carries_timeouts() {
        let options = ConnectionSecurityOptions::secure_default()
            .with_inactivity_timeout(Some(300))
            .with_keepalive(Some(30));
        options.validate().expect("valid");
        let config = options.ssh_config();
        assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));

        let too_slow = options.clone().with_keepalive(Some(300));
        assert!(matches!(too_slow.validate(), Err(NetconfError::InvalidRequest(_))));
        assert!(options.with_keepalive(Some(0)).validate().is_err());
    }

    #[test]
    fn options_load_from_inventory_json() {
        let json = r#"{"level":"legacy_compatible","host_key":{"kind":"known_hosts_file","value":"/etc/netconf/known_hosts"},"inactivity_timeout_secs":null,"keepalive_secs":15}"#;
        let options: ConnectionSecurityOptions = serde_json::from_str(json).expect("parse");
        assert_eq!(options.level, SecurityLevel::LegacyCompatible);
        assert_eq!(
            options.host_key,
            HostKeyPolicy::KnownHostsFile("/etc/netconf/known_hosts".to_string())
        );
        options.validate().expect("no inactivity timeout");
        assert_eq!("legacy".parse::<SecurityLevel>().expect("level"), options.level);
        assert!("paranoid".parse::<SecurityLevel>().is_err());
    }
}
