use super::*;

impl SessionManager {
    /// Creates a manager opening sessions with the default [`SessionConfig`].
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        // Cache up to 100 sessions. Evict after 5 minutes of inactivity.
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();

        Self { cache, config }
    }

    /// Gets a cached session or opens a new one with the secure profile.
    pub async fn get(
        &self,
        user: &str,
        addr: &str,
        port: u16,
        password: &str,
    ) -> Result<Session, NetconfError> {
        self.get_with_security(user, addr, port, password, ConnectionSecurityOptions::default())
            .await
    }

    /// Gets a cached session or opens a new one with explicit security options.
    ///
    /// A cached session is reused only while it is active and was opened
    /// with the same password and security options; otherwise it is closed
    /// and replaced.
    pub async fn get_with_security(
        &self,
        user: &str,
        addr: &str,
        port: u16,
        password: &str,
        security_options: ConnectionSecurityOptions,
    ) -> Result<Session, NetconfError> {
        let device_addr = format!("{user}@{addr}:{port}");
        let password_hash = calculate_password_hash(password);

        if let Some(cached) = self.cache.get(&device_addr).await {
            debug!("Cache hit: {}", device_addr);
            if !cached.session.is_active() {
                debug!("Cached session {} is closed. Removing.", device_addr);
                self.cache.invalidate(&device_addr).await;
            } else if cached.matches(&password_hash, &security_options) {
                debug!("Cached session params match, reusing: {}", device_addr);
                return Ok(cached.session);
            } else {
                debug!("Cached session params mismatch, recreating: {}", device_addr);
                self.cache.invalidate(&device_addr).await;
                if let Err(e) = cached.session.close().await {
                    debug!("Error closing old session: {} - {}", device_addr, e);
                }
            }
        } else {
            debug!("Cache miss, opening new session for {}...", device_addr);
        }

        let session = Session::connect(
            user,
            addr,
            port,
            password,
            &security_options,
            self.config.clone(),
        )
        .await?;
        self.cache
            .insert(
                device_addr.clone(),
                CachedSession {
                    session: session.clone(),
                    password_hash,
                    security_options,
                },
            )
            .await;
        debug!("New session for {} has been cached.", device_addr);

        Ok(session)
    }

    /// Runs a candidate transaction on a managed session.
    pub async fn execute_transaction(
        &self,
        user: &str,
        addr: &str,
        port: u16,
        password: &str,
        tx: &ConfigTransaction,
    ) -> Result<TxResult, NetconfError> {
        let session = self.get(user, addr, port, password).await?;
        session.execute_transaction(tx).await
    }

    /// Closes and forgets the session for `user@addr:port`.
    pub async fn invalidate(&self, user: &str, addr: &str, port: u16) -> Result<(), NetconfError> {
        let device_addr = format!("{user}@{addr}:{port}");
        match self.cache.remove(&device_addr).await {
            Some(cached) => {
                debug!("Closing managed session {}", device_addr);
                cached.session.close().await
            }
            None => Ok(()),
        }
    }

    /// Number of cached sessions, including ones pending eviction.
    pub fn cached_sessions(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CachedSession {
    fn matches(&self, password_hash: &[u8; 32], security_options: &ConnectionSecurityOptions) -> bool {
        if &self.password_hash != password_hash {
            debug!("Password hash mismatch");
            return false;
        }
        if &self.security_options != security_options {
            debug!("Security options mismatch");
            return false;
        }
        true
    }
}

/// Calculates SHA-256 hash of the password.
fn calculate_password_hash(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}
