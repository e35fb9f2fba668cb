//! Transport configuration.

use std::time::Duration;

use crate::connection::TlsParameters;

/// Authentication mechanism policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMech {
    /// Never authenticate, even when credentials are set.
    Disabled,
    /// Pick the strongest mechanism the server advertises:
    /// CRAM-MD5, then LOGIN, then PLAIN.
    #[default]
    AutoSelect,
    /// Use CRAM-MD5 unconditionally.
    CramMd5,
    /// Use LOGIN unconditionally.
    Login,
    /// Use PLAIN unconditionally.
    Plain,
}

/// STARTTLS policy for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsLevel {
    /// Never upgrade, even when the server offers STARTTLS.
    Disabled,
    /// Upgrade when the server advertises STARTTLS.
    #[default]
    Optional,
    /// Upgrade or fail every queued transaction with `TlsRequired`.
    Required,
}

/// Configuration for an [`SmtpTransport`](crate::SmtpTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Username for authentication.
    pub user: String,
    /// Password for authentication.
    pub password: String,
    /// Authentication mechanism policy.
    pub auth_mech: AuthMech,
    /// EHLO/HELO argument presented to the server.
    pub system_identifier: String,
    /// Inactivity timeout; the session aborts when the server stays
    /// silent for this long.
    pub timeout: Duration,
    /// STARTTLS policy.
    pub tls_level: TlsLevel,
    /// TLS trust, SNI, and protocol floor.
    pub tls_parameters: TlsParameters,
}

impl TransportConfig {
    /// Creates the default configuration: no credentials, auto-selected
    /// auth, `localhost` identifier, 60 second timeout, opportunistic TLS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            auth_mech: AuthMech::AutoSelect,
            system_identifier: "localhost".to_string(),
            timeout: Duration::from_secs(60),
            tls_level: TlsLevel::Optional,
            tls_parameters: TlsParameters::default(),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Creates a builder holding the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TransportConfig::new(),
        }
    }

    /// Sets the authentication username.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    /// Sets the authentication password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Sets the authentication mechanism policy.
    #[must_use]
    pub fn auth_mech(mut self, mech: AuthMech) -> Self {
        self.config.auth_mech = mech;
        self
    }

    /// Sets the EHLO/HELO system identifier.
    #[must_use]
    pub fn system_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.config.system_identifier = identifier.into();
        self
    }

    /// Sets the inactivity timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the STARTTLS policy.
    #[must_use]
    pub fn tls_level(mut self, level: TlsLevel) -> Self {
        self.config.tls_level = level;
        self
    }

    /// Sets the TLS parameters.
    #[must_use]
    pub fn tls_parameters(mut self, parameters: TlsParameters) -> Self {
        self.config.tls_parameters = parameters;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

impl Default for TransportConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransportConfig::new();
        assert_eq!(config.system_identifier, "localhost");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.tls_level, TlsLevel::Optional);
        assert_eq!(config.auth_mech, AuthMech::AutoSelect);
        assert!(config.user.is_empty());
    }

    #[test]
    fn builder_overrides() {
        let config = TransportConfig::builder()
            .user("tim")
            .password("tanstaaf")
            .auth_mech(AuthMech::CramMd5)
            .system_identifier("client.example.org")
            .timeout(Duration::from_millis(200))
            .tls_level(TlsLevel::Required)
            .build();

        assert_eq!(config.user, "tim");
        assert_eq!(config.auth_mech, AuthMech::CramMd5);
        assert_eq!(config.system_identifier, "client.example.org");
        assert_eq!(config.timeout, Duration::from_millis(200));
        assert_eq!(config.tls_level, TlsLevel::Required);
    }
}
