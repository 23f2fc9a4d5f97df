use crate::auth::AuthResolvers;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::transport::{HttpTransport, Transport};

/// Everything a session needs to go from credential to live handle: the
/// transport, the auth resolvers and the session configuration. Shared by
/// every session built from it.
pub struct Connector<T: Transport> {
    transport: T,
    resolvers: AuthResolvers,
    config: SessionConfig,
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: T, resolvers: AuthResolvers, config: SessionConfig) -> Self {
        Self {
            transport,
            resolvers,
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn resolvers(&self) -> &AuthResolvers {
        &self.resolvers
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Connector<HttpTransport> {
    /// HTTP transport and resolvers built from `config`.
    pub fn http(config: SessionConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        let resolvers = AuthResolvers::from_config(&config)?;
        Ok(Self::new(transport, resolvers, config))
    }
}
