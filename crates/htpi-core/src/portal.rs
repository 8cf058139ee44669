// ── Portal composition root ──
//
// Builds every service once and hands out shared handles. Nothing here is
// global: a front end owns one `Portal` for its lifetime.

use std::sync::Arc;

use htpi_api::channel::SocketIoTransport;
use htpi_api::{ChannelTransport, RestClient};

use crate::config::PortalConfig;
use crate::connection::ConnectionManager;
use crate::credentials::CredentialStore;
use crate::error::CoreError;
use crate::session::SessionController;
use crate::sync::DataSync;

pub struct Portal {
    config: PortalConfig,
    credentials: CredentialStore,
    connection: ConnectionManager,
    sync: DataSync,
    session: SessionController,
}

impl Portal {
    /// Wire the services over the Socket.IO channel.
    pub fn new(config: PortalConfig, credentials: CredentialStore) -> Result<Self, CoreError> {
        let transport = Arc::new(SocketIoTransport::new(config.socketio()));
        Self::with_transport(config, credentials, transport)
    }

    /// Wire the services over any channel transport.
    pub fn with_transport(
        config: PortalConfig,
        credentials: CredentialStore,
        transport: Arc<dyn ChannelTransport>,
    ) -> Result<Self, CoreError> {
        let rest = RestClient::new(
            config.rest_url().clone(),
            Arc::new(credentials.clone()),
            &config.transport(),
        )?;
        let connection =
            ConnectionManager::new(transport, credentials.clone(), config.reconnect.clone());
        let sync = DataSync::new(connection.clone(), config.request_timeout);
        let session = SessionController::new(
            rest,
            credentials.clone(),
            connection.clone(),
            sync.clone(),
        );

        Ok(Self {
            config,
            credentials,
            connection,
            sync,
            session,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn data(&self) -> &DataSync {
        &self.sync
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Close the channel. Stored credentials are kept.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
    }
}
