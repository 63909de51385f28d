//! Session management.
//!
//! A [`Session`] owns the single broker connection. Every operation borrows
//! it only as a factory for channels: each publish, fetch or subscription
//! takes its own [`ChannelScope`] and never shares it.

mod scope;

use lapin::{Connection, ConnectionProperties};
use tracing::{debug, info};

use crate::utils::{AmqpError, Result};

pub use scope::ChannelScope;

pub struct Session {
    connection: Connection,
}

impl Session {
    /// Dials the broker once. The dial error is returned untouched and no
    /// retry is attempted; reconnect policy belongs to the caller.
    pub async fn start(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(AmqpError::Connect)?;
        info!("Connected to broker");
        Ok(Self { connection })
    }

    /// Opens a channel bound to one operation.
    pub async fn channel(&self) -> Result<ChannelScope> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(AmqpError::Channel)?;
        debug!(channel = channel.id(), "Opened channel");
        Ok(ChannelScope::new(channel))
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(self) -> Result<()> {
        self.connection
            .close(200, "session closed")
            .await
            .map_err(AmqpError::Connect)?;
        info!("Closed broker connection");
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .finish()
    }
}
