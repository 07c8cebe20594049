//! Transport errors

use thiserror::Error;

/// Errors that can occur on the publish/subscribe transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected to broker")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),
}
