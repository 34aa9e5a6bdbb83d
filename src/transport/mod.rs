//! TCP channels between pipeline stages
//!
//! Stages never share memory. The producer pushes records to processors,
//! processors push rows to sinks, and the producer broadcasts `Stop` on a
//! separate control channel. Connectors retry until their binder listens and
//! exchange a Hello/Welcome handshake before any data flows.

pub mod channel;
pub mod control;
pub mod endpoint;
pub mod frame;

pub use channel::{Delivery, FanIn, PullChannel, PullListener, PushChannel, PushListener};
pub use control::{ControlPublisher, ControlSubscriber};
pub use endpoint::{Endpoint, LineEndpoints, DATA_CHANNELS_PER_LINE};
pub use frame::{Frame, MAX_FRAME_SIZE};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not reach {endpoint} within {timeout:?}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },

    #[error("Only {ready} of {expected} peers became ready on {endpoint}")]
    ReadyTimeout {
        endpoint: Endpoint,
        expected: usize,
        ready: usize,
    },

    #[error("Timed out waiting for acknowledgement from {0}")]
    AckTimeout(Endpoint),

    #[error("Connection to {0} closed")]
    Closed(Endpoint),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Push channel has no peers")]
    NoPeers,
}
