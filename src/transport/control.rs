//! Stop broadcast from a producer to its processors

use super::channel::{connect, Binder, Connection};
use super::frame::{read_frame, write_frame, Frame};
use super::{Endpoint, TransportError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bound control endpoint
pub struct ControlPublisher {
    binder: Binder,
    subscribers: Vec<Connection>,
}

impl ControlPublisher {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        Ok(Self {
            binder: Binder::bind(endpoint).await?,
            subscribers: Vec::new(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.binder.endpoint()
    }

    /// Wait for `expected` subscribers to complete the handshake
    pub async fn accept_subscribers(&mut self, expected: usize, ready_timeout: Duration) -> Result<(), TransportError> {
        let mut accepted = self.binder.accept(expected, ready_timeout).await?;
        self.subscribers.append(&mut accepted);
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Send `Stop` to every subscriber. Subscribers that already went away
    /// are skipped.
    pub async fn publish_stop(&mut self) -> usize {
        let mut delivered = 0;
        for subscriber in &mut self.subscribers {
            let frame = Frame::<()>::Stop;
            let sent = async {
                write_frame(&mut subscriber.writer, &frame).await?;
                subscriber.writer.flush().await?;
                Ok::<(), TransportError>(())
            };
            match sent.await {
                Ok(()) => delivered += 1,
                Err(e) => debug!("{}: subscriber gone before stop: {}", subscriber.endpoint, e),
            }
        }
        debug!("Stop published to {}/{} subscribers", delivered, self.subscribers.len());
        delivered
    }
}

/// Connected control endpoint. Becomes stopped on `Stop` or when the
/// publisher disconnects.
pub struct ControlSubscriber {
    stopped: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl ControlSubscriber {
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self, TransportError> {
        let connection = connect(endpoint, connect_timeout).await?;
        let (tx, stopped) = watch::channel(false);
        let reader = tokio::spawn(watch_stop(connection, tx));
        Ok(Self { stopped, reader })
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Resolve once stop was requested. Cancel safe.
    pub async fn stopped(&mut self) {
        // An error means the reader ended, which only happens after stopping
        let _ = self.stopped.wait_for(|stopped| *stopped).await;
    }
}

impl Drop for ControlSubscriber {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn watch_stop(mut connection: Connection, tx: watch::Sender<bool>) {
    loop {
        match read_frame::<_, ()>(&mut connection.reader).await {
            Ok(Some(Frame::Stop)) => {
                debug!("{}: stop received", connection.endpoint);
                break;
            }
            Ok(Some(other)) => warn!("{}: unexpected control frame {:?}", connection.endpoint, other),
            Ok(None) => {
                debug!("{}: control publisher closed", connection.endpoint);
                break;
            }
            Err(e) => {
                warn!("{}: control channel failed: {}", connection.endpoint, e);
                break;
            }
        }
    }
    let _ = tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_reaches_every_subscriber() {
        let endpoint = Endpoint::new("127.0.0.1", 38230);
        let mut publisher = ControlPublisher::bind(&endpoint).await.unwrap();

        let subscribers = (0..3).map(|_| {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                let mut subscriber = ControlSubscriber::connect(&endpoint, Duration::from_secs(5)).await.unwrap();
                subscriber.stopped().await;
                subscriber.is_stopped()
            })
        });
        let subscribers: Vec<_> = subscribers.collect();

        publisher.accept_subscribers(3, Duration::from_secs(5)).await.unwrap();
        assert_eq!(publisher.publish_stop().await, 3);
        for subscriber in subscribers {
            assert!(subscriber.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_publisher_gone_counts_as_stop() {
        let endpoint = Endpoint::new("127.0.0.1", 38231);
        let mut publisher = ControlPublisher::bind(&endpoint).await.unwrap();
        let subscriber = tokio::spawn({
            let endpoint = endpoint.clone();
            async move {
                let mut subscriber = ControlSubscriber::connect(&endpoint, Duration::from_secs(5)).await.unwrap();
                subscriber.stopped().await;
            }
        });
        publisher.accept_subscribers(1, Duration::from_secs(5)).await.unwrap();
        drop(publisher);
        tokio::time::timeout(Duration::from_secs(5), subscriber).await.unwrap().unwrap();
    }
}
