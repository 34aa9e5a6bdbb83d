//! Transport tests over real sockets
//!
//! Each test owns its own port range.

use std::time::Duration;
use wikidat::transport::{
    ControlPublisher, ControlSubscriber, Delivery, Endpoint, FanIn, PullChannel, PullListener, PushChannel,
    PushListener,
};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Items pushed by one binder are spread round-robin and each reaches
/// exactly one puller, in order per link
#[tokio::test]
async fn test_round_robin_fan_out() {
    let endpoint = Endpoint::new("127.0.0.1", 38500);
    let listener = PushListener::<u32>::bind(&endpoint).await.unwrap();

    let pullers = (0..3).map(|_| {
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            let mut intake = PullChannel::<u32>::connect(&endpoint, TIMEOUT).await.unwrap();
            let mut received = Vec::new();
            while let Some(Delivery::Data(item)) = intake.recv().await {
                received.push(item);
            }
            received
        })
    });
    let pullers: Vec<_> = pullers.collect();

    let mut push = listener.accept_peers(3, TIMEOUT).await.unwrap();
    for item in 0..9 {
        push.send(item).await.unwrap();
    }
    assert_eq!(push.finish(TIMEOUT).await.unwrap(), 9);

    let mut all = Vec::new();
    for puller in pullers {
        let received = puller.await.unwrap();
        assert_eq!(received.len(), 3);
        assert!(received.windows(2).all(|w| w[0] < w[1]), "order broken: {:?}", received);
        all.extend(received);
    }
    all.sort_unstable();
    assert_eq!(all, (0..9).collect::<Vec<_>>());
}

/// A fan-in drains exactly when the last of P senders terminates, whatever
/// the order the senders finish in
#[tokio::test]
async fn test_fan_in_terminates_after_every_sender() {
    let endpoint = Endpoint::new("127.0.0.1", 38510);
    let listener = PullListener::<String>::bind(&endpoint).await.unwrap();

    let senders: Vec<_> = [300u64, 0, 150]
        .into_iter()
        .enumerate()
        .map(|(id, delay)| {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                let mut push = PushChannel::<String>::connect(&endpoint, TIMEOUT).await.unwrap();
                tokio::time::sleep(Duration::from_millis(delay)).await;
                for n in 0..4 {
                    push.send(format!("{}-{}", id, n)).await.unwrap();
                }
                push.finish(TIMEOUT).await.unwrap()
            })
        })
        .collect();

    let mut intake = listener.accept(3, TIMEOUT).await.unwrap();
    let mut fan_in = FanIn::new(3);
    let mut items = 0;
    while !fan_in.is_drained() {
        match intake.recv().await {
            Some(Delivery::Data(_)) => items += 1,
            Some(Delivery::Terminator) => {
                fan_in.terminator();
            }
            None => panic!("intake closed with {} terminators outstanding", fan_in.remaining()),
        }
    }
    // Every item was queued ahead of its sender's terminator
    assert_eq!(items, 12);

    for sender in senders {
        assert_eq!(sender.await.unwrap(), 4);
    }
}

/// Stop reaches every subscriber once published
#[tokio::test]
async fn test_stop_broadcast() {
    let endpoint = Endpoint::new("127.0.0.1", 38520);
    let mut publisher = ControlPublisher::bind(&endpoint).await.unwrap();

    let subscribers: Vec<_> = (0..2)
        .map(|_| {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                let mut control = ControlSubscriber::connect(&endpoint, TIMEOUT).await.unwrap();
                tokio::time::timeout(TIMEOUT, control.stopped()).await.is_ok()
            })
        })
        .collect();

    publisher.accept_subscribers(2, TIMEOUT).await.unwrap();
    assert_eq!(publisher.publish_stop().await, 2);

    for subscriber in subscribers {
        assert!(subscriber.await.unwrap());
    }
}
