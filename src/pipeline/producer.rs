//! Producer stage: decode one dump and fan records out to processors

use super::stage::{Fans, ProducerSpec, StageReport};
use super::PipelineError;
use crate::import::{open_dump, DecodeError, DecodeProgress, DecoderStats, DumpDecoder};
use crate::transport::{ControlPublisher, LineEndpoints, PushChannel, PushListener, TransportError};
use crate::types::{Record, RecordKind};
use futures::future::{try_join, try_join_all};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Decoded records buffered between the decoder thread and the router
const RECORD_QUEUE: usize = 4096;

pub async fn run(spec: ProducerSpec) -> Result<StageReport, PipelineError> {
    let name = format!("line{}-producer", spec.line);
    let endpoints = LineEndpoints::for_line(&spec.network, spec.line);
    let ready_timeout = spec.network.ready_timeout();

    // Bind everything before waiting on anyone so processors can connect in
    // any order
    let mut listeners = Vec::new();
    for kind in spec.fans.active() {
        let listener = PushListener::<Record>::bind(&endpoints.records(kind)).await?;
        listeners.push((kind, listener));
    }
    let mut control = ControlPublisher::bind(&endpoints.control()).await?;

    let mut channels = accept_processors(listeners, &mut control, spec.fans, ready_timeout).await?;
    info!("{}: {} processors ready, decoding {}", name, spec.fans.total(), spec.dump.display());

    let (tx, mut rx) = mpsc::channel::<Record>(RECORD_QUEUE);
    let dump = spec.dump.clone();
    let decoder = tokio::task::spawn_blocking(move || -> Result<DecoderStats, DecodeError> {
        let mut decoder = DumpDecoder::new(open_dump(&dump)?);
        for record in decoder.by_ref() {
            if tx.blocking_send(record?).is_err() {
                break;
            }
        }
        Ok(decoder.stats().clone())
    });

    let progress = DecodeProgress::new(&spec.dump, !spec.progress);
    let mut report = StageReport::new(name.as_str());
    let mut routing_error: Option<TransportError> = None;

    while let Some(record) = rx.recv().await {
        report.received += 1;
        let kind = record.kind();
        match channels.get_mut(&kind) {
            Some(channel) => {
                if let Err(e) = channel.send(record).await {
                    routing_error = Some(e);
                    break;
                }
                progress.record_routed(kind);
                report.emitted += 1;
            }
            None => {
                progress.record_dropped();
                report.skipped += 1;
            }
        }
    }
    // Unblocks the decoder thread if routing stopped early
    drop(rx);

    let decoded = decoder.await.map_err(|e| PipelineError::stage(name.as_str(), e))?;
    match &decoded {
        Ok(stats) => {
            report.skipped += stats.skipped;
            progress.finish();
        }
        Err(e) => {
            error!("{}: decoding {} failed: {}", name, spec.dump.display(), e);
            progress.abandon(&e.to_string());
        }
    }
    let dropped = progress.get_stats().dropped;
    if dropped > 0 {
        warn!("{}: dropped {} records of kinds without processors", name, dropped);
    }

    // Drain every channel before telling processors to stop
    let mut shutdown_error: Option<TransportError> = None;
    for (kind, channel) in channels {
        match channel.finish(spec.ack_timeout()).await {
            Ok(sent) => debug!("{}: {} channel finished after {} records", name, kind, sent),
            Err(e) => {
                error!("{}: could not finish {} channel: {}", name, kind, e);
                shutdown_error.get_or_insert(e);
            }
        }
    }
    let stopped = control.publish_stop().await;
    debug!("{}: stop sent to {} processors", name, stopped);

    decoded?;
    if let Some(e) = routing_error.or(shutdown_error) {
        return Err(e.into());
    }

    info!(
        "{}: routed {} of {} records ({} skipped)",
        name, report.emitted, report.received, report.skipped
    );
    Ok(report)
}

/// Handshake with every processor of the line at once. A processor that
/// connects early waits for its welcome, so no kind may hold up another.
async fn accept_processors(
    listeners: Vec<(RecordKind, PushListener<Record>)>,
    control: &mut ControlPublisher,
    fans: Fans,
    ready_timeout: Duration,
) -> Result<BTreeMap<RecordKind, PushChannel<Record>>, TransportError> {
    let channels = try_join_all(listeners.into_iter().map(|(kind, listener)| async move {
        let channel = listener.accept_peers(fans.get(kind), ready_timeout).await?;
        Ok::<_, TransportError>((kind, channel))
    }));
    let (channels, ()) = try_join(channels, control.accept_subscribers(fans.total(), ready_timeout)).await?;
    Ok(channels.into_iter().collect())
}
