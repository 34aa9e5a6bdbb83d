//! Processor stage: transform records of one kind for its sink

use super::stage::{ProcessorSpec, StageReport};
use super::PipelineError;
use crate::load::SinkItem;
use crate::transform::build_transform;
use crate::transport::{ControlSubscriber, Delivery, LineEndpoints, PullChannel, PushChannel};
use crate::types::Record;
use tracing::{debug, info, warn};

pub async fn run(spec: ProcessorSpec) -> Result<StageReport, PipelineError> {
    let name = format!("line{}-{}-processor{}", spec.line, spec.kind, spec.index);
    // Unsupported languages fail before any channel is opened
    let mut transform = build_transform(spec.kind, &spec.language)?;

    let endpoints = LineEndpoints::for_line(&spec.network, spec.line);
    let connect_timeout = spec.network.connect_timeout();
    let mut output = PushChannel::<SinkItem>::connect(&endpoints.rows(spec.kind), connect_timeout).await?;
    let mut intake = PullChannel::<Record>::connect(&endpoints.records(spec.kind), connect_timeout).await?;
    let mut control = ControlSubscriber::connect(&endpoints.control(), connect_timeout).await?;
    debug!("{}: connected", name);

    let mut report = StageReport::new(name.as_str());
    loop {
        tokio::select! {
            biased;

            delivery = intake.recv() => match delivery {
                Some(Delivery::Data(record)) => {
                    report.received += 1;
                    let id = record.id();
                    match transform.apply(record) {
                        Ok(item) => {
                            output.send(item).await?;
                            report.emitted += 1;
                        }
                        Err(e) => {
                            warn!("{}: skipping record {}: {}", name, id, e);
                            report.skipped += 1;
                        }
                    }
                }
                Some(Delivery::Terminator) => {
                    debug!("{}: intake terminated", name);
                    break;
                }
                None => {
                    warn!("{}: producer disconnected without a terminator", name);
                    break;
                }
            },
            _ = control.stopped() => {
                debug!("{}: stop received", name);
                break;
            }
        }
    }

    output.finish(spec.ack_timeout()).await?;
    info!(
        "{}: {} records in, {} items out, {} skipped",
        name, report.received, report.emitted, report.skipped
    );
    Ok(report)
}
