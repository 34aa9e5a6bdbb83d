//! Sink stage: merge processor output and bulk-load it

use super::stage::{SinkSpec, StageReport};
use super::PipelineError;
use crate::load::{BatchLoader, FailureLog, SinkItem};
use crate::storage;
use crate::transport::{Delivery, FanIn, LineEndpoints, PullListener};
use tracing::{debug, info};

pub async fn run(spec: SinkSpec) -> Result<StageReport, PipelineError> {
    let name = format!("line{}-{}-sink", spec.line, spec.kind);
    let endpoints = LineEndpoints::for_line(&spec.network, spec.line);
    let listener = PullListener::<SinkItem>::bind(&endpoints.rows(spec.kind)).await?;

    let store = storage::connect(&spec.storage).await?;
    let mut loader = BatchLoader::new(
        format!("line{}-{}", spec.line, spec.kind),
        store,
        spec.storage.staging_dir(),
        spec.cache_size,
        FailureLog::new(&spec.failure_log),
    );

    let mut intake = listener.accept(spec.fan, spec.network.ready_timeout()).await?;
    debug!("{}: {} processors connected", name, spec.fan);

    let mut fan_in = FanIn::new(spec.fan);
    let mut report = StageReport::new(name.as_str());
    while !fan_in.is_drained() {
        match intake.recv().await {
            Some(Delivery::Data(item)) => {
                report.received += 1;
                loader.push(&item).await?;
            }
            Some(Delivery::Terminator) => {
                fan_in.terminator();
                debug!("{}: {} senders outstanding", name, fan_in.remaining());
            }
            None => {
                return Err(PipelineError::stage(
                    name.as_str(),
                    format!("intake closed with {} terminators outstanding", fan_in.remaining()),
                ));
            }
        }
    }

    let stats = loader.finish().await?;
    info!(
        "{}: {} items in {} cycles, {} rows loaded, {} chunks failed",
        name, stats.items, stats.cycles, stats.rows_loaded, stats.chunks_failed
    );
    report.emitted = stats.rows_loaded;
    report.load = Some(stats);
    Ok(report)
}
