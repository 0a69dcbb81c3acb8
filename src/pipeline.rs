//! Receive-decode-store loop

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::{
    codec::{self, AisStreamMessage},
    errors::AisTrackerError,
    models::StoredPositionRecord,
    sink::PositionSink,
    stream::FrameSource,
};

/// Counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub decode_failures: u64,
    pub ignored: u64,
    pub stored: u64,
    pub rejected: u64,
}

/// Drive frames from `source` into `sink` until the source is closed locally
/// or fails.
///
/// Each record is written before the next frame is read. Decode failures and
/// request-level store failures are logged and skipped; transport and store
/// connectivity failures end the run with an error.
pub async fn run<S, K>(source: &mut S, sink: &K) -> Result<PipelineStats, AisTrackerError>
where
    S: FrameSource + ?Sized,
    K: PositionSink + ?Sized,
{
    let mut stats = PipelineStats::default();
    let result = process(source, sink, &mut stats).await;
    info!("Pipeline stopped: {:?}", stats);
    result.map(|()| stats)
}

async fn process<S, K>(
    source: &mut S,
    sink: &K,
    stats: &mut PipelineStats,
) -> Result<(), AisTrackerError>
where
    S: FrameSource + ?Sized,
    K: PositionSink + ?Sized,
{
    while let Some(frame) = source.recv().await? {
        stats.frames += 1;

        let envelope = match codec::decode(&frame, Utc::now()) {
            Ok(envelope) => envelope,
            Err(e) if e.is_feed_error() => {
                error!("{}", e);
                stats.decode_failures += 1;
                continue;
            }
            Err(e) => {
                warn!("Dropping frame: {}", e);
                stats.decode_failures += 1;
                continue;
            }
        };

        let report = match envelope.message {
            AisStreamMessage::PositionReport(report) => report,
            AisStreamMessage::Ignored(kind) => {
                debug!("Ignoring {:?} message", kind);
                stats.ignored += 1;
                continue;
            }
        };

        let record = StoredPositionRecord::new(report, envelope.metadata);
        match sink.write(&record).await {
            Ok(ack) => {
                info!(
                    "Stored position for MMSI {}: name={:?} lat={} lon={}",
                    ack.mmsi, record.name, record.lat, record.lon
                );
                stats.stored += 1;
            }
            Err(e) if e.is_fatal() => {
                error!("Position store failed: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                warn!("Request failed: {}", e);
                stats.rejected += 1;
            }
        }
    }

    Ok(())
}
