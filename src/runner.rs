//! Unattended job runner used by the command-line streamer

use gcodestream_communication::{StreamConfig, StreamerHandle, StreamingEngine, Transport};
use gcodestream_core::{EventDispatcher, StreamEvent, StreamStatus};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Stream `job` over `transport` until it completes, halts, or `cancel`
/// resolves
///
/// Nobody is around to resume a run, so any pause ends it. The returned
/// status is the one observed when the run ended, before it was stopped.
pub async fn stream_job<F>(
    config: StreamConfig,
    job: &str,
    transport: Box<dyn Transport>,
    check_mode: bool,
    cancel: F,
) -> anyhow::Result<StreamStatus>
where
    F: Future<Output = ()>,
{
    let engine = StreamingEngine::spawn(config);
    let result = drive(&engine, job, transport, check_mode, cancel).await;
    engine.shutdown().await?;
    result
}

async fn drive<F>(
    engine: &StreamerHandle,
    job: &str,
    transport: Box<dyn Transport>,
    check_mode: bool,
    cancel: F,
) -> anyhow::Result<StreamStatus>
where
    F: Future<Output = ()>,
{
    let dispatcher = Arc::new(EventDispatcher::default());
    let mut events = dispatcher.subscribe();
    engine.register_observer(dispatcher.clone()).await?;

    let total = engine.load_commands(job).await?;
    info!("Loaded {} lines{}", total, if check_mode { " (check mode)" } else { "" });
    engine.start(transport, check_mode).await?;

    tokio::pin!(cancel);
    loop {
        tokio::select! {
            _ = &mut cancel => {
                warn!("Interrupted, stopping");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if report(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let status = engine.status().await?;
    if !status.state.is_terminal() {
        engine.stop().await?;
    }
    Ok(status)
}

/// Log one event; true when the run cannot make further progress
fn report(event: &StreamEvent) -> bool {
    match event {
        StreamEvent::Progress(progress) => {
            debug!(
                "{}/{} acknowledged, {} bytes buffered",
                progress.acknowledged, progress.total, progress.buffer_used
            );
            false
        }
        StreamEvent::LineSuccess { .. } => false,
        StreamEvent::LineError(e) if e.fatal => {
            error!("{}", e);
            false
        }
        StreamEvent::LineError(e) => {
            warn!("{}", e);
            false
        }
        StreamEvent::Status(status) => {
            info!(
                "{} MPos {} F{} S{}",
                status.state, status.machine_position, status.feed_rate, status.spindle_speed
            );
            false
        }
        StreamEvent::Recovered(report) => {
            warn!(
                "Controller reset, resending from line {} ({} lines requeued)",
                report.resume_from, report.requeued
            );
            false
        }
        StreamEvent::Error(e) => {
            error!("{}", e);
            false
        }
        StreamEvent::Resumed => false,
        StreamEvent::Paused(reason) => {
            warn!("Halted: {}", reason);
            true
        }
        StreamEvent::Complete(progress) => {
            info!("Job complete: {} lines acknowledged", progress.acknowledged);
            true
        }
    }
}

