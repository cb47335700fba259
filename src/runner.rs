// THEORY:
// The runner is the embedding loop for applications that do not want to drive
// `VisionPipeline::tick` themselves. It is a periodic refresh callback:
//
// 1.  A tokio interval fires at `display.refresh_rate_hz`. Late ticks are
//     dropped, not bunched up.
// 2.  On each tick the pipeline's frame gate is asked first. Only when a frame
//     is due is one pulled from the source; the pull runs on the blocking pool
//     because sources read files or devices.
// 3.  The frame is processed and its report handed to the sink.
//
// The loop ends when the source runs dry, when the stop signal turns `true`, or
// on the first error. The pipeline is stopped on every exit path.

use crate::error::{SourceError, VisionError};
use crate::pipeline::VisionPipeline;
use crate::render::Sink;
use crate::source::{Frame, FrameSource};
use futures::{Stream, StreamExt, stream};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames pulled from the source.
    pub frames: u64,
    /// Reports handed to the sink.
    pub reports: u64,
    /// Refresh ticks on which no frame was due.
    pub skipped: u64,
}

/// Pulls frames one at a time on the blocking pool. The stream ends after the
/// source runs dry or after its first error.
fn frame_stream<S>(source: S) -> impl Stream<Item = Result<Frame, SourceError>>
where
    S: FrameSource + 'static,
{
    stream::unfold(Some(source), |state| async move {
        let Some(mut source) = state else {
            return None;
        };
        let pulled = tokio::task::spawn_blocking(move || {
            let next = source.next_frame();
            (source, next)
        })
        .await;
        match pulled {
            Ok((source, Ok(Some(frame)))) => Some((Ok(frame), Some(source))),
            Ok((_, Ok(None))) => None,
            Ok((_, Err(error))) => Some((Err(error), None)),
            Err(join) => Some((Err(SourceError::Unavailable(join.to_string())), None)),
        }
    })
}

/// Starts `pipeline` on `source` and drives it until the source is exhausted
/// or `stop` turns `true`.
pub async fn run<S, K>(
    pipeline: &mut VisionPipeline,
    mut source: S,
    sink: &mut K,
    stop: watch::Receiver<bool>,
) -> Result<RunSummary, VisionError>
where
    S: FrameSource + 'static,
    K: Sink + ?Sized,
{
    pipeline.start(&mut source)?;
    let result = drive(pipeline, source, sink, stop).await;
    pipeline.stop();
    match &result {
        Ok(summary) => info!(
            frames = summary.frames,
            reports = summary.reports,
            skipped = summary.skipped,
            "run finished"
        ),
        Err(error) => warn!(%error, "run aborted"),
    }
    result
}

async fn drive<S, K>(
    pipeline: &mut VisionPipeline,
    source: S,
    sink: &mut K,
    mut stop: watch::Receiver<bool>,
) -> Result<RunSummary, VisionError>
where
    S: FrameSource + 'static,
    K: Sink + ?Sized,
{
    let mut summary = RunSummary::default();
    let mut frames = Box::pin(frame_stream(source));
    let period = Duration::from_secs_f64(1.0 / pipeline.config().display.refresh_rate_hz);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stop_open = true;

    if *stop.borrow_and_update() {
        return Ok(summary);
    }

    loop {
        tokio::select! {
            changed = stop.changed(), if stop_open => {
                match changed {
                    Ok(()) if *stop.borrow_and_update() => break,
                    Ok(()) => {}
                    // Sender gone: nobody can ask us to stop any more.
                    Err(_) => stop_open = false,
                }
            }
            tick = interval.tick() => {
                let now = tick.into_std();
                if !pipeline.is_due(now) {
                    summary.skipped += 1;
                    continue;
                }
                let Some(frame) = frames.next().await else {
                    break;
                };
                let frame = frame?;
                let index = summary.frames;
                summary.frames += 1;

                match pipeline.tick(&frame, now)? {
                    Some(report) => {
                        sink.present(index, &frame, &report)?;
                        summary.reports += 1;
                    }
                    None => summary.skipped += 1,
                }
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisplayMode, TrackerConfig};
    use crate::pipeline::Report;
    use crate::source::MemorySource;

    #[derive(Default)]
    struct Recorder {
        presented: Vec<(u64, Report)>,
    }

    impl Sink for Recorder {
        fn present(&mut self, index: u64, _frame: &Frame, report: &Report) -> Result<(), crate::error::SinkError> {
            self.presented.push((index, report.clone()));
            Ok(())
        }
    }

    struct Failing;

    impl FrameSource for Failing {
        fn negotiate(&mut self) -> Result<crate::source::SourceInfo, SourceError> {
            Ok(crate::source::SourceInfo {
                width: 4,
                height: 4,
                frame_rate: 500.0,
            })
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            Err(SourceError::Unavailable("camera unplugged".into()))
        }
    }

    fn pipeline() -> VisionPipeline {
        let mut config = TrackerConfig::default();
        config.display.mode = DisplayMode::Camera;
        config.display.refresh_rate_hz = 1000.0;
        VisionPipeline::new(config).unwrap()
    }

    fn frames(count: u8) -> MemorySource {
        MemorySource::new((0..count).map(|value| Frame::filled(4, 4, [value, 0, 0, 255])), 500.0)
    }

    #[tokio::test]
    async fn runs_until_the_source_is_exhausted() {
        let mut pipeline = pipeline();
        let mut sink = Recorder::default();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let summary = run(&mut pipeline, frames(3), &mut sink, stop_rx).await.unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.reports, 3);
        let indices: Vec<u64> = sink.presented.iter().map(|(index, _)| *index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(sink.presented.iter().all(|(_, report)| *report == Report::Passthrough));
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn raised_stop_signal_ends_the_run_at_once() {
        let mut pipeline = pipeline();
        let mut sink = Recorder::default();
        let (_stop_tx, stop_rx) = watch::channel(true);

        let summary = run(&mut pipeline, frames(3), &mut sink, stop_rx).await.unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(sink.presented.is_empty());
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn dropped_stop_sender_does_not_stop_the_run() {
        let mut pipeline = pipeline();
        let mut sink = Recorder::default();
        let (stop_tx, stop_rx) = watch::channel(false);
        drop(stop_tx);

        let summary = run(&mut pipeline, frames(2), &mut sink, stop_rx).await.unwrap();

        assert_eq!(summary.reports, 2);
    }

    #[tokio::test]
    async fn source_errors_abort_and_stop_the_pipeline() {
        let mut pipeline = pipeline();
        let mut sink = Recorder::default();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = run(&mut pipeline, Failing, &mut sink, stop_rx).await;

        assert!(matches!(result, Err(VisionError::Source(SourceError::Unavailable(_)))));
        assert!(!pipeline.is_running());
    }
}
