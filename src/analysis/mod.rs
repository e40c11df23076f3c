//! Continuous per-frame analysis for sessions that run one.

mod face;

pub use face::{FaceAnalyzer, PositionListener};

use crate::capture::{Frame, FrameReceiver};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Consumes analysis frames while a session is active.
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    /// Called when a new analysis stream is bound.
    fn attach(&self) {}

    /// Called when the stream is torn down; later results must be ignored.
    fn detach(&self) {}

    /// Process one frame. The frame must be released on every path.
    async fn analyze(&self, frame: Frame, cancel: &CancellationToken);
}

/// Pull the latest frame, analyse it, repeat until cancelled.
pub async fn run_loop(
    analyzer: Arc<dyn FrameAnalyzer>,
    mut frames: FrameReceiver,
    cancel: CancellationToken,
) {
    tracing::debug!("Frame analysis loop started");
    let mut analysed = 0u64;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        analyzer.analyze(frame, &cancel).await;
        analysed += 1;

        if analysed % 30 == 0 {
            tracing::debug!(
                "Analysed {} frames, {} superseded before analysis",
                analysed,
                frames.dropped()
            );
        }
    }

    tracing::debug!("Frame analysis loop stopped after {} frames", analysed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::latest_frame_channel;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingAnalyzer {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl FrameAnalyzer for CountingAnalyzer {
        async fn analyze(&self, frame: Frame, _cancel: &CancellationToken) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            frame.release();
        }
    }

    #[tokio::test]
    async fn loop_stops_when_cancelled() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let (sink, receiver) = latest_frame_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(analyzer.clone(), receiver, cancel.clone()));

        sink.offer(Frame::new(RgbImage::new(2, 2)));
        tokio::time::timeout(Duration::from_secs(1), async {
            while analyzer.seen.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        // the receiver is gone with the loop
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn loop_ends_when_the_stream_closes() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let (sink, receiver) = latest_frame_channel();
        sink.close();
        tokio::time::timeout(
            Duration::from_secs(1),
            run_loop(analyzer.clone(), receiver, CancellationToken::new()),
        )
        .await
        .unwrap();
        assert_eq!(analyzer.seen.load(Ordering::SeqCst), 0);
    }
}
