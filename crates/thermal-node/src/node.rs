//! The capture → crop → colorize → publish loop.

use crate::clock::StampClock;
use crate::msg::Image;
use crate::publisher::{ImageSink, PublishError};
use std::future::Future;
use std::time::Duration;
use thermal_hw::{apply_jet, crop_top_half, Frame, FrameError, FrameSource};
use thiserror::Error;
use tokio::time::MissedTickBehavior;

/// Why a captured frame did not reach the sink.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("crop failed: {0}")]
    Crop(FrameError),
    #[error("colormap failed: {0}")]
    Colormap(FrameError),
    #[error("message construction failed: {0}")]
    Wrap(FrameError),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// Outcome of a single timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Published,
    CaptureFailed,
    ProcessingFailed,
}

/// Running totals, one increment per cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub published: u64,
    pub capture_failures: u64,
    pub processing_failures: u64,
}

/// Owns the frame source exclusively and feeds one image per tick to the sink.
pub struct ThermalNode<S: FrameSource, P: ImageSink> {
    source: S,
    sink: P,
    frame_id: String,
    clock: StampClock,
    stats: CycleStats,
}

impl<S: FrameSource, P: ImageSink> ThermalNode<S, P> {
    pub fn new(source: S, sink: P, frame_id: impl Into<String>) -> Self {
        Self {
            source,
            sink,
            frame_id: frame_id.into(),
            clock: StampClock::new(),
            stats: CycleStats::default(),
        }
    }

    /// Run one capture cycle. Never panics on bad input; every failure is
    /// logged exactly once and counted.
    pub fn spin_once(&mut self) -> Cycle {
        let frame = match self.source.read() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "failed to capture frame from camera");
                self.stats.capture_failures += 1;
                return Cycle::CaptureFailed;
            }
        };

        let sequence = frame.sequence;
        match self.process(frame) {
            Ok(()) => {
                tracing::trace!(seq = sequence, "frame published");
                self.stats.published += 1;
                Cycle::Published
            }
            Err(e) => {
                tracing::error!(seq = sequence, error = %e, "error processing frame");
                self.stats.processing_failures += 1;
                Cycle::ProcessingFailed
            }
        }
    }

    fn process(&mut self, frame: Frame) -> Result<(), CycleError> {
        let cropped = crop_top_half(&frame).map_err(CycleError::Crop)?;
        let colored = apply_jet(&cropped).map_err(CycleError::Colormap)?;
        let image = Image::from_frame(colored, self.clock.now(), &self.frame_id)
            .map_err(CycleError::Wrap)?;
        self.sink.publish(image)?;
        Ok(())
    }

    /// Tick every `period` until `shutdown` resolves, then release the source.
    ///
    /// Each cycle runs to completion before the next tick is awaited, so
    /// cycles never overlap. Ticks missed while a capture was slow are
    /// skipped rather than replayed in a burst. Requires the multi-threaded
    /// runtime (captures block inside `block_in_place`).
    pub async fn spin_until<F>(&mut self, period: Duration, shutdown: F) -> CycleStats
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::task::block_in_place(|| self.spin_once());
                }
            }
        }

        self.shutdown();
        self.stats
    }

    /// Release the frame source. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.source.is_opened() {
            tracing::info!(
                published = self.stats.published,
                capture_failures = self.stats.capture_failures,
                processing_failures = self.stats.processing_failures,
                "releasing capture device"
            );
        }
        self.source.release();
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[cfg(test)]
    pub fn sink(&self) -> &P {
        &self.sink
    }
}

impl<S: FrameSource, P: ImageSink> Drop for ThermalNode<S, P> {
    fn drop(&mut self) {
        self.source.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::Time;
    use crate::publisher::{queue, QUEUE_DEPTH};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use thermal_hw::CameraError;

    /// Frame source that replays scripted reads, then yields good frames.
    struct ScriptedSource {
        script: VecDeque<Result<Frame, CameraError>>,
        width: u32,
        height: u32,
        opened: bool,
        releases: Rc<Cell<u32>>,
        reads: u32,
    }

    impl ScriptedSource {
        fn new(width: u32, height: u32) -> Self {
            Self {
                script: VecDeque::new(),
                width,
                height,
                opened: true,
                releases: Rc::new(Cell::new(0)),
                reads: 0,
            }
        }

        fn then(mut self, read: Result<Frame, CameraError>) -> Self {
            self.script.push_back(read);
            self
        }

        fn good_frame(&self) -> Frame {
            let data = (0..Frame::expected_len(self.width, self.height))
                .map(|i| (i % 256) as u8)
                .collect();
            Frame::new(data, self.width, self.height).unwrap()
        }
    }

    impl FrameSource for ScriptedSource {
        fn is_opened(&self) -> bool {
            self.opened
        }

        fn read(&mut self) -> Result<Frame, CameraError> {
            if !self.opened {
                return Err(CameraError::Released);
            }
            self.reads += 1;
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(self.good_frame()))
        }

        fn release(&mut self) {
            if !self.opened {
                return;
            }
            self.opened = false;
            self.releases.set(self.releases.get() + 1);
        }
    }

    #[derive(Default)]
    struct CollectSink {
        images: RefCell<Vec<Image>>,
    }

    impl ImageSink for CollectSink {
        fn publish(&self, image: Image) -> Result<(), PublishError> {
            self.images.borrow_mut().push(image);
            Ok(())
        }
    }

    fn malformed_frame() -> Frame {
        Frame {
            data: vec![0u8; 17],
            width: 256,
            height: 384,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_published_image_shape() {
        let mut node = ThermalNode::new(
            ScriptedSource::new(256, 384),
            CollectSink::default(),
            "thermal_link",
        );
        assert_eq!(node.spin_once(), Cycle::Published);

        let images = node.sink().images.borrow();
        assert_eq!(images.len(), 1);
        let image = &images[0];
        assert_eq!(image.height, 192);
        assert_eq!(image.width, 256);
        assert_eq!(image.step, 256 * 3);
        assert_eq!(image.data.len(), 256 * 192 * 3);
        assert_eq!(image.encoding, "bgr8");
        assert_eq!(image.header.frame_id, "thermal_link");
    }

    #[test]
    fn test_odd_height_floors() {
        let mut node = ThermalNode::new(ScriptedSource::new(5, 7), CollectSink::default(), "f");
        assert_eq!(node.spin_once(), Cycle::Published);
        let images = node.sink().images.borrow();
        assert_eq!(images[0].height, 3);
        assert_eq!(images[0].width, 5);
    }

    #[test]
    fn test_frame_id_on_every_message() {
        let mut node = ThermalNode::new(
            ScriptedSource::new(4, 4),
            CollectSink::default(),
            "lwir_optical",
        );
        for _ in 0..5 {
            node.spin_once();
        }
        let images = node.sink().images.borrow();
        assert_eq!(images.len(), 5);
        assert!(images.iter().all(|i| i.header.frame_id == "lwir_optical"));
    }

    #[test]
    fn test_stamps_non_decreasing() {
        let mut node = ThermalNode::new(ScriptedSource::new(4, 4), CollectSink::default(), "f");
        for _ in 0..20 {
            node.spin_once();
        }
        let images = node.sink().images.borrow();
        let stamps: Vec<Time> = images.iter().map(|i| i.header.stamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_capture_failure_skips_cycle() {
        let source = ScriptedSource::new(4, 4)
            .then(Err(CameraError::CaptureFailed("no frame".into())));
        let mut node = ThermalNode::new(source, CollectSink::default(), "f");

        assert_eq!(node.spin_once(), Cycle::CaptureFailed);
        assert!(node.sink().images.borrow().is_empty());
        assert_eq!(
            node.stats(),
            CycleStats {
                published: 0,
                capture_failures: 1,
                processing_failures: 0,
            }
        );

        assert_eq!(node.spin_once(), Cycle::Published);
        assert_eq!(node.sink().images.borrow().len(), 1);
    }

    #[test]
    fn test_malformed_buffer_then_recovery() {
        let source = ScriptedSource::new(256, 384).then(Ok(malformed_frame()));
        let mut node = ThermalNode::new(source, CollectSink::default(), "f");

        assert_eq!(node.spin_once(), Cycle::ProcessingFailed);
        assert!(node.sink().images.borrow().is_empty());
        assert_eq!(node.stats().processing_failures, 1);
        assert_eq!(node.stats().capture_failures, 0);

        assert_eq!(node.spin_once(), Cycle::Published);
        assert_eq!(node.sink().images.borrow().len(), 1);
        assert_eq!(node.stats().processing_failures, 1);
    }

    #[test]
    fn test_full_queue_is_processing_failure() {
        let (sink, _rx) = queue(QUEUE_DEPTH);
        let mut node = ThermalNode::new(ScriptedSource::new(4, 4), sink, "f");
        for _ in 0..QUEUE_DEPTH {
            assert_eq!(node.spin_once(), Cycle::Published);
        }
        assert_eq!(node.spin_once(), Cycle::ProcessingFailed);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut node = ThermalNode::new(ScriptedSource::new(4, 4), CollectSink::default(), "f");
        node.shutdown();
        node.shutdown();
        assert!(!node.source().is_opened());
        assert_eq!(node.source().releases.get(), 1);
        // Reads after release fail as captures, they do not panic.
        assert_eq!(node.spin_once(), Cycle::CaptureFailed);
    }

    #[test]
    fn test_drop_releases_source() {
        let source = ScriptedSource::new(4, 4);
        let releases = Rc::clone(&source.releases);
        let node = ThermalNode::new(source, CollectSink::default(), "f");
        drop(node);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_drop_after_shutdown_does_not_release_twice() {
        let source = ScriptedSource::new(4, 4);
        let releases = Rc::clone(&source.releases);
        let mut node = ThermalNode::new(source, CollectSink::default(), "f");
        node.shutdown();
        drop(node);
        assert_eq!(releases.get(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spin_until_publishes_and_releases() {
        let mut node = ThermalNode::new(
            ScriptedSource::new(8, 8),
            CollectSink::default(),
            "thermal_link",
        );
        let stats = node
            .spin_until(
                Duration::from_millis(5),
                tokio::time::sleep(Duration::from_millis(60)),
            )
            .await;

        assert!(stats.published >= 2, "published {}", stats.published);
        assert_eq!(stats.capture_failures, 0);
        assert_eq!(node.sink().images.borrow().len() as u64, stats.published);
        assert!(!node.source().is_opened());
        assert_eq!(node.source().releases.get(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spin_survives_failures() {
        let source = ScriptedSource::new(4, 4)
            .then(Err(CameraError::CaptureFailed("hiccup".into())))
            .then(Ok(malformed_frame()));
        let mut node = ThermalNode::new(source, CollectSink::default(), "f");
        let stats = node
            .spin_until(
                Duration::from_millis(5),
                tokio::time::sleep(Duration::from_millis(60)),
            )
            .await;

        assert_eq!(stats.capture_failures, 1);
        assert_eq!(stats.processing_failures, 1);
        assert!(stats.published >= 1);
        assert_eq!(
            node.source().reads as u64,
            stats.published + stats.capture_failures + stats.processing_failures
        );
    }
}
