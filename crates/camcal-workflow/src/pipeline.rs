//! The acquisition thread: grabs frames at a fixed cadence, samples chessboards, undistorts,
//! draws the overlays and hands the results to the controller.
//!
//! The controller publishes immutable [`SessionSnapshot`]s tagged with an epoch that grows on
//! every stage transition. Everything the thread produces carries the epoch of the snapshot it
//! was computed under, so the controller can drop results of a previous stage.

use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use camcal_image::{Image, ImageSize};
use camcal_imgproc::{
    chessboard::PatternSize,
    draw::{draw_chessboard_corners, draw_circle},
};
use camcal_io::{fps_counter::FpsCounter, FrameSource, FrameSourceError};

use crate::{
    sampler::{CornerSampler, SampleAttempt},
    session::{IntrinsicModel, Stage},
    vision::{VisionBackend, VisionError},
};

/// Color of the picked pixel.
pub const PREVIEW_COLOR: [u8; 3] = [0, 0, 255];
/// Color of the projected test point.
pub const MARK_COLOR: [u8; 3] = [0, 255, 0];
/// Color of the recorded correspondences.
pub const RECORDED_COLOR: [u8; 3] = [255, 0, 0];

const OVERLAY_RADIUS: usize = 5;
const OVERLAY_THICKNESS: usize = 2;

/// Points drawn over the raw frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    /// The picked pixel.
    pub preview: Option<[f64; 2]>,
    /// The projected test point.
    pub mark: Option<[f64; 2]>,
    /// Pixels of the recorded correspondences.
    pub recorded: Vec<[f64; 2]>,
}

/// What the acquisition thread needs to know about the session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Transition counter of the session.
    pub epoch: u64,
    /// The current stage.
    pub stage: Stage,
    /// The searched chessboard while detecting.
    pub pattern: Option<PatternSize>,
    /// The camera model while undistorting.
    pub model: Option<IntrinsicModel>,
    /// Points drawn over the raw frames.
    pub overlay: Overlay,
}

/// Messages from the controller to the acquisition thread.
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Replace the session snapshot.
    Snapshot(Arc<SessionSnapshot>),
    /// Release the source and exit.
    Stop,
}

/// The frames produced by one tick.
#[derive(Debug, Clone)]
pub struct FramePacket {
    /// Epoch of the snapshot the frame was processed under.
    pub epoch: u64,
    /// Stage of that snapshot.
    pub stage: Stage,
    /// The grabbed frame with the overlays.
    pub raw: Arc<Image<u8, 3>>,
    /// Detected corners or the undistorted frame, depending on the stage.
    pub processed: Option<Arc<Image<u8, 3>>>,
}

/// Notifications from the acquisition thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A chessboard was found while detecting.
    CornersFound {
        /// Epoch of the snapshot the frame was processed under.
        epoch: u64,
        /// The refined corners, row-major.
        corners: Vec<[f64; 2]>,
        /// Resolution of the frame.
        image_size: ImageSize,
    },
    /// A tick failed and was skipped.
    TickFault {
        /// Epoch of the snapshot the tick ran under.
        epoch: u64,
        /// What went wrong.
        message: String,
    },
    /// The source is released and the thread exits.
    Stopped,
}

/// Latest-value handoff of frame packets; a new packet replaces an unread one.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<FramePacket>>,
}

impl FrameSlot {
    /// Store a packet, replacing the previous one.
    pub fn put(&self, packet: FramePacket) {
        let mut latest = self.latest.lock().unwrap_or_else(|p| p.into_inner());
        *latest = Some(packet);
    }

    /// Take the latest packet, if any.
    pub fn take(&self) -> Option<FramePacket> {
        self.latest.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// Timing of the acquisition thread.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Period of the acquisition loop.
    pub period: Duration,
    /// Pause between two detection attempts.
    pub cooldown: Duration,
}

#[derive(Debug, thiserror::Error)]
enum TickError {
    #[error(transparent)]
    Source(#[from] FrameSourceError),
    #[error(transparent)]
    Vision(#[from] VisionError),
}

/// Draw the overlay points onto a frame.
pub fn draw_overlay(frame: &mut Image<u8, 3>, overlay: &Overlay) {
    let center = |p: &[f64; 2]| (p[0].round() as i64, p[1].round() as i64);
    for p in &overlay.recorded {
        draw_circle(frame, center(p), OVERLAY_RADIUS, RECORDED_COLOR, OVERLAY_THICKNESS);
    }
    if let Some(p) = &overlay.preview {
        draw_circle(frame, center(p), OVERLAY_RADIUS, PREVIEW_COLOR, OVERLAY_THICKNESS);
    }
    if let Some(p) = &overlay.mark {
        draw_circle(frame, center(p), OVERLAY_RADIUS, MARK_COLOR, OVERLAY_THICKNESS);
    }
}

fn sampler_for(snapshot: &SessionSnapshot, cooldown: Duration) -> Option<CornerSampler> {
    match (snapshot.stage, snapshot.pattern) {
        (Stage::Detecting, Some(pattern)) => Some(CornerSampler::new(pattern, cooldown)),
        _ => None,
    }
}

struct Acquisition {
    source: Box<dyn FrameSource>,
    vision: Arc<dyn VisionBackend>,
    snapshot: Arc<SessionSnapshot>,
    sampler: Option<CornerSampler>,
    settings: PipelineSettings,
    slot: Arc<FrameSlot>,
    events: Sender<PipelineEvent>,
    fps: FpsCounter,
}

impl Acquisition {
    fn apply(&mut self, snapshot: Arc<SessionSnapshot>) {
        if snapshot.epoch != self.snapshot.epoch {
            // a new stage starts with an open cooldown gate
            self.sampler = sampler_for(&snapshot, self.settings.cooldown);
        }
        self.snapshot = snapshot;
    }

    fn run(mut self, commands: Receiver<PipelineCommand>) {
        let period = self.settings.period;
        let mut next_tick = Instant::now();

        loop {
            let now = Instant::now();
            if now >= next_tick {
                if let Err(err) = self.tick() {
                    log::warn!("acquisition tick skipped: {err}");
                    let _ = self.events.send(PipelineEvent::TickFault {
                        epoch: self.snapshot.epoch,
                        message: err.to_string(),
                    });
                }
                next_tick += period;
                let now = Instant::now();
                if next_tick < now {
                    // running late, do not try to catch up
                    next_tick = now + period;
                }
                continue;
            }

            match commands.recv_timeout(next_tick - now) {
                Ok(PipelineCommand::Snapshot(snapshot)) => self.apply(snapshot),
                Ok(PipelineCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        self.source.release();
        log::info!("released {}", self.source.name());
        let _ = self.events.send(PipelineEvent::Stopped);
    }

    fn tick(&mut self) -> Result<(), TickError> {
        let Some(frame) = self.source.grab()? else {
            return Ok(());
        };

        self.fps.record();
        if self.fps.frame_count() % 100 == 0 {
            log::debug!("acquisition running at {:.1} fps", self.fps.fps());
        }

        let snapshot = Arc::clone(&self.snapshot);
        let mut processed = None;

        match snapshot.stage {
            Stage::Detecting => {
                if let Some(sampler) = self.sampler.as_mut() {
                    match sampler.sample(self.vision.as_ref(), &frame, Instant::now())? {
                        SampleAttempt::Found(corners) => {
                            let mut annotated = frame.clone();
                            draw_chessboard_corners(
                                &mut annotated,
                                &corners,
                                sampler.pattern().cols,
                            );
                            processed = Some(Arc::new(annotated));
                            let _ = self.events.send(PipelineEvent::CornersFound {
                                epoch: snapshot.epoch,
                                corners,
                                image_size: frame.size(),
                            });
                        }
                        SampleAttempt::NotFound => log::debug!("no chessboard in the frame"),
                        SampleAttempt::CoolingDown => {}
                    }
                }
            }
            Stage::Undistorting => {
                if let Some(model) = snapshot.model.as_ref() {
                    processed = Some(Arc::new(self.vision.undistort(&frame, model)?));
                }
            }
            _ => {}
        }

        let mut raw = frame;
        draw_overlay(&mut raw, &snapshot.overlay);

        self.slot.put(FramePacket {
            epoch: snapshot.epoch,
            stage: snapshot.stage,
            raw: Arc::new(raw),
            processed,
        });
        Ok(())
    }
}

/// Handle of the acquisition thread.
pub struct FramePipeline {
    commands: Sender<PipelineCommand>,
    events: Receiver<PipelineEvent>,
    slot: Arc<FrameSlot>,
    handle: Option<JoinHandle<()>>,
}

impl FramePipeline {
    /// Start the acquisition thread on an opened source.
    pub fn spawn(
        source: Box<dyn FrameSource>,
        vision: Arc<dyn VisionBackend>,
        snapshot: Arc<SessionSnapshot>,
        settings: PipelineSettings,
    ) -> Result<Self, std::io::Error> {
        let (commands, command_rx) = mpsc::channel();
        let (event_tx, events) = mpsc::channel();
        let slot = Arc::new(FrameSlot::default());

        let acquisition = Acquisition {
            source,
            vision,
            sampler: sampler_for(&snapshot, settings.cooldown),
            snapshot,
            settings,
            slot: Arc::clone(&slot),
            events: event_tx,
            fps: FpsCounter::new(),
        };
        let handle = std::thread::Builder::new()
            .name("camcal-acquisition".to_string())
            .spawn(move || acquisition.run(command_rx))?;

        Ok(Self {
            commands,
            events,
            slot,
            handle: Some(handle),
        })
    }

    /// Send a new session snapshot to the thread.
    pub fn publish(&self, snapshot: Arc<SessionSnapshot>) {
        if self.commands.send(PipelineCommand::Snapshot(snapshot)).is_err() {
            log::warn!("the acquisition thread has exited");
        }
    }

    /// Take the latest frame packet.
    pub fn take_frame(&self) -> Option<FramePacket> {
        self.slot.take()
    }

    /// Drain the pending events.
    pub fn drain_events(&self) -> Vec<PipelineEvent> {
        self.events.try_iter().collect()
    }

    /// Whether the thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread, waiting at most `wait` for it to release the source.
    ///
    /// Returns `false` when the thread did not confirm in time; it is then detached and
    /// releases the source once its current tick ends.
    pub fn stop(mut self, wait: Duration) -> bool {
        let _ = self.commands.send(PipelineCommand::Stop);
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(PipelineEvent::Stopped) | Err(RecvTimeoutError::Disconnected) => {
                    if let Some(handle) = self.handle.take() {
                        if handle.join().is_err() {
                            log::warn!("the acquisition thread panicked");
                        }
                    }
                    return true;
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("acquisition did not stop within {wait:?}, detaching it");
                    self.handle.take();
                    return false;
                }
            }
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        let _ = self.commands.send(PipelineCommand::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_keeps_latest() -> Result<(), camcal_image::ImageError> {
        let slot = FrameSlot::default();
        assert!(slot.take().is_none());

        let frame = Arc::new(Image::<u8, 3>::from_size_val([4, 4].into(), 0)?);
        for epoch in 0..3 {
            slot.put(FramePacket {
                epoch,
                stage: Stage::Started,
                raw: Arc::clone(&frame),
                processed: None,
            });
        }
        assert_eq!(slot.take().map(|p| p.epoch), Some(2));
        assert!(slot.take().is_none());
        Ok(())
    }

    #[test]
    fn test_overlay_colors() -> Result<(), camcal_image::ImageError> {
        let mut frame = Image::<u8, 3>::from_size_val([40, 40].into(), 0)?;
        let overlay = Overlay {
            preview: Some([10.0, 10.0]),
            mark: Some([30.0, 10.0]),
            recorded: vec![[10.0, 30.0]],
        };
        draw_overlay(&mut frame, &overlay);

        // the rightmost pixel of each ring
        assert_eq!(frame.get_pixel(15, 10)?, &PREVIEW_COLOR);
        assert_eq!(frame.get_pixel(35, 10)?, &MARK_COLOR);
        assert_eq!(frame.get_pixel(15, 30)?, &RECORDED_COLOR);
        // centres stay untouched
        assert_eq!(frame.get_pixel(10, 10)?, &[0, 0, 0]);
        Ok(())
    }
}
