use std::{collections::VecDeque, time::Instant};

const DEFAULT_WINDOW: usize = 30;

/// Frame rate measured over the last frames of a stream.
///
/// ```
/// use camcal_io::fps_counter::FpsCounter;
///
/// let mut counter = FpsCounter::new();
/// for _ in 0..100 {
///     counter.record();
/// }
/// assert_eq!(counter.frame_count(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct FpsCounter {
    stamps: VecDeque<Instant>,
    window: usize,
    frames: u64,
}

impl FpsCounter {
    /// A counter averaging over the last 30 frames.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// A counter averaging over the last `window` frames, at least two.
    pub fn with_window(window: usize) -> Self {
        let window = window.max(2);
        Self {
            stamps: VecDeque::with_capacity(window),
            window,
            frames: 0,
        }
    }

    /// Frames per second over the window, zero until two frames are seen.
    pub fn fps(&self) -> f32 {
        let (Some(first), Some(last)) = (self.stamps.front(), self.stamps.back()) else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first).as_secs_f32();
        if span <= 0.0 {
            return 0.0;
        }
        (self.stamps.len() - 1) as f32 / span
    }

    /// Frames seen since creation.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Count a frame arriving now.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Count a frame arriving at `at`.
    pub fn record_at(&mut self, at: Instant) {
        if self.stamps.len() == self.window {
            self.stamps.pop_front();
        }
        self.stamps.push_back(at);
        self.frames += 1;
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}
