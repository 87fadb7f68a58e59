//! Frame scheduling primitives for the render loop.
//!
//! The renderer never owns a display callback directly. It asks a
//! [`FrameScheduler`] for the next frame and receives a [`FrameHandle`]; the
//! host later hands that handle back when the frame fires. Cancelling a
//! handle guarantees the host will not deliver it again.
//!
//! - [`PacedScheduler`] keeps a single pending frame and a deadline. Hosts
//!   poll it from their event loop (`due` / `next_deadline`). Without a rate
//!   cap every frame is due immediately and presentation pacing (vsync)
//!   throttles the loop.
//! - [`ManualScheduler`] queues every request and fires them only when asked,
//!   which lets tests step the loop deterministically.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Opaque identifier for one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

impl FrameHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Source of "run on the next frame" callbacks.
pub trait FrameScheduler {
    /// Requests a callback for the next frame.
    fn schedule_next_frame(&mut self) -> FrameHandle;
    /// Cancels a request that has not fired yet. Unknown handles are ignored.
    fn cancel_scheduled_frame(&mut self, handle: FrameHandle);
}

impl<S: FrameScheduler + ?Sized> FrameScheduler for Box<S> {
    fn schedule_next_frame(&mut self) -> FrameHandle {
        (**self).schedule_next_frame()
    }

    fn cancel_scheduled_frame(&mut self, handle: FrameHandle) {
        (**self).cancel_scheduled_frame(handle)
    }
}

#[derive(Debug, Default)]
struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    fn allocate(&mut self) -> FrameHandle {
        self.next = self.next.wrapping_add(1);
        FrameHandle(self.next)
    }
}

fn normalize_fps(value: Option<f32>) -> Option<f32> {
    value.and_then(|fps| {
        if fps.is_finite() && fps > 0.0 {
            Some(fps)
        } else {
            None
        }
    })
}

/// Deadline-driven scheduler with an optional frame-rate cap.
#[derive(Debug)]
pub struct PacedScheduler {
    handles: HandleAllocator,
    interval: Option<Duration>,
    pending: Option<PendingFrame>,
    last_fired: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct PendingFrame {
    handle: FrameHandle,
    deadline: Instant,
}

impl PacedScheduler {
    /// Creates a scheduler; `None` or a non-positive rate means "every refresh".
    pub fn new(target_fps: Option<f32>) -> Self {
        let mut scheduler = Self {
            handles: HandleAllocator::default(),
            interval: None,
            pending: None,
            last_fired: None,
        };
        scheduler.set_target_fps(target_fps);
        scheduler
    }

    pub fn set_target_fps(&mut self, target_fps: Option<f32>) {
        self.interval = normalize_fps(target_fps).map(|fps| Duration::from_secs_f32(1.0 / fps));
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Schedules a frame relative to `now`.
    pub fn schedule_at(&mut self, now: Instant) -> FrameHandle {
        let handle = self.handles.allocate();
        let deadline = match (self.interval, self.last_fired) {
            (Some(interval), Some(last)) => (last + interval).max(now),
            _ => now,
        };
        if let Some(previous) = self.pending.replace(PendingFrame { handle, deadline }) {
            tracing::trace!(
                replaced = previous.handle.id(),
                handle = handle.id(),
                "scheduler: replacing pending frame"
            );
        }
        handle
    }

    /// Takes the pending frame if its deadline has passed.
    pub fn due(&mut self, now: Instant) -> Option<FrameHandle> {
        let pending = self.pending?;
        if now < pending.deadline {
            return None;
        }
        self.pending = None;
        self.last_fired = Some(now);
        Some(pending.handle)
    }

    /// Deadline of the pending frame, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.deadline)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forgets pacing history so the next frame is due immediately.
    pub fn reset(&mut self) {
        self.last_fired = None;
        if let Some(pending) = self.pending.as_mut() {
            pending.deadline = Instant::now();
        }
    }
}

impl Default for PacedScheduler {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FrameScheduler for PacedScheduler {
    fn schedule_next_frame(&mut self) -> FrameHandle {
        self.schedule_at(Instant::now())
    }

    fn cancel_scheduled_frame(&mut self, handle: FrameHandle) {
        if self.pending.is_some_and(|pending| pending.handle == handle) {
            self.pending = None;
        }
    }
}

/// Scheduler that only fires when told to.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    handles: HandleAllocator,
    pending: VecDeque<FrameHandle>,
    scheduled: usize,
    cancelled: usize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops the oldest pending request, as if its frame had fired.
    pub fn fire_next(&mut self) -> Option<FrameHandle> {
        self.pending.pop_front()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, handle: FrameHandle) -> bool {
        self.pending.contains(&handle)
    }

    /// Total number of requests ever made.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn schedule_next_frame(&mut self) -> FrameHandle {
        let handle = self.handles.allocate();
        self.pending.push_back(handle);
        self.scheduled += 1;
        handle
    }

    fn cancel_scheduled_frame(&mut self, handle: FrameHandle) {
        let before = self.pending.len();
        self.pending.retain(|pending| *pending != handle);
        if self.pending.len() != before {
            self.cancelled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_frames_are_due_immediately() {
        let mut scheduler = PacedScheduler::new(None);
        let now = Instant::now();
        let handle = scheduler.schedule_at(now);
        assert_eq!(scheduler.next_deadline(), Some(now));
        assert_eq!(scheduler.due(now), Some(handle));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn capped_frames_wait_for_interval() {
        let mut scheduler = PacedScheduler::new(Some(10.0));
        let start = Instant::now();
        let first = scheduler.schedule_at(start);
        assert_eq!(scheduler.due(start), Some(first));

        let second = scheduler.schedule_at(start);
        assert_eq!(scheduler.due(start + Duration::from_millis(50)), None);
        assert_eq!(
            scheduler.due(start + Duration::from_millis(100)),
            Some(second)
        );
    }

    #[test]
    fn zero_fps_treated_as_uncapped() {
        let scheduler = PacedScheduler::new(Some(0.0));
        assert_eq!(scheduler.interval(), None, "fps=0 should map to uncapped");
        let scheduler = PacedScheduler::new(Some(f32::NAN));
        assert_eq!(scheduler.interval(), None);
    }

    #[test]
    fn cancelled_frame_never_fires() {
        let mut scheduler = PacedScheduler::new(None);
        let now = Instant::now();
        let handle = scheduler.schedule_at(now);
        scheduler.cancel_scheduled_frame(handle);
        assert_eq!(scheduler.due(now), None);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn cancelling_stale_handle_keeps_pending_frame() {
        let mut scheduler = PacedScheduler::new(None);
        let now = Instant::now();
        let stale = scheduler.schedule_at(now);
        let current = scheduler.schedule_at(now);
        scheduler.cancel_scheduled_frame(stale);
        assert_eq!(scheduler.due(now), Some(current));
    }

    #[test]
    fn manual_scheduler_fires_in_submission_order() {
        let mut scheduler = ManualScheduler::new();
        let first = scheduler.schedule_next_frame();
        let second = scheduler.schedule_next_frame();
        assert_eq!(scheduler.pending_count(), 2);
        assert_eq!(scheduler.fire_next(), Some(first));
        assert_eq!(scheduler.fire_next(), Some(second));
        assert_eq!(scheduler.fire_next(), None);
        assert_eq!(scheduler.scheduled_count(), 2);
    }

    #[test]
    fn manual_cancel_counts_only_known_handles() {
        let mut scheduler = ManualScheduler::new();
        let handle = scheduler.schedule_next_frame();
        scheduler.cancel_scheduled_frame(handle);
        scheduler.cancel_scheduled_frame(handle);
        assert_eq!(scheduler.cancelled_count(), 1);
        assert!(!scheduler.is_pending(handle));
    }
}
