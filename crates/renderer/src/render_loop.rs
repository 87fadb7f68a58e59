use scheduler::{FrameHandle, FrameScheduler};

/// Whether the render loop is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Stopped,
    Running,
}

/// Loop flag plus the one pending frame request.
///
/// Only the handle returned by the latest `schedule` is honoured; any other
/// handle that still fires (stale or cancelled) is rejected by `accept`.
#[derive(Debug, Default)]
pub struct RenderLoop {
    state: LoopState,
    pending: Option<FrameHandle>,
}

impl RenderLoop {
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    /// Stopped → Running. Returns `false` when already running.
    pub fn begin(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = LoopState::Running;
        true
    }

    /// Requests the next frame, replacing any pending request.
    pub fn schedule<S: FrameScheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(previous) = self.pending.take() {
            scheduler.cancel_scheduled_frame(previous);
        }
        let handle = scheduler.schedule_next_frame();
        tracing::trace!(handle = handle.id(), "scheduled next frame");
        self.pending = Some(handle);
    }

    /// Consumes a fired frame. Returns `true` when the loop should render.
    pub fn accept(&mut self, handle: FrameHandle) -> bool {
        if !self.is_running() || self.pending != Some(handle) {
            tracing::trace!(handle = handle.id(), "ignoring stale frame");
            return false;
        }
        self.pending = None;
        true
    }

    /// Running → Stopped, cancelling the pending request. Returns `false`
    /// when already stopped.
    pub fn stop<S: FrameScheduler + ?Sized>(&mut self, scheduler: &mut S) -> bool {
        if let Some(pending) = self.pending.take() {
            scheduler.cancel_scheduled_frame(pending);
        }
        if !self.is_running() {
            return false;
        }
        self.state = LoopState::Stopped;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler::ManualScheduler;

    #[test]
    fn begin_is_a_noop_when_running() {
        let mut render_loop = RenderLoop::default();
        assert!(render_loop.begin());
        assert!(!render_loop.begin());
        assert_eq!(render_loop.state(), LoopState::Running);
    }

    #[test]
    fn stop_cancels_pending_frame() {
        let mut scheduler = ManualScheduler::new();
        let mut render_loop = RenderLoop::default();
        render_loop.begin();
        render_loop.schedule(&mut scheduler);
        let handle = render_loop.pending().unwrap();

        assert!(render_loop.stop(&mut scheduler));
        assert!(!scheduler.is_pending(handle));
        assert!(!render_loop.accept(handle));
        assert!(!render_loop.stop(&mut scheduler));
    }

    #[test]
    fn only_latest_handle_is_accepted() {
        let mut scheduler = ManualScheduler::new();
        let mut render_loop = RenderLoop::default();
        render_loop.begin();
        render_loop.schedule(&mut scheduler);
        let first = render_loop.pending().unwrap();
        render_loop.schedule(&mut scheduler);
        let second = render_loop.pending().unwrap();

        assert_eq!(scheduler.pending_count(), 1);
        assert!(!render_loop.accept(first));
        assert!(render_loop.accept(second));
        assert!(render_loop.pending().is_none());
    }
}
