//! Maps host playback and visibility notifications onto loop commands.

/// Playback state transitions reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Frame data is available for the first time.
    Loaded,
    Playing,
    Paused,
    Ended,
}

/// What the renderer should do in response to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Start,
    Stop,
    /// Size the surface from the frame and draw the first frame once.
    Layout,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackGate {
    loaded: bool,
    playing: bool,
    visible: bool,
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self {
            loaded: false,
            playing: false,
            visible: true,
        }
    }
}

impl PlaybackGate {
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn on_playback(&mut self, event: PlaybackEvent) -> LoopCommand {
        match event {
            PlaybackEvent::Loaded => {
                self.loaded = true;
                LoopCommand::Layout
            }
            PlaybackEvent::Playing => {
                self.playing = true;
                if self.visible {
                    LoopCommand::Start
                } else {
                    LoopCommand::Hold
                }
            }
            PlaybackEvent::Paused | PlaybackEvent::Ended => {
                self.playing = false;
                LoopCommand::Stop
            }
        }
    }

    pub fn on_visibility(&mut self, visible: bool) -> LoopCommand {
        self.visible = visible;
        match (visible, self.playing) {
            (false, _) => LoopCommand::Stop,
            (true, true) => LoopCommand::Start,
            (true, false) => LoopCommand::Hold,
        }
    }

    /// Container size changes only matter once frames have dimensions.
    pub fn accepts_layout(&self) -> bool {
        self.loaded
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_player_does_not_start_loop() {
        let mut gate = PlaybackGate::default();
        assert_eq!(gate.on_visibility(false), LoopCommand::Stop);
        assert_eq!(gate.on_playback(PlaybackEvent::Playing), LoopCommand::Hold);
        assert_eq!(gate.on_visibility(true), LoopCommand::Start);
    }

    #[test]
    fn paused_player_stays_stopped_when_shown() {
        let mut gate = PlaybackGate::default();
        gate.on_playback(PlaybackEvent::Playing);
        assert_eq!(gate.on_playback(PlaybackEvent::Paused), LoopCommand::Stop);
        assert_eq!(gate.on_visibility(true), LoopCommand::Hold);
    }

    #[test]
    fn layout_waits_for_load() {
        let mut gate = PlaybackGate::default();
        assert!(!gate.accepts_layout());
        assert_eq!(gate.on_playback(PlaybackEvent::Loaded), LoopCommand::Layout);
        assert!(gate.accepts_layout());
        gate.reset();
        assert!(!gate.accepts_layout());
    }

    #[test]
    fn ended_stops_loop() {
        let mut gate = PlaybackGate::default();
        gate.on_playback(PlaybackEvent::Playing);
        assert_eq!(gate.on_playback(PlaybackEvent::Ended), LoopCommand::Stop);
        assert!(!gate.is_playing());
    }
}
