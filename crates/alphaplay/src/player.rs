//! Steps through a directory of packed PNG frames on a wall-clock timer.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use image::RgbaImage;
use renderer::{FrameImage, FrameSource, PlaybackEvent};

/// Plays-per-start bookkeeping. `loops == 0` repeats forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoopCounter {
    loops: u32,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterEnd {
    Replay,
    Stop,
}

impl LoopCounter {
    fn new(loops: u32) -> Self {
        Self { loops, count: 1 }
    }

    fn on_ended(&mut self) -> AfterEnd {
        if self.loops == 0 {
            return AfterEnd::Replay;
        }
        if self.count < self.loops {
            self.count += 1;
            AfterEnd::Replay
        } else {
            self.count = 1;
            AfterEnd::Stop
        }
    }

    fn reset(&mut self) {
        self.count = 1;
    }
}

pub struct SequencePlayer {
    frames: Vec<PathBuf>,
    index: usize,
    current: Option<RgbaImage>,
    interval: Duration,
    next_advance: Option<Instant>,
    playing: bool,
    finished: bool,
    loops: LoopCounter,
}

impl SequencePlayer {
    /// Collects every `*.png` in `dir`, sorted by file name.
    pub fn open(dir: &Path, fps: f32, loops: u32) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?;
        let mut frames = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_png = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            if is_png && path.is_file() {
                frames.push(path);
            }
        }
        frames.sort();
        Self::from_paths(frames, fps, loops)
            .with_context(|| format!("failed to open sequence in {}", dir.display()))
    }

    pub fn from_paths(frames: Vec<PathBuf>, fps: f32, loops: u32) -> Result<Self> {
        if frames.is_empty() {
            bail!("no PNG frames found");
        }
        if !(fps.is_finite() && fps > 0.0) {
            bail!("playback rate must be greater than zero (got {fps})");
        }
        let first = load_frame(&frames[0])?;
        tracing::debug!(
            frames = frames.len(),
            fps,
            loops,
            width = first.width(),
            height = first.height(),
            "opened packed sequence"
        );
        Ok(Self {
            frames,
            index: 0,
            current: Some(first),
            interval: Duration::from_secs_f32(1.0 / fps),
            next_advance: None,
            playing: false,
            finished: false,
            loops: LoopCounter::new(loops),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When `tick` next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_advance
    }

    /// Starts playback; a finished sequence restarts from its first frame.
    pub fn play(&mut self, now: Instant) -> Option<PlaybackEvent> {
        if self.playing {
            return None;
        }
        if self.finished {
            self.seek(0);
            self.finished = false;
        }
        self.playing = true;
        self.next_advance = Some(now + self.interval);
        Some(PlaybackEvent::Playing)
    }

    pub fn pause(&mut self) -> Option<PlaybackEvent> {
        if !self.playing {
            return None;
        }
        self.playing = false;
        self.next_advance = None;
        Some(PlaybackEvent::Paused)
    }

    pub fn toggle(&mut self, now: Instant) -> Option<PlaybackEvent> {
        if self.playing {
            self.pause()
        } else {
            self.play(now)
        }
    }

    /// Pauses on the first frame and forgets completed loops.
    pub fn reset(&mut self) -> Option<PlaybackEvent> {
        let event = self.pause();
        self.loops.reset();
        self.finished = false;
        self.seek(0);
        event
    }

    /// Advances past every frame boundary up to `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        let mut steps = 0;
        while let Some(deadline) = self.next_advance {
            if !self.playing || deadline > now {
                break;
            }
            steps += 1;
            if self.index + 1 < self.frames.len() {
                self.index += 1;
                self.next_advance = Some(deadline + self.interval);
            } else {
                events.push(PlaybackEvent::Ended);
                match self.loops.on_ended() {
                    AfterEnd::Replay => {
                        self.index = 0;
                        self.next_advance = Some(deadline + self.interval);
                        events.push(PlaybackEvent::Playing);
                    }
                    AfterEnd::Stop => {
                        self.playing = false;
                        self.finished = true;
                        self.next_advance = None;
                    }
                }
            }
            if steps >= self.frames.len() {
                // Far behind the clock: resync instead of replaying the backlog.
                if self.playing {
                    self.next_advance = Some(now + self.interval);
                }
                break;
            }
        }
        if steps > 0 {
            self.load_current();
        }
        events
    }

    fn seek(&mut self, index: usize) {
        if self.index != index {
            self.index = index;
            self.load_current();
        }
    }

    fn load_current(&mut self) {
        match load_frame(&self.frames[self.index]) {
            Ok(image) => self.current = Some(image),
            Err(err) => {
                tracing::warn!(
                    frame = self.index,
                    error = %format!("{err:#}"),
                    "failed to decode frame; keeping previous frame"
                );
            }
        }
    }
}

impl FrameSource for SequencePlayer {
    fn current_frame(&self) -> Option<FrameImage<'_>> {
        self.current.as_ref().and_then(FrameSource::current_frame)
    }
}

fn load_frame(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgba8();
    Ok(image)
}

#[cfg(test)]
mod tests {
    use image::Rgba;
    use tempfile::TempDir;

    use super::*;

    fn write_frames(count: u8) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..count {
            let image = RgbaImage::from_pixel(4, 2, Rgba([i, 0, 0, 255]));
            image
                .save(dir.path().join(format!("frame_{i:03}.png")))
                .unwrap();
        }
        dir
    }

    fn marker(player: &SequencePlayer) -> u8 {
        player.current_frame().unwrap().texel(0, 0)[0]
    }

    #[test]
    fn loop_counter_follows_play_count() {
        let mut forever = LoopCounter::new(0);
        assert_eq!(forever.on_ended(), AfterEnd::Replay);
        assert_eq!(forever.on_ended(), AfterEnd::Replay);

        let mut twice = LoopCounter::new(2);
        assert_eq!(twice.on_ended(), AfterEnd::Replay);
        assert_eq!(twice.on_ended(), AfterEnd::Stop);
        assert_eq!(twice.on_ended(), AfterEnd::Replay);
    }

    #[test]
    fn opens_sorted_png_frames_only() {
        let dir = write_frames(3);
        fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();
        let player = SequencePlayer::open(dir.path(), 10.0, 0).unwrap();
        assert_eq!(player.len(), 3);
        assert_eq!(marker(&player), 0);
        assert!(!player.is_playing());
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SequencePlayer::open(dir.path(), 10.0, 0).is_err());
    }

    #[test]
    fn tick_advances_on_interval() {
        let dir = write_frames(3);
        let mut player = SequencePlayer::open(dir.path(), 10.0, 0).unwrap();
        let start = Instant::now();
        assert_eq!(player.play(start), Some(PlaybackEvent::Playing));
        assert!(player.tick(start).is_empty());
        assert_eq!(marker(&player), 0);

        assert!(player.tick(start + player.interval()).is_empty());
        assert_eq!(marker(&player), 1);
    }

    #[test]
    fn finite_loops_end_and_stop() {
        let dir = write_frames(2);
        let mut player = SequencePlayer::open(dir.path(), 10.0, 2).unwrap();
        let start = Instant::now();
        let step = player.interval();
        player.play(start);

        assert!(player.tick(start + step).is_empty());
        assert_eq!(
            player.tick(start + step * 2),
            vec![PlaybackEvent::Ended, PlaybackEvent::Playing]
        );
        assert_eq!(marker(&player), 0);
        assert!(player.tick(start + step * 3).is_empty());
        assert_eq!(player.tick(start + step * 4), vec![PlaybackEvent::Ended]);
        assert!(!player.is_playing());
        assert_eq!(player.next_deadline(), None);
        assert_eq!(marker(&player), 1);

        // Playing again starts over.
        player.play(start + step * 5);
        assert_eq!(marker(&player), 0);
    }

    #[test]
    fn reset_pauses_on_first_frame() {
        let dir = write_frames(3);
        let mut player = SequencePlayer::open(dir.path(), 10.0, 0).unwrap();
        let start = Instant::now();
        player.play(start);
        player.tick(start + player.interval());
        assert_eq!(marker(&player), 1);

        assert_eq!(player.reset(), Some(PlaybackEvent::Paused));
        assert_eq!(marker(&player), 0);
        assert_eq!(player.reset(), None);
    }

    #[test]
    fn toggle_alternates() {
        let dir = write_frames(1);
        let mut player = SequencePlayer::open(dir.path(), 10.0, 0).unwrap();
        let now = Instant::now();
        assert_eq!(player.toggle(now), Some(PlaybackEvent::Playing));
        assert_eq!(player.toggle(now), Some(PlaybackEvent::Paused));
        assert_eq!(player.next_deadline(), None);
    }
}
