//! Deterministic scripted tracking source
//!
//! Replays a pre-built timeline of found/lost/pose events with offsets
//! measured from `start()`. The demo shell runs it in a loop; the test
//! suite drives it with zero-offset events for deterministic replay.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{Pose, TargetId, TrackingError, TrackingEvent, TrackingSource};

/// Tracking source that replays a fixed timeline
pub struct ScriptedSource {
    target_file: PathBuf,
    timeline: Vec<(Duration, TrackingEvent)>,
    registered: HashSet<TargetId>,
    started_at: Option<Instant>,
    cursor: usize,
    looping: bool,
}

impl ScriptedSource {
    /// Create a source with an empty timeline
    pub fn new(target_file: impl Into<PathBuf>) -> Self {
        Self {
            target_file: target_file.into(),
            timeline: Vec::new(),
            registered: HashSet::new(),
            started_at: None,
            cursor: 0,
            looping: false,
        }
    }

    /// Append an event due at the given offset from `start()`
    ///
    /// Events with equal offsets replay in insertion order.
    pub fn push_event(&mut self, at: Duration, event: TrackingEvent) {
        self.timeline.push((at, event));
        self.timeline.sort_by_key(|(at, _)| *at);
    }

    /// Replay the timeline again once it is exhausted
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Build a looping source that walks each target through a
    /// found / drifting-pose / lost cycle
    pub fn demo_loop(target_file: impl Into<PathBuf>, targets: &[TargetId]) -> Self {
        let mut source = Self::new(target_file);
        source.looping = true;

        let mut at = Duration::from_secs(1);
        for &id in targets {
            source.push_event(at, TrackingEvent::Found(id));
            for step in 0u64..=60 {
                let t = step as f32 / 60.0;
                let pose = Pose {
                    position: glam::Vec3::new(
                        (t * std::f32::consts::TAU).sin() * 0.05,
                        (t * std::f32::consts::TAU).cos() * 0.02,
                        0.0,
                    ),
                    rotation: glam::Quat::IDENTITY,
                };
                source.push_event(at + Duration::from_millis(100 * step), TrackingEvent::Pose(id, pose));
            }
            at += Duration::from_secs(7);
            source.push_event(at, TrackingEvent::Lost(id));
            at += Duration::from_secs(1);
        }

        source
    }
}

impl TrackingSource for ScriptedSource {
    fn start(&mut self) -> Result<(), TrackingError> {
        if !self.target_file.exists() {
            return Err(TrackingError::TargetFileMissing(self.target_file.clone()));
        }

        self.started_at = Some(Instant::now());
        self.cursor = 0;
        tracing::debug!(
            target_file = %self.target_file.display(),
            events = self.timeline.len(),
            "Scripted tracking started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.started_at = None;
    }

    fn register_target(&mut self, id: TargetId) {
        self.registered.insert(id);
    }

    fn poll_events(&mut self) -> Vec<TrackingEvent> {
        let Some(started) = self.started_at else {
            return Vec::new();
        };
        let elapsed = started.elapsed();

        let mut events = Vec::new();
        while self.cursor < self.timeline.len() && self.timeline[self.cursor].0 <= elapsed {
            let (_, event) = self.timeline[self.cursor];
            self.cursor += 1;

            let id = match event {
                TrackingEvent::Found(id)
                | TrackingEvent::Lost(id)
                | TrackingEvent::Pose(id, _) => id,
            };
            if self.registered.contains(&id) {
                events.push(event);
            }
        }

        if self.looping && self.cursor >= self.timeline.len() && !self.timeline.is_empty() {
            self.cursor = 0;
            self.started_at = Some(Instant::now());
        }

        events
    }
}
