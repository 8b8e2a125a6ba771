use super::event::ListEvent;

/// Where the tracker is in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    NoFrameSeen,
    InFrame {
        frame_index: i64,
        frame_start_time: u64,
    },
}

/// A frame boundary, either read from the stream or synthesized by the forced trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBoundary {
    pub frame_index: i64,
    pub frame_start_time: u64,
    /// Time since the previous boundary (ps), None for the first frame of a run
    pub interval: Option<u64>,
    pub forced: bool,
}

/// What the tracker made of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The event was a frame marker and opened a new frame
    Marker(FrameBoundary),
    /// Any other event. time_since_frame is None until the first frame has been seen.
    /// `forced` is the boundary synthesized at this event when the gap was exceeded.
    Event {
        time_since_frame: Option<u64>,
        forced: Option<FrameBoundary>,
    },
}

/// FrameTracker follows the frame (trigger) boundaries embedded in the event stream.
///
/// Real events are annotated with the time since the start of their frame. An event
/// stamped earlier than its frame start is given a time of zero. Optionally a maximum
/// gap can be configured: the first event arriving at least that long after the frame
/// start opens a new frame itself, to tolerate a lost marker. One event opens at most one
/// frame however long the gap.
#[derive(Debug, Clone, Default)]
pub struct FrameTracker {
    state: FrameState,
    forced_gap: Option<u64>,
}

impl FrameTracker {
    pub fn new(forced_gap: Option<u64>) -> Self {
        Self {
            state: FrameState::NoFrameSeen,
            forced_gap: forced_gap.filter(|gap| *gap > 0),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Index of the current frame, -1 if no frame has been seen
    pub fn frame_index(&self) -> i64 {
        match self.state {
            FrameState::NoFrameSeen => -1,
            FrameState::InFrame { frame_index, .. } => frame_index,
        }
    }

    pub fn set_forced_gap(&mut self, forced_gap: Option<u64>) {
        self.forced_gap = forced_gap.filter(|gap| *gap > 0);
    }

    pub fn reset(&mut self) {
        self.state = FrameState::NoFrameSeen;
    }

    pub fn observe(&mut self, event: &ListEvent) -> Observation {
        if event.is_frame_marker() {
            return Observation::Marker(self.open_frame(event.trigger_time));
        }

        match self.state {
            FrameState::NoFrameSeen => Observation::Event {
                time_since_frame: None,
                forced: None,
            },
            FrameState::InFrame {
                frame_start_time, ..
            } => {
                let elapsed = event.trigger_time.saturating_sub(frame_start_time);
                match self.forced_gap {
                    Some(gap) if elapsed >= gap => {
                        let mut boundary = self.open_frame(event.trigger_time);
                        boundary.forced = true;
                        Observation::Event {
                            time_since_frame: Some(0),
                            forced: Some(boundary),
                        }
                    }
                    _ => Observation::Event {
                        time_since_frame: Some(elapsed),
                        forced: None,
                    },
                }
            }
        }
    }

    fn open_frame(&mut self, trigger_time: u64) -> FrameBoundary {
        let (frame_index, interval) = match self.state {
            FrameState::NoFrameSeen => (0, None),
            FrameState::InFrame {
                frame_index,
                frame_start_time,
            } => (
                frame_index + 1,
                Some(trigger_time.saturating_sub(frame_start_time)),
            ),
        };
        if frame_index == 0 {
            spdlog::debug!("First frame marker seen at {trigger_time} ps");
        }
        self.state = FrameState::InFrame {
            frame_index,
            frame_start_time: trigger_time,
        };
        FrameBoundary {
            frame_index,
            frame_start_time: trigger_time,
            interval,
            forced: false,
        }
    }
}
