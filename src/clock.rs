use std::time::Instant;

/// Time covered by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Wall time since the previous frame, clamped.
    pub seconds: f32,
    /// `seconds` in units of the target timestep; what the kernels integrate with.
    pub dt: f32,
}

/// Converts wall-clock frame times into solver timesteps.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    target_timestep: f32,
    max_frame_time: f32,
}

impl FrameClock {
    pub fn new(target_timestep: f32, max_frame_time: f32) -> Self {
        Self {
            last: None,
            target_timestep,
            max_frame_time,
        }
    }

    /// First call yields exactly one target timestep. Stalls are clamped to
    /// `max_frame_time`.
    pub fn tick(&mut self, now: Instant) -> FrameTick {
        let seconds = match self.last {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => self.target_timestep,
        };
        self.last = Some(now);
        self.tick_for(seconds)
    }

    pub fn tick_for(&self, seconds: f32) -> FrameTick {
        let seconds = seconds.clamp(0.0, self.max_frame_time);
        FrameTick {
            seconds,
            dt: seconds / self.target_timestep,
        }
    }
}
