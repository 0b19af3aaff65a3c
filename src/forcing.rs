//! Everything that injects force and colour. Pointer input, the ambient timer and
//! the ribbon script all reduce to [`Splat`]s, each of which becomes one velocity
//! splat and one dye splat.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Radial injection at a normalized point. `force` is in velocity units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Splat {
    pub point: [f32; 2],
    pub force: [f32; 2],
    pub color: [f32; 3],
}

/// Per-pointer input state. Positions are normalized with `y` pointing up.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingEvent {
    pub id: u64,
    pub position: [f32; 2],
    pub prev_position: [f32; 2],
    pub delta: [f32; 2],
    pub down: bool,
    pub moved: bool,
    pub color: [f32; 3],
}

impl ForcingEvent {
    fn new(id: u64, position: [f32; 2], color: [f32; 3]) -> Self {
        Self {
            id,
            position,
            prev_position: position,
            delta: [0.0, 0.0],
            down: false,
            moved: false,
            color,
        }
    }
}

#[derive(Debug, Default)]
pub struct PointerTracker {
    pointers: Vec<ForcingEvent>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointers(&self) -> &[ForcingEvent] {
        &self.pointers
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut ForcingEvent> {
        self.pointers.iter_mut().find(|p| p.id == id)
    }

    pub fn press(&mut self, id: u64, position: [f32; 2], color: [f32; 3]) {
        let pointer = match self.pointers.iter().position(|p| p.id == id) {
            Some(i) => &mut self.pointers[i],
            None => {
                self.pointers.push(ForcingEvent::new(id, position, color));
                let last = self.pointers.len() - 1;
                &mut self.pointers[last]
            }
        };
        pointer.position = position;
        pointer.prev_position = position;
        pointer.delta = [0.0, 0.0];
        pointer.down = true;
        pointer.moved = false;
        pointer.color = color;
    }

    /// Motion only counts while the pointer is down.
    pub fn move_to(&mut self, id: u64, position: [f32; 2]) {
        let Some(pointer) = self.get_mut(id) else {
            return;
        };
        pointer.prev_position = pointer.position;
        pointer.position = position;
        if pointer.down {
            pointer.delta = [
                position[0] - pointer.prev_position[0],
                position[1] - pointer.prev_position[1],
            ];
            pointer.moved |= pointer.delta != [0.0, 0.0];
        }
    }

    pub fn release(&mut self, id: u64) {
        if let Some(pointer) = self.get_mut(id) {
            pointer.down = false;
        }
    }

    /// One splat per pointer that moved while down since the last drain.
    /// The x force is scaled by the surface aspect ratio.
    pub fn drain(&mut self, splat_force: f32, aspect: f32) -> Vec<Splat> {
        let mut splats = Vec::new();
        for pointer in self.pointers.iter_mut().filter(|p| p.moved) {
            pointer.moved = false;
            splats.push(Splat {
                point: pointer.position,
                force: [
                    pointer.delta[0] * aspect * splat_force,
                    pointer.delta[1] * splat_force,
                ],
                color: pointer.color,
            });
        }
        splats
    }

    pub fn discard_motion(&mut self) {
        for pointer in &mut self.pointers {
            pointer.moved = false;
        }
    }
}

pub trait Palette {
    fn next_color(&mut self) -> [f32; 3];
}

/// Fully saturated random hues scaled by `intensity`.
pub struct HuePalette {
    rng: StdRng,
    intensity: f32,
}

impl HuePalette {
    pub fn new(seed: u64, intensity: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            intensity,
        }
    }
}

impl Palette for HuePalette {
    fn next_color(&mut self) -> [f32; 3] {
        let [r, g, b] = hsv_to_rgb(self.rng.gen_range(0.0..1.0), 1.0, 1.0);
        [r * self.intensity, g * self.intensity, b * self.intensity]
    }
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = h6.floor() as u32 % 6;
    let f = h6 - h6.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    match sector {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Random bursts on a fixed timer of running time.
pub struct AmbientEmitter {
    count: u32,
    interval: f32,
    force: f32,
    elapsed: f32,
    rng: StdRng,
}

impl AmbientEmitter {
    pub fn new(count: u32, interval: f32, force: f32, seed: u64) -> Self {
        Self {
            count,
            interval,
            force,
            elapsed: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn advance(&mut self, seconds: f32, palette: &mut dyn Palette, out: &mut Vec<Splat>) {
        if self.count == 0 {
            return;
        }
        self.elapsed += seconds;
        while self.elapsed >= self.interval {
            self.elapsed -= self.interval;
            log::debug!("ambient burst of {} splats", self.count);
            for _ in 0..self.count {
                out.push(self.random_splat(palette));
            }
        }
    }

    fn random_splat(&mut self, palette: &mut dyn Palette) -> Splat {
        let c = palette.next_color();
        Splat {
            point: [self.rng.gen_range(0.0..1.0), self.rng.gen_range(0.0..1.0)],
            force: [
                self.force * self.rng.gen_range(-1.0..1.0),
                self.force * self.rng.gen_range(-1.0..1.0),
            ],
            color: [c[0] * 10.0, c[1] * 10.0, c[2] * 10.0],
        }
    }
}

/// Scripted sweeps: every `interval` seconds, a stroke of `duration` seconds crosses
/// the surface left to right along a sine path, one splat per frame.
pub struct RibbonEmitter {
    interval: f32,
    duration: f32,
    force: f32,
    /// Time into the current sweep, kept in `[0, interval)`.
    phase: f32,
    sweep: u64,
    colored: Option<u64>,
    color: [f32; 3],
}

impl RibbonEmitter {
    pub fn new(interval: f32, duration: f32, force: f32) -> Self {
        Self {
            interval,
            duration,
            force,
            phase: 0.0,
            sweep: 0,
            colored: None,
            color: [0.0; 3],
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Number of completed sweeps.
    pub fn sweep(&self) -> u64 {
        self.sweep
    }

    /// Point on the stroke and unit tangent, for `s` in `[0, 1]`.
    pub fn path(s: f32) -> ([f32; 2], [f32; 2]) {
        let w = 4.0 * std::f32::consts::PI;
        let point = [0.1 + 0.8 * s, 0.5 + 0.2 * (w * s).sin()];
        let tx = 0.8;
        let ty = 0.2 * w * (w * s).cos();
        let len = (tx * tx + ty * ty).sqrt();
        (point, [tx / len, ty / len])
    }

    pub fn advance(&mut self, seconds: f32, palette: &mut dyn Palette, out: &mut Vec<Splat>) {
        let (sweep, phase) = (self.sweep, self.phase);
        self.wind(seconds);
        if phase >= self.duration {
            return;
        }
        if self.colored != Some(sweep) {
            self.colored = Some(sweep);
            self.color = palette.next_color();
        }
        let (point, tangent) = Self::path(phase / self.duration);
        out.push(Splat {
            point,
            force: [tangent[0] * self.force, tangent[1] * self.force],
            color: self.color,
        });
    }

    fn wind(&mut self, seconds: f32) {
        let t = self.phase + seconds.max(0.0);
        let wraps = (t / self.interval).floor();
        self.sweep += wraps as u64;
        self.phase = t - wraps * self.interval;
        if !(0.0..self.interval).contains(&self.phase) {
            self.phase = 0.0;
        }
    }
}
