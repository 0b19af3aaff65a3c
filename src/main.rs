use anyhow::{Context, Result};
use fluid_sidecar::diagnostics::FlowStats;
use fluid_sidecar::kernels::Kernel;
use fluid_sidecar::{FluidSolver, GpuContext, GridSize, SolverConfig, SurfaceSize};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Probe,
    Simulate(SimulateRequest),
}

#[derive(Debug, Deserialize)]
struct SimulateRequest {
    #[serde(default = "default_extent")]
    width: u32,
    #[serde(default = "default_extent")]
    height: u32,
    #[serde(default = "default_frames")]
    frames: u32,
    #[serde(default = "default_frame_ms")]
    frame_ms: f32,
    #[serde(default)]
    config: SolverConfig,
    #[serde(default)]
    pointer: Vec<PointerSample>,
    #[serde(default)]
    resizes: Vec<ResizeEvent>,
    /// `[from, to)` frame ranges during which the solver is disabled.
    #[serde(default)]
    idle: Vec<[u32; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PointerAction {
    Down,
    Move,
    Up,
}

#[derive(Debug, Deserialize)]
struct PointerSample {
    frame: u32,
    #[serde(default)]
    id: u64,
    action: PointerAction,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}

#[derive(Debug, Deserialize)]
struct ResizeEvent {
    frame: u32,
    width: u32,
    height: u32,
}

fn default_extent() -> u32 { 512 }
fn default_frames() -> u32 { 120 }
fn default_frame_ms() -> f32 { 1000.0 / 60.0 }

#[derive(Debug, Serialize)]
struct ProbeResponse {
    ok: bool,
    backend: String,
    adapter: String,
    kernels: usize,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct SimulateResponse {
    ok: bool,
    backend: String,
    width: u32,
    height: u32,
    sim: GridSize,
    dye: GridSize,
    frames: u32,
    frames_stepped: u32,
    splats: usize,
    elapsed_ms: f64,
    fps: f64,
    #[serde(flatten)]
    stats: FlowStats,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(err) = run() {
        let out = serde_json::json!({"ok": false, "error": format!("{err:#}")});
        println!(
            "{}",
            serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{\"ok\":false}".into())
        );
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let req: Request = if input.trim().is_empty() {
        Request::Probe
    } else {
        serde_json::from_str(&input).context("invalid JSON request")?
    };

    match req {
        Request::Probe => {
            let resp = run_probe()?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Simulate(sim) => {
            let resp = run_simulate(sim)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }
    Ok(())
}

fn run_probe() -> Result<ProbeResponse> {
    let t0 = Instant::now();
    let ctx = GpuContext::new().context("GPU init failed")?;
    let backend = ctx.backend_name();
    let adapter = ctx.adapter_info.name.clone();
    // zero-area surface: kernels are built, no fields are allocated
    FluidSolver::init(ctx, SurfaceSize::new(0, 0), SolverConfig::default()).context("kernel build failed")?;
    Ok(ProbeResponse {
        ok: true,
        backend,
        adapter,
        kernels: Kernel::ALL.len(),
        elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
    })
}

fn run_simulate(req: SimulateRequest) -> Result<SimulateResponse> {
    let ctx = GpuContext::new().context("GPU init failed")?;
    let backend = ctx.backend_name();
    let mut solver = FluidSolver::init(ctx, SurfaceSize::new(req.width, req.height), req.config)
        .context("solver init failed")?;
    solver.enable();

    // synthetic vsync so runs are reproducible regardless of host speed
    let base = Instant::now();
    let frame_step = Duration::from_secs_f32(req.frame_ms.max(0.1) / 1000.0);
    let t0 = Instant::now();
    let mut frames_stepped = 0;
    let mut splats = 0;

    for frame in 0..req.frames {
        for r in req.resizes.iter().filter(|r| r.frame == frame) {
            solver
                .resize(SurfaceSize::new(r.width, r.height))
                .with_context(|| format!("resize at frame {frame} failed"))?;
        }
        for [from, to] in &req.idle {
            if *from == frame {
                solver.disable();
            }
            if *to == frame {
                solver.enable();
            }
        }
        for p in req.pointer.iter().filter(|p| p.frame == frame) {
            match p.action {
                PointerAction::Down => solver.pointer_down(p.id, [p.x, p.y]),
                PointerAction::Move => solver.pointer_move(p.id, [p.x, p.y]),
                PointerAction::Up => solver.pointer_up(p.id),
            }
        }

        let report = solver
            .frame(base + frame_step * frame)
            .with_context(|| format!("frame {frame} failed"))?;
        if report.stepped {
            frames_stepped += 1;
        }
        splats += report.splats;
    }
    solver.ctx().wait_idle().context("device lost before readback")?;
    let elapsed = t0.elapsed().as_secs_f64();

    let state = solver
        .state()
        .context("surface never reached a non-zero size")?;
    let velocity = state.velocity_snapshot(solver.ctx())?;
    let dye = state.dye_snapshot(solver.ctx())?;
    let surface = solver.surface();

    Ok(SimulateResponse {
        ok: true,
        backend,
        width: surface.width,
        height: surface.height,
        sim: state.sim_size(),
        dye: state.dye_size(),
        frames: req.frames,
        frames_stepped,
        splats,
        elapsed_ms: elapsed * 1000.0,
        fps: (req.frames as f64) / elapsed.max(1e-6),
        stats: FlowStats::measure(&velocity, &dye),
    })
}
