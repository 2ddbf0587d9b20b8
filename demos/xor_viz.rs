// demos/xor_viz.rs
//
// Interactive layer-by-layer view of the XOR network. Neurons are drawn as
// discs coloured by activation (viridis), weights as lines (blue positive,
// orange negative). Each step dispatches one layer on the GPU and the change
// eases in over a few frames.
//
// Usage:
//   cargo run --example xor_viz --release
//   cargo run --example xor_viz --release -- net.json
//
// Controls:
//   1-4    — pick input (00, 01, 10, 11) and reset
//   Space  — run the next layer
//   Enter  — run all remaining layers
//   R      — reset with the current input
//   C      — toggle connections
//   Q/Esc  — quit

use std::env;
use std::time::Instant;

use minifb::{Key, KeyRepeat, Window, WindowOptions};

use neuravis::gpu::{GpuDevice, LayerStepper, NeuralBuffers, NeuralCompute};
use neuravis::scene::{self, Connection};
use neuravis::{NetworkConfig, NnError};

const WIN_W: usize = 800;
const WIN_H: usize = 500;
const MARGIN: f32 = 60.0;
const NEURON_RADIUS: i32 = 16;

const INPUTS: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];

/// UI state changed only by key presses.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewState {
    input: usize,
    show_connections: bool,
}

/// What the GPU side should do this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    None,
    Reset,
    Step,
    RunAll,
}

/// Everything the render pass needs that does not change per frame.
struct Scene {
    points: Vec<(i32, i32)>,
    connections: Vec<Connection>,
}

fn main() -> Result<(), NnError> {
    env_logger::init();

    let cfg = match env::args().nth(1) {
        Some(path) => NetworkConfig::from_json_file(path)?,
        None => NetworkConfig::xor(),
    };
    let layout = cfg.validate()?;

    let gpu = GpuDevice::new()?;
    let mut buffers = NeuralBuffers::from_config(&gpu, &cfg)?;
    let mut compute = NeuralCompute::with_default_program(&gpu, &buffers)?;
    let mut stepper = LayerStepper::new(&buffers);

    let scene = Scene {
        points: project(&scene::neuron_positions(&cfg.topology), WIN_W, WIN_H),
        connections: scene::connections(&layout, &buffers.read_weights(&gpu)?),
    };

    let mut view = ViewState { input: 0, show_connections: true };
    stepper.reset(&gpu, &mut buffers, &input_vector(&view, layout.input_size()))?;

    let mut window = Window::new(
        "neuravis: XOR",
        WIN_W,
        WIN_H,
        WindowOptions { resize: false, ..WindowOptions::default() },
    )
    .expect("failed to create window");
    window.set_target_fps(60);

    let mut fb = vec![0u32; WIN_W * WIN_H];
    let mut last = Instant::now();

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        let dt = last.elapsed().as_secs_f32();
        last = Instant::now();

        let (next, action) = update(view, &window.get_keys_pressed(KeyRepeat::No));
        view = next;

        match action {
            Action::None => {}
            Action::Reset => {
                stepper.reset(&gpu, &mut buffers, &input_vector(&view, layout.input_size()))?;
            }
            Action::Step => {
                stepper.step(&gpu, &mut buffers, &mut compute)?;
            }
            Action::RunAll => {
                while stepper.step(&gpu, &mut buffers, &mut compute)? {}
            }
        }
        if action != Action::None {
            report(&stepper, &view, layout.output_offset());
        }

        stepper.tick(&gpu, &mut buffers, dt)?;
        // Draw what the activation buffer holds, as a GPU renderer bound to it would.
        let shown = buffers.read_all_activations(&gpu)?;
        render(&mut fb, &scene, &shown, &view);

        window
            .update_with_buffer(&fb, WIN_W, WIN_H)
            .expect("failed to present frame");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// State transitions (pure)
// ---------------------------------------------------------------------------

fn update(state: ViewState, keys: &[Key]) -> (ViewState, Action) {
    let mut next = state;
    let mut action = Action::None;
    for key in keys {
        match key {
            Key::Key1 | Key::Key2 | Key::Key3 | Key::Key4 => {
                next.input = match key {
                    Key::Key1 => 0,
                    Key::Key2 => 1,
                    Key::Key3 => 2,
                    _ => 3,
                };
                action = Action::Reset;
            }
            Key::R => action = Action::Reset,
            Key::Space if action == Action::None => action = Action::Step,
            Key::Enter if action == Action::None => action = Action::RunAll,
            Key::C => next.show_connections = !next.show_connections,
            _ => {}
        }
    }
    (next, action)
}

fn input_vector(state: &ViewState, n: usize) -> Vec<f32> {
    let mut v = vec![0.0; n];
    for (dst, src) in v.iter_mut().zip(INPUTS[state.input]) {
        *dst = src;
    }
    v
}

fn report(stepper: &LayerStepper, state: &ViewState, output_offset: usize) {
    let acts = stepper.true_activations();
    println!(
        "input {:?}  layer {}  {}  output {:?}",
        INPUTS[state.input],
        stepper.next_layer(),
        if stepper.is_complete() { "done" } else { "..." },
        &acts[output_offset..]
    );
}

// ---------------------------------------------------------------------------
// Framebuffer rendering (minifb, ARGB u32)
// ---------------------------------------------------------------------------

/// Fit scene coordinates into the window, y up.
fn project(positions: &[scene::NeuronPosition], w: usize, h: usize) -> Vec<(i32, i32)> {
    let (mut min_x, mut max_x) = (f32::MAX, f32::MIN);
    let (mut min_y, mut max_y) = (f32::MAX, f32::MIN);
    for p in positions {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    let sx = (w as f32 - 2.0 * MARGIN) / (max_x - min_x).max(1e-3);
    let sy = (h as f32 - 2.0 * MARGIN) / (max_y - min_y).max(1e-3);
    let s = sx.min(sy);
    let (cx, cy) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    positions
        .iter()
        .map(|p| {
            let px = w as f32 / 2.0 + (p.x - cx) * s;
            let py = h as f32 / 2.0 - (p.y - cy) * s;
            (px.round() as i32, py.round() as i32)
        })
        .collect()
}

fn render(fb: &mut [u32], scene: &Scene, activations: &[f32], state: &ViewState) {
    fb.fill(0xFF1A1A2E);

    if state.show_connections {
        let max_w = scene
            .connections
            .iter()
            .fold(0.0f32, |m, c| m.max(c.weight.abs()))
            .max(1e-6);
        for c in &scene.connections {
            let (x0, y0) = scene.points[c.from];
            let (x1, y1) = scene.points[c.to];
            let base = if c.weight >= 0.0 { 0x3FA7D6 } else { 0xE4572E };
            let color = fade_color(base, 0.25 + 0.75 * c.weight.abs() / max_w);
            draw_line(fb, WIN_W, WIN_H, x0, y0, x1, y1, color);
        }
    }

    let (lo, hi) = scene::value_range(activations);
    for (&(x, y), &a) in scene.points.iter().zip(activations) {
        let color = scene::rgb_to_u32(scene::viridis(scene::normalize(a, lo, hi)));
        fill_circle(fb, WIN_W, WIN_H, x, y, NEURON_RADIUS, 0xFF00_0000 | color);
        draw_circle(fb, WIN_W, WIN_H, x, y, NEURON_RADIUS, 0xFFE0E0E0);
    }
}

fn set_pixel(fb: &mut [u32], w: usize, h: usize, x: i32, y: i32, color: u32) {
    if x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h {
        fb[y as usize * w + x as usize] = color;
    }
}

fn fill_circle(fb: &mut [u32], w: usize, h: usize, cx: i32, cy: i32, r: i32, color: u32) {
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                set_pixel(fb, w, h, cx + dx, cy + dy, color);
            }
        }
    }
}

fn draw_circle(fb: &mut [u32], w: usize, h: usize, cx: i32, cy: i32, r: i32, color: u32) {
    // Midpoint circle, outline only.
    let (mut x, mut y, mut d) = (0, r, 1 - r);
    while x <= y {
        for (ox, oy) in [(x, y), (-x, y), (x, -y), (-x, -y), (y, x), (-y, x), (y, -x), (-y, -x)] {
            set_pixel(fb, w, h, cx + ox, cy + oy, color);
        }
        x += 1;
        if d < 0 {
            d += 2 * x + 1;
        } else {
            y -= 1;
            d += 2 * (x - y) + 1;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_line(fb: &mut [u32], w: usize, h: usize, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    // Bresenham.
    let (mut x, mut y) = (x0, y0);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        set_pixel(fb, w, h, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Scale an RGB colour toward black, keeping full alpha.
fn fade_color(rgb: u32, alpha: f32) -> u32 {
    let a = alpha.clamp(0.0, 1.0);
    let ch = |shift: u32| (((rgb >> shift) & 0xFF) as f32 * a) as u32;
    0xFF00_0000 | (ch(16) << 16) | (ch(8) << 8) | ch(0)
}
