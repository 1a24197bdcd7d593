//! Progressive accumulation on a single background worker.
//!
//! The host frame loop calls [`ProgressiveRenderer::render`] once per
//! displayed frame. At most one full-frame pass runs at a time on its own
//! thread; the accumulation buffer moves into that thread and comes back
//! through the pass's `JoinHandle`, so the foreground can only ever see it
//! between passes and no lock is needed.
//!
//! Cancellation is cooperative: the pass checks the shared [`RenderState`]
//! before every scanline and returns early if the renderer is no longer
//! running. Samples are written to a per-pass buffer and folded into the
//! running mean only when the pass completes, so an aborted pass leaves the
//! accumulation untouched.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use glam::Vec4;
use glint_math::{Camera, Color};
use glint_scene::{build, AcceleratedScene, BuildConfig, Scene};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::camera_rays::generate_ray;
use crate::display::{DisplayTarget, TransferBuffer};
use crate::scatter::ray_color;

/// Lifecycle of a [`ProgressiveRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RenderState {
    /// No passes are launched; an in-flight pass aborts at its next scanline.
    Paused = 0,
    /// A new pass is launched whenever the previous one has finished.
    Running = 1,
    /// Absorbing; set when the renderer is dropped.
    Terminated = 2,
}

impl RenderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RenderState::Paused,
            1 => RenderState::Running,
            _ => RenderState::Terminated,
        }
    }
}

/// Render configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Maximum ray bounce depth
    pub max_depth: u32,
    /// Background color when ray doesn't hit anything
    pub background: Color,
    /// Base seed; pass `n` uses `seed + n`
    pub seed: u64,
    /// Acceleration structure settings used when the scene is captured
    pub build: BuildConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            max_depth: 10,
            background: Color::ZERO,
            seed: 0,
            build: BuildConfig::default(),
        }
    }
}

/// Running-mean image plus the shared sample denominator.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulation {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
    sample_count: u32,
}

impl Accumulation {
    /// A zero-sample image filled with `background`.
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![background.extend(1.0); width as usize * height as usize],
            sample_count: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Fold one complete pass into the running mean.
    ///
    /// `samples` must hold one value per pixel.
    pub fn commit(&mut self, samples: &[Vec4]) {
        debug_assert_eq!(samples.len(), self.pixels.len());
        let n = self.sample_count as f32;
        let inv = 1.0 / (n + 1.0);
        for (pixel, sample) in self.pixels.iter_mut().zip(samples) {
            *pixel = (*pixel * n + *sample) * inv;
        }
        self.sample_count += 1;
    }

    /// Copy into the display staging buffer, resizing it if needed.
    pub fn write_transfer(&self, buffer: &mut TransferBuffer) {
        if buffer.width() != self.width || buffer.height() != self.height {
            buffer.resize(self.width, self.height);
        }
        for (dst, src) in buffer.pixels_mut().iter_mut().zip(&self.pixels) {
            *dst = src.to_array();
        }
    }
}

/// Lock-free state shared with the worker.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    /// Pixels finished in the current pass
    progress: AtomicU32,
    /// Committed passes
    samples: AtomicU32,
}

impl Shared {
    fn state(&self) -> RenderState {
        RenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RenderState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Immutable inputs of one accumulation run.
#[derive(Debug, Clone)]
struct Snapshot {
    scene: Arc<AcceleratedScene>,
    camera: Camera,
}

/// Progressive path tracer driven by a host frame loop.
///
/// Created [`RenderState::Paused`]; call [`ProgressiveRenderer::reset`] or
/// set the state to running to start refining.
pub struct ProgressiveRenderer<D: DisplayTarget> {
    config: RenderConfig,
    shared: Arc<Shared>,
    snapshot: Option<Snapshot>,
    /// `None` while a pass owns it
    accumulation: Option<Accumulation>,
    pass: Option<JoinHandle<Accumulation>>,
    transfer: TransferBuffer,
    display: D,
}

impl<D: DisplayTarget> ProgressiveRenderer<D> {
    pub fn new(config: RenderConfig, display: D) -> Self {
        let transfer = TransferBuffer::new(config.width, config.height);
        Self {
            config,
            shared: Arc::new(Shared {
                state: AtomicU8::new(RenderState::Paused as u8),
                progress: AtomicU32::new(0),
                samples: AtomicU32::new(0),
            }),
            snapshot: None,
            accumulation: None,
            pass: None,
            transfer,
            display,
        }
    }

    /// Advance the renderer by one host frame. Never blocks.
    ///
    /// Captures `scene` and `camera` the first time (and after a reset);
    /// later calls ignore them until the next [`ProgressiveRenderer::reset`].
    pub fn render(&mut self, scene: &Scene, camera: &Camera) {
        if self.state() == RenderState::Terminated {
            return;
        }

        if self.snapshot.is_none() {
            match self.capture(scene, camera) {
                Ok(snapshot) => {
                    self.snapshot = Some(snapshot);
                    self.accumulation = Some(self.fresh_accumulation());
                    self.shared.samples.store(0, Ordering::Release);
                }
                Err(err) => {
                    log::warn!("Skipping frame, scene capture failed: {err}");
                    return;
                }
            }
        }

        if self.pass.as_ref().is_some_and(|pass| !pass.is_finished()) {
            return;
        }

        if let Some(pass) = self.pass.take() {
            match pass.join() {
                Ok(accumulation) => self.accumulation = Some(accumulation),
                Err(_) => {
                    log::error!("Render pass panicked, restarting accumulation");
                    self.accumulation = Some(self.fresh_accumulation());
                    self.shared.samples.store(0, Ordering::Release);
                }
            }
        }

        if let Some(accumulation) = &self.accumulation {
            accumulation.write_transfer(&mut self.transfer);
            self.display.enqueue_copy(&self.transfer);
        }

        if self.state() == RenderState::Running {
            self.launch();
        }
    }

    /// Wait for the in-flight pass, drop the snapshot and samples, and resume.
    ///
    /// The next [`ProgressiveRenderer::render`] re-captures the scene.
    pub fn reset(&mut self) {
        let terminated = self.state() == RenderState::Terminated;
        // Ask the pass to stop at its next scanline.
        if !terminated {
            self.shared.set_state(RenderState::Paused);
        }
        self.join_pass();

        self.snapshot = None;
        self.accumulation = None;
        self.shared.samples.store(0, Ordering::Release);
        self.shared.progress.store(0, Ordering::Release);

        if !terminated {
            self.shared.set_state(RenderState::Running);
        }
        log::debug!("Progressive renderer reset");
    }

    /// Reset and change the output size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.reset();
        self.config.width = width;
        self.config.height = height;
        self.transfer.resize(width, height);
    }

    /// Pause or resume. `Terminated` is final and cannot be left.
    pub fn set_state(&mut self, state: RenderState) {
        if self.state() != RenderState::Terminated {
            self.shared.set_state(state);
        }
    }

    pub fn state(&self) -> RenderState {
        self.shared.state()
    }

    /// Number of completed passes in the current accumulation.
    pub fn sample_count(&self) -> u32 {
        self.shared.samples.load(Ordering::Acquire)
    }

    /// Percentage of pixels traced in the current pass. Advisory only.
    pub fn progress(&self) -> f32 {
        let total = self.config.width as u64 * self.config.height as u64;
        if total == 0 {
            return 0.0;
        }
        let done = self.shared.progress.load(Ordering::Relaxed) as u64;
        (done.min(total) as f32 / total as f32) * 100.0
    }

    /// Color for rays that miss everything. Applies from the next pass on.
    pub fn set_background_color(&mut self, color: Color) {
        self.config.background = color;
    }

    pub fn background_color(&self) -> Color {
        self.config.background
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Display-ready resource.
    pub fn output(&self) -> &D::Output {
        self.display.output()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    fn capture(&self, scene: &Scene, camera: &Camera) -> Result<Snapshot, glint_scene::AccelError> {
        let mut scene = scene.clone();
        scene.update_world_transforms();
        let accel = build(&scene, &self.config.build)?;
        log::info!(
            "Captured scene '{}' for progressive rendering at {}x{}",
            scene.name,
            self.config.width,
            self.config.height
        );
        Ok(Snapshot {
            scene: Arc::new(accel),
            camera: *camera,
        })
    }

    fn fresh_accumulation(&self) -> Accumulation {
        Accumulation::new(self.config.width, self.config.height, self.config.background)
    }

    fn launch(&mut self) {
        let Some(snapshot) = self.snapshot.clone() else {
            return;
        };
        let Some(mut accumulation) = self.accumulation.take() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        let max_depth = self.config.max_depth;
        let background = self.config.background;
        let seed = self.config.seed;

        let spawned = thread::Builder::new()
            .name("glint-progressive".into())
            .spawn(move || {
                let pass = PassContext {
                    scene: &snapshot.scene,
                    camera: &snapshot.camera,
                    max_depth,
                    background,
                    seed,
                    shared: &shared,
                };
                update_image(&mut accumulation, &pass);
                accumulation
            });

        match spawned {
            Ok(handle) => self.pass = Some(handle),
            Err(err) => {
                log::error!("Failed to spawn render pass: {err}");
                self.accumulation = Some(self.fresh_accumulation());
                self.shared.samples.store(0, Ordering::Release);
            }
        }
    }

    fn join_pass(&mut self) {
        if let Some(pass) = self.pass.take() {
            if pass.join().is_err() {
                log::error!("Render pass panicked");
            }
        }
    }
}

impl<D: DisplayTarget> Drop for ProgressiveRenderer<D> {
    fn drop(&mut self) {
        self.shared.set_state(RenderState::Terminated);
        self.join_pass();
    }
}

struct PassContext<'a> {
    scene: &'a AcceleratedScene,
    camera: &'a Camera,
    max_depth: u32,
    background: Color,
    seed: u64,
    shared: &'a Shared,
}

/// One full-frame pass. Returns `false` if it was cancelled.
fn update_image(accumulation: &mut Accumulation, pass: &PassContext<'_>) -> bool {
    let width = accumulation.width;
    let height = accumulation.height;
    let mut rng = StdRng::seed_from_u64(pass.seed.wrapping_add(accumulation.sample_count as u64));
    let mut samples = vec![Vec4::ZERO; accumulation.pixels.len()];

    pass.shared.progress.store(0, Ordering::Relaxed);
    for (y, row) in samples.chunks_mut(width.max(1) as usize).enumerate().take(height as usize) {
        if pass.shared.state() != RenderState::Running {
            log::debug!(
                "Pass {} cancelled at scanline {}",
                accumulation.sample_count + 1,
                y
            );
            return false;
        }

        for (x, sample) in row.iter_mut().enumerate() {
            let ray = generate_ray(pass.camera, x as u32, y as u32, width, height, &mut rng);
            let color = ray_color(&ray, pass.scene, pass.max_depth, pass.background, &mut rng);
            *sample = color.extend(1.0);
        }
        pass.shared.progress.fetch_add(width, Ordering::Relaxed);
    }

    accumulation.commit(&samples);
    pass.shared.samples.store(accumulation.sample_count, Ordering::Release);
    log::debug!("Pass {} complete", accumulation.sample_count);
    true
}
