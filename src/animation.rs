// animation.rs — display-side smoothing of activation snapshots.
//
// After each single-layer step the driver holds two snapshots of the
// activation buffer: before the step and after it. For display, values glide
// from the first toward the second with exponential easing:
//
//   current += (target - current) * min(1, dt * speed)
//
// The eased vector is display data only. It is uploaded into the activation
// buffer so a renderer bound to that buffer shows it, but it is never the
// input of a later layer: `LayerStepper` restores the true post-step
// snapshot before every dispatch. This module holds no GPU state.

/// Default easing speed (1/s). At 60 fps one frame closes ~10% of the gap.
pub const DEFAULT_SPEED: f32 = 6.0;

/// One easing step from `current` toward `target`, written into `current`.
///
/// Negative `dt` is treated as zero. Slices must have equal length; extra
/// elements on either side are ignored.
pub fn ease_toward(current: &mut [f32], target: &[f32], dt: f32, speed: f32) {
    let t = (dt.max(0.0) * speed).min(1.0);
    for (c, &g) in current.iter_mut().zip(target) {
        *c += (g - *c) * t;
    }
}

/// Display-side interpolation state between two activation snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationAnimator {
    display: Vec<f32>,
    target: Vec<f32>,
    speed: f32,
}

impl ActivationAnimator {
    /// Start settled at `initial` (display == target).
    pub fn new(initial: Vec<f32>, speed: f32) -> Self {
        ActivationAnimator {
            target: initial.clone(),
            display: initial,
            speed,
        }
    }

    /// Begin a new transition from `pre` to `post`.
    ///
    /// The display restarts at `pre` so each step animates from the state the
    /// dispatch actually consumed.
    pub fn retarget(&mut self, pre: &[f32], post: &[f32]) {
        self.display.clear();
        self.display.extend_from_slice(pre);
        self.target.clear();
        self.target.extend_from_slice(post);
    }

    /// Jump straight to `values` with no transition.
    pub fn snap(&mut self, values: &[f32]) {
        self.retarget(values, values);
    }

    /// Advance the easing by `dt` seconds and return the new display vector.
    pub fn update(&mut self, dt: f32) -> &[f32] {
        ease_toward(&mut self.display, &self.target, dt, self.speed);
        &self.display
    }

    /// Pure form of `update`: the state one frame later.
    pub fn advanced(&self, dt: f32) -> Self {
        let mut next = self.clone();
        next.update(dt);
        next
    }

    pub fn display(&self) -> &[f32] {
        &self.display
    }

    pub fn target(&self) -> &[f32] {
        &self.target
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// True when every display value is within `eps` of its target.
    pub fn is_settled(&self, eps: f32) -> bool {
        self.display
            .iter()
            .zip(&self.target)
            .all(|(d, t)| (d - t).abs() <= eps)
    }
}
