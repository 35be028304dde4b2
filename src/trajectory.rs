//! Trajectory simulation and hit confidence.
//!
//! Pure functions: nothing here blocks, allocates per step, or touches
//! shared state. The integrator still runs an input-dependent number of
//! steps, so callers on a latency-sensitive path should go through
//! [`crate::worker::SimulationWorker`].

use crate::energy::LaunchEnergyModel;
use crate::geometry;

/// Gravitational acceleration (m/s²).
pub const G_ACCEL_MPS2: f64 = 9.80665;

/// Integrator time step (s).
pub const TIME_STEP: f64 = 0.01;

/// Bail-out for pathological inputs (100 s of flight).
const MAX_STEPS: usize = 10_000;

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

pub const DEFAULT_FORCE_OFFSET: f64 = 0.5;
pub const DEFAULT_EFFICIENCY: f64 = 0.85;
pub const DEFAULT_FRICTION: f64 = 0.3;

/// User-tunable loss parameters.
///
/// Out-of-range values fall back to the named default, never to a bound.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Tuning {
    /// Constant resisting force on the carriage, `[0, 2]` N
    pub force_offset: f64,
    /// Energy transfer efficiency, `[0.5, 1]`
    pub efficiency: f64,
    /// Rail friction coefficient, `[0, 1]`
    pub friction: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            force_offset: DEFAULT_FORCE_OFFSET,
            efficiency: DEFAULT_EFFICIENCY,
            friction: DEFAULT_FRICTION,
        }
    }
}

impl Tuning {
    /// Copy with every out-of-range field replaced by its default.
    pub fn sanitized(&self) -> Self {
        Self {
            force_offset: in_range_or(self.force_offset, 0.0, 2.0, DEFAULT_FORCE_OFFSET),
            efficiency: in_range_or(self.efficiency, 0.5, 1.0, DEFAULT_EFFICIENCY),
            friction: in_range_or(self.friction, 0.0, 1.0, DEFAULT_FRICTION),
        }
    }
}

fn in_range_or(value: f64, lo: f64, hi: f64, default: f64) -> f64 {
    if (lo..=hi).contains(&value) { value } else { default }
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// One simulation request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShotInput {
    /// Carriage position (mm)
    pub position: f64,
    /// Device pitch (deg above horizontal)
    pub launch_angle: f64,
    /// Device height above ground (m)
    pub device_height: f64,
    /// Distance from the range-finding lens back to the case front (m)
    pub lens_offset: f64,
    /// Horizontal distance to the target, measured at the lens (m)
    pub target_distance: f64,
}

/// Predicted impact.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImpactData {
    /// Horizontal distance at ground impact (m)
    pub distance: f64,
    /// Height when passing the target distance, 0 if it lands short (m)
    pub height: f64,
}

/// A simulation result with the input it was computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Prediction {
    pub input: ShotInput,
    pub impact: ImpactData,
    /// Exit velocity (m/s)
    pub exit_velocity: f64,
    /// Hit confidence (%)
    pub confidence: f64,
}

#[cfg(feature = "json")]
impl Prediction {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// Exit velocity (m/s) of a launch from carriage `position` at `angle`.
pub fn exit_velocity(model: &LaunchEnergyModel, tuning: &Tuning, position: f64, angle: f64) -> f64 {
    let tuning = tuning.sanitized();
    let max = model.max_position();
    // `clamp` panics on a NaN or inverted bound.
    let position = position.max(0.0).min(max);

    let weight = model.case().carriage_weight + model.projectile().weight;
    let (sin, cos) = angle.to_radians().sin_cos();
    let travel = max - position;
    let loss = travel
        * (tuning.force_offset + weight * G_ACCEL_MPS2 * (sin + cos * tuning.friction) * 0.001);

    // N·mm
    let net = (model.potential_energy_at(position) - loss).max(0.0) * tuning.efficiency;
    let mass_kg = weight / 1000.0;
    if net <= 0.0 || mass_kg <= 0.0 {
        return 0.0;
    }
    (2.0 * (net / 1000.0) / mass_kg).sqrt()
}

/// Predict the impact of a launch.
///
/// Returns `ImpactData::default()` without integrating when the launch has
/// no net energy.
pub fn simulate(model: &LaunchEnergyModel, tuning: &Tuning, input: &ShotInput) -> ImpactData {
    let velocity = exit_velocity(model, tuning, input.position, input.launch_angle);
    if velocity <= 0.0 {
        return ImpactData::default();
    }
    fly(model, input, velocity)
}

/// Simulate and score against `target_height`.
pub fn predict(
    model: &LaunchEnergyModel,
    tuning: &Tuning,
    input: &ShotInput,
    target_height: f64,
) -> Prediction {
    let exit_velocity = exit_velocity(model, tuning, input.position, input.launch_angle);
    let impact = if exit_velocity > 0.0 {
        fly(model, input, exit_velocity)
    } else {
        ImpactData::default()
    };
    Prediction {
        input: *input,
        impact,
        exit_velocity,
        confidence: hit_confidence(input.target_distance, target_height, &impact),
    }
}

fn fly(model: &LaunchEnergyModel, input: &ShotInput, velocity: f64) -> ImpactData {
    let (launch_height, target) = launch_point(model, input);
    integrate(
        launch_height,
        velocity,
        input.launch_angle,
        model.projectile().drag_factor(),
        target,
    )
}

/// Launch height (m) and lens-corrected target distance (m).
fn launch_point(model: &LaunchEnergyModel, input: &ShotInput) -> (f64, f64) {
    let angle = input.launch_angle;
    let center_mm = model.case().projectile_center_at_max(model.projectile());
    let launch_height = input.device_height + geometry::opposite_side(center_mm / 1000.0, angle);

    let behind_front = input.lens_offset + (model.case().case_length - center_mm) / 1000.0;
    let target = if behind_front > 0.0 {
        input.target_distance + geometry::adjacent_side(behind_front, angle)
    } else {
        input.target_distance
    };
    (launch_height, target)
}

/// Quadratic-drag integration with trapezoidal displacement.
fn integrate(height: f64, velocity: f64, angle: f64, drag: f64, target: f64) -> ImpactData {
    let dt = TIME_STEP;
    let (sin, cos) = angle.to_radians().sin_cos();
    let (mut x, mut y) = (0.0, height);
    let (mut vx, mut vy) = (velocity * cos, velocity * sin);
    let mut target_height = None;

    for _ in 0..MAX_STEPS {
        let v = vx.hypot(vy);
        let nvx = vx - drag * vx * v * dt;
        let nvy = vy - (G_ACCEL_MPS2 + drag * vy * v) * dt;
        let (px, py) = (x, y);
        x += (vx + nvx) / 2.0 * dt;
        y += (vy + nvy) / 2.0 * dt;
        vx = nvx;
        vy = nvy;

        if target_height.is_none() && x >= target {
            let h = if x > px { py + (y - py) * (target - px) / (x - px) } else { y };
            // Crossing below ground means it landed short in this step.
            target_height = Some(h.max(0.0));
        }
        if y <= 0.0 {
            let distance = if py > y { px + (x - px) * py / (py - y) } else { x };
            return ImpactData {
                distance,
                height: target_height.unwrap_or(0.0),
            };
        }
    }

    ImpactData {
        distance: x,
        height: target_height.unwrap_or(0.0),
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Hit confidence (%) comparing predicted and target flight lengths.
///
/// Symmetric: overshooting and undershooting by the same ratio score the
/// same.
pub fn hit_confidence(target_distance: f64, target_height: f64, impact: &ImpactData) -> f64 {
    let estimated = if impact.distance >= target_distance && target_height > 0.0 {
        target_distance + impact.height
    } else {
        impact.distance
    };
    let target = target_distance + target_height;
    let (lo, hi) = if estimated < target { (estimated, target) } else { (target, estimated) };
    if lo == 0.0 || hi == 0.0 {
        return 0.0;
    }
    100.0 * lo / hi
}
