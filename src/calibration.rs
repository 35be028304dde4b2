//! Distance sensor calibration.
//!
//! A calibration is a fixed list of SENSOR-namespace SET commands sent one
//! at a time. Each response is matched to the outstanding command by its
//! parameter id; the protocol carries no request token. The session is a
//! pure state machine: it is driven by [`CalibrationSession::begin`],
//! [`CalibrationSession::on_sample_state`] and
//! [`CalibrationSession::on_response`], and returns the commands to write
//! instead of writing them.
//!
//! ```text
//!  begin ─► PREPARE ──(sampling off, config read)──► START ─► WAIT_FOR_RESPONSE ─┐
//!              │                                                 ▲      │     │
//!              │                                                 └─OK───┘     │
//!              └──────────── timeout / bad status ─► ERROR ◄────────────────┘ │
//!                                              FINISHED ◄── OK on last step ──┘
//! ```

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::CalibrationError;
use crate::protocol::Command;
use crate::protocol::config::{ConfigCommand, ConfigResponse, ConfigStatus, ConfigTarget, Param};
use crate::protocol::sensor::{OffsetCorrectionMode, PowerLevel, Roi, SensorId, SensorParam};

/// Default time to wait for any single response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// One SET command in a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeStep {
    pub param: SensorParam,
    pub value: i32,
    /// Also treat a MISMATCH response as success.
    pub accept_mismatch: bool,
}

impl RecipeStep {
    const fn set(param: SensorParam, value: i32) -> Self {
        Self { param, value, accept_mismatch: false }
    }

    const fn set_lenient(param: SensorParam, value: i32) -> Self {
        Self { param, value, accept_mismatch: true }
    }

    fn command(&self) -> Command {
        Command::Config(ConfigCommand::set(Param::Sensor(self.param), self.value))
    }

    fn accepts(&self, status: ConfigStatus) -> bool {
        status == ConfigStatus::Ok || (self.accept_mismatch && status == ConfigStatus::Mismatch)
    }
}

/// The ordered calibration steps for one sensor role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipe {
    pub sensor: SensorId,
    pub steps: &'static [RecipeStep],
}

/// Short-range position sensor: low power, narrow ROI, calibrated against a
/// 100 mm target, then a 33 ms timing budget.
pub static POSITION_RECIPE: Recipe = Recipe {
    sensor: SensorId::Position,
    steps: &[
        RecipeStep::set(SensorParam::PowerLevel, PowerLevel::Low as i32),
        RecipeStep::set(SensorParam::OffsetCorrectionMode, OffsetCorrectionMode::Standard as i32),
        RecipeStep::set(SensorParam::PhaseCalPower, PowerLevel::Default as i32),
        RecipeStep::set(SensorParam::SmudgeCorrection, 0),
        RecipeStep::set(SensorParam::XtalkCorrection, 0),
        RecipeStep::set(SensorParam::RegionOfInterest, Roi::new(4, 4).value()),
        RecipeStep::set(SensorParam::RefSpadCalibration, 1),
        RecipeStep::set(SensorParam::XtalkCalibration, 1),
        RecipeStep::set(SensorParam::OffsetCalibration, 100),
        // Firmware rounds the budget to its own granularity.
        RecipeStep::set_lenient(SensorParam::TimingBudget, 33),
    ],
};

/// Long-range height sensor: default power, full ROI, zero-distance offset.
pub static HEIGHT_RECIPE: Recipe = Recipe {
    sensor: SensorId::Height,
    steps: &[
        RecipeStep::set(SensorParam::PowerLevel, PowerLevel::Default as i32),
        RecipeStep::set(SensorParam::OffsetCorrectionMode, OffsetCorrectionMode::Standard as i32),
        RecipeStep::set(SensorParam::PhaseCalPower, PowerLevel::Default as i32),
        RecipeStep::set(SensorParam::SmudgeCorrection, 0),
        RecipeStep::set(SensorParam::XtalkCorrection, 0),
        RecipeStep::set(SensorParam::RegionOfInterest, Roi::new(16, 16).value()),
        RecipeStep::set(SensorParam::RefSpadCalibration, 1),
        RecipeStep::set(SensorParam::XtalkCalibration, 1),
        RecipeStep::set(SensorParam::OffsetZeroDistanceCalibration, 0),
    ],
};

impl Recipe {
    /// The built-in recipe for `sensor`.
    pub fn for_sensor(sensor: SensorId) -> Result<&'static Recipe, CalibrationError> {
        match sensor {
            SensorId::Position => Ok(&POSITION_RECIPE),
            SensorId::Height => Ok(&HEIGHT_RECIPE),
            SensorId::Unknown(_) => Err(CalibrationError::UnknownSensor(sensor)),
        }
    }

    /// Check the recipe can be driven by parameter id alone.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.steps.is_empty() {
            return Err(CalibrationError::EmptyRecipe(self.sensor));
        }
        let mut seen = HashSet::new();
        for step in self.steps {
            if step.param == SensorParam::Config {
                return Err(CalibrationError::ReadOnlyStep {
                    sensor: self.sensor,
                    param: step.param.name(),
                });
            }
            if !seen.insert(step.param) {
                return Err(CalibrationError::DuplicateStep {
                    sensor: self.sensor,
                    param: step.param.name(),
                });
            }
        }
        Ok(())
    }

    /// Index of the step that writes `param_id`.
    fn position(&self, param_id: u8) -> Option<usize> {
        self.steps.iter().position(|s| s.param.id() == param_id)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CalibrationState {
    /// Not running.
    #[default]
    Na,
    /// Waiting for sampling to stop and the config snapshot.
    Prepare,
    Start,
    WaitForResponse,
    Finished,
    Error,
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Na => "NA",
            Self::Prepare => "PREPARE",
            Self::Start => "START",
            Self::WaitForResponse => "WAIT_FOR_RESPONSE",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Calibration of one sensor.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    recipe: &'static Recipe,
    state: CalibrationState,
    /// Parameter of the command we are waiting on.
    pending: Option<SensorParam>,
    awaiting_sample_off: bool,
    /// When the current wait started.
    since: Option<Instant>,
    timeout: Duration,
    last_response: Option<ConfigResponse>,
    status: String,
}

impl CalibrationSession {
    pub fn new(sensor: SensorId, timeout: Duration) -> Result<Self, CalibrationError> {
        let recipe = Recipe::for_sensor(sensor)?;
        recipe.validate()?;
        Ok(Self {
            recipe,
            state: CalibrationState::Na,
            pending: None,
            awaiting_sample_off: false,
            since: None,
            timeout,
            last_response: None,
            status: format!("{sensor}: idle"),
        })
    }

    pub fn sensor(&self) -> SensorId {
        self.recipe.sensor
    }

    pub fn recipe(&self) -> &'static Recipe {
        self.recipe
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Human-readable `"<sensor>: <parameter> <status>"` line.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_response(&self) -> Option<&ConfigResponse> {
        self.last_response.as_ref()
    }

    /// Whether the session is waiting on the device.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            CalibrationState::Prepare | CalibrationState::Start | CalibrationState::WaitForResponse
        )
    }

    /// Start (or restart) the calibration from scratch.
    ///
    /// Anything outstanding from a previous run is forgotten, so a late
    /// response to it cannot advance the new run.
    pub fn begin(&mut self, sampling_enabled: bool, now: Instant) -> Vec<Command> {
        self.reset();
        self.state = CalibrationState::Prepare;
        self.since = Some(now);

        let mut out = vec![Command::SensorSelect(self.sensor())];
        if sampling_enabled {
            self.awaiting_sample_off = true;
            self.status = format!("{}: waiting for sampling to stop", self.sensor());
            out.push(Command::SampleEnable(false));
        } else {
            out.push(self.read_config());
        }
        out
    }

    /// Feed a sample-enable state push.
    pub fn on_sample_state(&mut self, enabled: bool, now: Instant) -> Vec<Command> {
        if self.state != CalibrationState::Prepare || !self.awaiting_sample_off || enabled {
            return Vec::new();
        }
        self.awaiting_sample_off = false;
        self.since = Some(now);
        vec![self.read_config()]
    }

    /// Feed a config response.
    ///
    /// Returns `None` when the response does not answer the outstanding
    /// command (another namespace, a stale id, or no calibration running);
    /// the session is left untouched. Otherwise returns the commands to
    /// send next, possibly none.
    pub fn on_response(&mut self, resp: &ConfigResponse, now: Instant) -> Option<Vec<Command>> {
        if resp.target != ConfigTarget::Sensor {
            return None;
        }
        let pending = self.pending?;
        if resp.param_id != pending.id() {
            return None;
        }
        self.last_response = Some(*resp);
        self.pending = None;

        match self.state {
            CalibrationState::Prepare => {
                if resp.status != ConfigStatus::Ok {
                    self.fail(format!("{} {}", pending.name(), resp.status));
                    return Some(Vec::new());
                }
                self.state = CalibrationState::Start;
                self.status = format!("{}: {} {}", self.sensor(), pending.name(), resp.status);
                Some(self.send_step(0, now))
            }
            CalibrationState::WaitForResponse => {
                let Some(index) = self.recipe.position(resp.param_id) else {
                    return Some(Vec::new());
                };
                let step = self.recipe.steps[index];
                if !step.accepts(resp.status) {
                    self.fail(format!("{} {}", step.param.name(), resp.status));
                    return Some(Vec::new());
                }
                if index + 1 == self.recipe.steps.len() {
                    self.state = CalibrationState::Finished;
                    self.since = None;
                    self.status = format!(
                        "{}: {} {}, calibration finished",
                        self.sensor(),
                        step.param.name(),
                        resp.status
                    );
                    return Some(Vec::new());
                }
                self.status = format!("{}: {} {}", self.sensor(), step.param.name(), resp.status);
                Some(self.send_step(index + 1, now))
            }
            _ => None,
        }
    }

    /// Move to `ERROR` if the device has been silent longer than the
    /// timeout. Returns whether the session timed out on this call.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some(since) = self.since else {
            return false;
        };
        if now.saturating_duration_since(since) < self.timeout {
            return false;
        }
        let what = match self.pending {
            Some(param) => param.name(),
            None => "sampling stop",
        };
        self.fail(format!("{what} timed out"));
        true
    }

    /// Abandon the calibration. Safe from any state.
    pub fn stop(&mut self) {
        self.reset();
        self.status = format!("{}: stopped", self.sensor());
    }

    fn reset(&mut self) {
        self.state = CalibrationState::Na;
        self.pending = None;
        self.awaiting_sample_off = false;
        self.since = None;
        self.last_response = None;
    }

    fn read_config(&mut self) -> Command {
        self.pending = Some(SensorParam::Config);
        self.status = format!("{}: reading {}", self.sensor(), SensorParam::Config.name());
        Command::Config(ConfigCommand::get(Param::Sensor(SensorParam::Config)))
    }

    fn send_step(&mut self, index: usize, now: Instant) -> Vec<Command> {
        let step = self.recipe.steps[index];
        self.state = CalibrationState::WaitForResponse;
        self.pending = Some(step.param);
        self.since = Some(now);
        vec![step.command()]
    }

    fn fail(&mut self, detail: String) {
        self.state = CalibrationState::Error;
        self.pending = None;
        self.since = None;
        self.status = format!("{}: {detail}, calibration failed", self.sensor());
    }
}
