//! Per-device-model configuration.
//!
//! Everything that is fixed for a hardware model (case geometry, the
//! spring and projectile catalogs) plus the host-side defaults a
//! [`crate::Device`] starts from.

use std::time::Duration;

use crate::energy::{CaseGeometry, DEFAULT_STEP_MM, LaunchEnergyModel, ProjectileSpec, SpringSpec};
use crate::error::GeometryError;
use crate::protocol::config::WireVersion;
use crate::trajectory::Tuning;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    pub case: CaseGeometry,
    /// Springs the device can report, keyed by [`SpringSpec::id`]
    pub springs: Vec<SpringSpec>,
    /// Projectiles the device can report, keyed by [`ProjectileSpec::id`]
    pub projectiles: Vec<ProjectileSpec>,
    /// Spring installed before the device reports one
    pub spring_id: Option<i32>,
    pub projectile_id: i32,
    pub tuning: Tuning,
    /// Lens-to-case-front offset (m) until the device reports one
    pub lens_offset: f64,
    /// Target height (m) until the device reports one
    pub target_height: f64,
    pub calibration_timeout_ms: u64,
    pub wire_version: WireVersion,
    /// Energy table resolution (mm)
    pub energy_step_mm: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            case: CaseGeometry::default(),
            springs: vec![
                SpringSpec {
                    id: 1,
                    name: "standard 1.5mm".into(),
                    wire_diameter: 1.5,
                    mean_diameter: 12.0,
                    active_coils: 5.0,
                    elastic_modulus: 200_000.0,
                    preload: 30.0,
                },
                SpringSpec {
                    id: 2,
                    name: "strong 1.8mm".into(),
                    wire_diameter: 1.8,
                    mean_diameter: 12.5,
                    active_coils: 5.0,
                    elastic_modulus: 200_000.0,
                    preload: 30.0,
                },
            ],
            projectiles: vec![
                ProjectileSpec::default(),
                ProjectileSpec {
                    id: 2,
                    name: "foam dart".into(),
                    weight: 1.3,
                    diameter: 13.0,
                    drag_coefficient: 0.75,
                },
            ],
            spring_id: Some(1),
            projectile_id: 1,
            tuning: Tuning::default(),
            lens_offset: 0.02,
            target_height: 0.0,
            calibration_timeout_ms: 10_000,
            wire_version: WireVersion::V2,
            energy_step_mm: DEFAULT_STEP_MM,
        }
    }
}

impl DeviceConfig {
    pub fn spring(&self, id: i32) -> Option<&SpringSpec> {
        self.springs.iter().find(|s| s.id == id)
    }

    pub fn projectile(&self, id: i32) -> Option<&ProjectileSpec> {
        self.projectiles.iter().find(|p| p.id == id)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_timeout_ms)
    }

    /// Build the energy model for the configured spring and projectile.
    ///
    /// An unknown projectile id falls back to the first catalog entry (or
    /// the built-in default); an unknown spring id leaves the model with no
    /// spring.
    pub fn energy_model(&self) -> Result<LaunchEnergyModel, GeometryError> {
        let projectile = self
            .projectile(self.projectile_id)
            .or_else(|| self.projectiles.first())
            .cloned()
            .unwrap_or_default();
        let mut model = LaunchEnergyModel::new(self.case.clone(), projectile, self.energy_step_mm);
        let spring = self.spring_id.and_then(|id| self.spring(id)).cloned();
        model.set_spring(spring)?;
        Ok(model)
    }
}

#[cfg(feature = "json")]
impl DeviceConfig {
    /// Parse a config. Missing fields take their defaults.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
