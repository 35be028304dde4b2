//! Launch energy model: carriage position → stored spring energy.
//!
//! Two torsion springs sit on studs either side of the carriage rail. Each
//! spring leg bears on a support pin on the carriage. Pulling the carriage
//! back toward the position sensor winds the springs up.
//!
//! Case frame, per spring (mm): origin at the stud center, +x along the
//! travel direction (away from the position sensor), +y toward the rail
//! centerline. Carriage position is the sensor-to-carriage distance, so
//! `max_carriage_position` is the relaxed end and energy grows toward 0.

use crate::error::GeometryError;
use crate::geometry::{self, Point2, TangentSide};

/// Sea-level air density (kg/m³).
pub const AIR_DENSITY: f64 = 1.225;

/// Default energy table resolution (mm).
pub const DEFAULT_STEP_MM: f64 = 1.0;

/// Finest accepted table resolution (mm). Finer steps fall back to
/// [`DEFAULT_STEP_MM`].
pub const MIN_STEP_MM: f64 = 0.01;

/// Upper bound on carriage travel (mm).
pub const MAX_TRAVEL_MM: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// Fixed case/carriage geometry of one device model. Lengths in mm.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CaseGeometry {
    pub case_length: f64,
    /// Lateral distance between the two spring studs
    pub stud_to_stud: f64,
    /// Along-rail distance from the position sensor to the stud centers
    pub sensor_to_stud: f64,
    /// Along-rail distance from the sensor reading to the support pin center
    pub sensor_to_carriage_back: f64,
    /// Direction of the leg contact around the support pin (deg from -x)
    pub carriage_grip_angle: f64,
    /// Carriage weight (g)
    pub carriage_weight: f64,
    pub stud_radius: f64,
    pub support_radius: f64,
    /// Direction the coil hangs off the stud under load (deg from +x)
    pub stud_angle_offset: f64,
    /// Sensor-to-carriage distance at full extension (relaxed springs)
    pub max_carriage_position: f64,
}

impl Default for CaseGeometry {
    fn default() -> Self {
        Self {
            case_length: 120.0,
            stud_to_stud: 40.0,
            sensor_to_stud: 70.0,
            sensor_to_carriage_back: 15.0,
            carriage_grip_angle: 30.0,
            carriage_weight: 20.0,
            stud_radius: 2.5,
            support_radius: 3.0,
            stud_angle_offset: -90.0,
            max_carriage_position: 60.0,
        }
    }
}

impl CaseGeometry {
    /// Support pin center at carriage `position`, relative to a stud.
    fn support_center(&self, position: f64) -> Point2 {
        Point2::new(
            position + self.sensor_to_carriage_back - self.sensor_to_stud,
            self.stud_to_stud / 2.0,
        )
    }

    /// Sensor-to-projectile-center distance at full extension (mm).
    pub fn projectile_center_at_max(&self, projectile: &ProjectileSpec) -> f64 {
        self.max_carriage_position + self.sensor_to_carriage_back + projectile.diameter / 2.0
    }
}

/// Torsion spring, one of an identical installed pair.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpringSpec {
    /// Catalog id (EXT_STORE spring model value)
    pub id: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Wire diameter (mm)
    pub wire_diameter: f64,
    /// Mean coil diameter (mm)
    pub mean_diameter: f64,
    pub active_coils: f64,
    /// Young's modulus of the wire (N/mm²)
    pub elastic_modulus: f64,
    /// Deflection already wound in at full carriage extension (deg)
    #[cfg_attr(feature = "serde", serde(default))]
    pub preload: f64,
}

impl SpringSpec {
    /// Torque per degree of deflection (N·mm/deg).
    ///
    /// `k = E·d⁴ / (64·D·n)` per radian.
    pub fn rate_per_degree(&self) -> f64 {
        let d4 = self.wire_diameter.powi(4);
        let per_rad = self.elastic_modulus * d4 / (64.0 * self.mean_diameter * self.active_coils);
        per_rad * std::f64::consts::PI / 180.0
    }

    /// Force (N) at the end of a leg of length `moment_arm` (mm) when the
    /// spring is deflected by `angle` degrees.
    pub fn force_at_angle(&self, angle: f64, moment_arm: f64) -> f64 {
        if moment_arm <= 0.0 {
            return 0.0;
        }
        self.rate_per_degree() * angle / moment_arm
    }

    /// Coil centerline radius (mm).
    fn coil_radius(&self) -> f64 {
        self.mean_diameter / 2.0
    }
}

/// Projectile physical constants.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectileSpec {
    /// Catalog id (EXT_STORE projectile model value)
    pub id: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Weight (g)
    pub weight: f64,
    /// Diameter (mm)
    pub diameter: f64,
    pub drag_coefficient: f64,
}

impl Default for ProjectileSpec {
    fn default() -> Self {
        Self {
            id: 1,
            name: "foam ball 12mm".into(),
            weight: 5.0,
            diameter: 12.0,
            drag_coefficient: 0.47,
        }
    }
}

impl ProjectileSpec {
    /// Quadratic drag factor `½·ρ·Cd·A / m` (1/m).
    pub fn drag_factor(&self) -> f64 {
        let radius_m = self.diameter / 2000.0;
        let area = std::f64::consts::PI * radius_m * radius_m;
        let mass_kg = self.weight / 1000.0;
        if mass_kg <= 0.0 {
            return 0.0;
        }
        0.5 * AIR_DENSITY * self.drag_coefficient * area / mass_kg
    }
}

// ---------------------------------------------------------------------------
// Spring mount
// ---------------------------------------------------------------------------

/// Solved spring-on-stud geometry for one spring/case pairing.
#[derive(Debug, Clone, PartialEq)]
struct SpringMount {
    /// Coil center relative to the stud center
    coil_center: Point2,
    coil_radius: f64,
    /// Angle at the coil center between the contact line and the leg, unloaded (deg)
    contact_angle: f64,
    /// Leg tangent point on the coil at full extension
    unloaded_vertex: Point2,
    /// Leg length from tangent point to contact, unloaded (mm)
    unloaded_leg: f64,
}

/// Loaded state of one spring at a carriage position.
#[derive(Debug, Clone, Copy)]
struct LegState {
    contact: Point2,
    vertex: Point2,
    deflection: f64,
}

impl SpringMount {
    fn solve(case: &CaseGeometry, spring: &SpringSpec) -> Result<Self, GeometryError> {
        // Coil inner radius resting against the stud, offset along the load.
        let inner = (spring.mean_diameter - spring.wire_diameter) / 2.0;
        let offset = inner - case.stud_radius;
        if offset < 0.0 {
            return Err(GeometryError::InvalidTriangle {
                a: inner,
                b: case.stud_radius,
                c: offset,
            });
        }
        let coil_center = Point2::new(
            geometry::adjacent_side(offset, case.stud_angle_offset),
            geometry::opposite_side(offset, case.stud_angle_offset),
        );

        // Unloaded contact: right angle at the tangent point.
        let coil_radius = spring.coil_radius();
        let contact = Self::contact_point(case, spring, case.max_carriage_position);
        let reach = coil_center.distance(contact);
        if reach < coil_radius {
            return Err(GeometryError::PointInsideCircle { distance: reach, radius: coil_radius });
        }
        let contact_angle = geometry::angle_from_adjacent(coil_radius, reach)?;

        // Leg length is the side opposite the contact angle.
        let unloaded_leg = geometry::law_of_sines_side(90.0, reach, contact_angle)?;
        let unloaded_vertex = geometry::tangent_point(coil_center, coil_radius, contact, TangentSide::Ccw)?;

        Ok(Self {
            coil_center,
            coil_radius,
            contact_angle,
            unloaded_vertex,
            unloaded_leg,
        })
    }

    /// Where the leg (wire centerline) touches the support pin.
    fn contact_point(case: &CaseGeometry, spring: &SpringSpec, position: f64) -> Point2 {
        let reach = case.support_radius + spring.wire_diameter / 2.0;
        case.support_center(position) + Point2::from_angle(180.0 + case.carriage_grip_angle) * reach
    }

    fn leg_state(
        &self,
        case: &CaseGeometry,
        spring: &SpringSpec,
        position: f64,
    ) -> Result<LegState, GeometryError> {
        let contact = Self::contact_point(case, spring, position);
        let vertex = geometry::tangent_point(self.coil_center, self.coil_radius, contact, TangentSide::Ccw)?;
        let chord = vertex.distance(self.unloaded_vertex);
        let wound = geometry::law_of_cosines_angle(self.coil_radius, self.coil_radius, chord)?;
        Ok(LegState {
            contact,
            vertex,
            deflection: spring.preload + wound,
        })
    }

    /// Along-rail force of both springs at `position` (N).
    fn travel_force(
        &self,
        case: &CaseGeometry,
        spring: &SpringSpec,
        position: f64,
    ) -> Result<f64, GeometryError> {
        let leg = self.leg_state(case, spring, position)?;
        let along_leg = leg.contact - leg.vertex;
        let arm = along_leg.length();
        if arm <= 0.0 {
            return Ok(0.0);
        }
        let force = spring.force_at_angle(leg.deflection, arm);

        // Leg force is normal to the leg, in the unwinding direction.
        let mut normal = along_leg.perp() * (1.0 / arm);
        let radial = leg.contact - self.coil_center;
        if radial.x * normal.y - radial.y * normal.x > 0.0 {
            normal = normal * -1.0;
        }
        let angle_to_horizontal = normal.angle_deg();
        let along_rail = geometry::adjacent_side(force, angle_to_horizontal).max(0.0);
        Ok(2.0 * along_rail)
    }
}

// ---------------------------------------------------------------------------
// Energy table
// ---------------------------------------------------------------------------

/// One `(position, cumulative energy)` sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EnergySample {
    /// Carriage position (mm)
    pub position: f64,
    /// Energy stored winding from full extension to `position` (N·mm)
    pub energy: f64,
}

/// Position → energy lookup, built top-down from full extension.
///
/// Positions strictly decrease; energy never decreases along the table.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EnergyTable {
    samples: Vec<EnergySample>,
}

impl EnergyTable {
    /// Integrate `force` (N) from `max_position` down to 0 in `step` mm
    /// increments, taking the force at the upper end of each step. The last
    /// step is shortened to land on 0 exactly.
    pub fn build<F>(max_position: f64, step: f64, mut force: F) -> Result<Self, GeometryError>
    where
        F: FnMut(f64) -> Result<f64, GeometryError>,
    {
        check_travel(max_position)?;
        let step = sanitize_step(step);
        let mut samples = Vec::with_capacity((max_position / step).ceil() as usize + 1);
        let mut position = max_position;
        let mut energy = 0.0;
        samples.push(EnergySample { position, energy });
        while position > 0.0 {
            let next = (position - step).max(0.0);
            energy += force(position)? * (position - next);
            position = next;
            samples.push(EnergySample { position, energy });
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[EnergySample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Linear interpolation between the two bracketing samples. 0 outside
    /// the table range or on an empty table.
    pub fn energy_at(&self, position: f64) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        if position.is_nan() || position > first.position || position < last.position {
            return 0.0;
        }
        // First sample at or below `position`.
        let j = self.samples.partition_point(|s| s.position > position);
        if j == 0 {
            return first.energy;
        }
        let hi = self.samples[j - 1];
        let lo = self.samples[j];
        let span = hi.position - lo.position;
        if span <= 0.0 {
            return lo.energy;
        }
        let t = (hi.position - position) / span;
        hi.energy + t * (lo.energy - hi.energy)
    }
}

fn check_travel(max_position: f64) -> Result<(), GeometryError> {
    if (0.0..=MAX_TRAVEL_MM).contains(&max_position) {
        Ok(())
    } else {
        Err(GeometryError::InvalidTravel { max_position })
    }
}

fn sanitize_step(step: f64) -> f64 {
    if step.is_finite() && step >= MIN_STEP_MM { step } else { DEFAULT_STEP_MM }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Spring, projectile and case state with the energy table derived from them.
///
/// Every setter rebuilds the table before returning, so a caller never sees
/// a table that belongs to a previous spring.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchEnergyModel {
    case: CaseGeometry,
    spring: Option<SpringSpec>,
    projectile: ProjectileSpec,
    step: f64,
    mount: Option<SpringMount>,
    table: EnergyTable,
}

impl LaunchEnergyModel {
    /// A model with no spring installed.
    pub fn new(case: CaseGeometry, projectile: ProjectileSpec, step: f64) -> Self {
        Self {
            case,
            spring: None,
            projectile,
            step,
            mount: None,
            table: EnergyTable::default(),
        }
    }

    pub fn with_spring(mut self, spring: SpringSpec) -> Result<Self, GeometryError> {
        self.set_spring(Some(spring))?;
        Ok(self)
    }

    pub fn case(&self) -> &CaseGeometry {
        &self.case
    }

    pub fn spring(&self) -> Option<&SpringSpec> {
        self.spring.as_ref()
    }

    pub fn projectile(&self) -> &ProjectileSpec {
        &self.projectile
    }

    pub fn table(&self) -> &EnergyTable {
        &self.table
    }

    pub fn max_position(&self) -> f64 {
        self.case.max_carriage_position
    }

    /// Install (or remove, with `None`) the spring pair.
    ///
    /// If the geometry cannot be solved the model is left with no spring and
    /// an empty table, and the error is returned.
    pub fn set_spring(&mut self, spring: Option<SpringSpec>) -> Result<(), GeometryError> {
        self.spring = spring;
        self.rebuild()
    }

    pub fn set_projectile(&mut self, projectile: ProjectileSpec) -> Result<(), GeometryError> {
        self.projectile = projectile;
        self.rebuild()
    }

    pub fn set_case(&mut self, case: CaseGeometry) -> Result<(), GeometryError> {
        self.case = case;
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<(), GeometryError> {
        self.mount = None;
        self.table = EnergyTable::default();
        if let Err(e) = check_travel(self.case.max_carriage_position) {
            self.spring = None;
            return Err(e);
        }
        let Some(spring) = self.spring.clone() else {
            return Ok(());
        };
        let built = SpringMount::solve(&self.case, &spring).and_then(|mount| {
            let case = &self.case;
            let table = EnergyTable::build(case.max_carriage_position, self.step, |p| {
                mount.travel_force(case, &spring, p)
            })?;
            Ok((mount, table))
        });
        match built {
            Ok((mount, table)) => {
                self.mount = Some(mount);
                self.table = table;
                Ok(())
            }
            Err(e) => {
                self.spring = None;
                Err(e)
            }
        }
    }

    /// Stored energy at carriage `position` (N·mm). 0 outside
    /// `[0, max_position]` or with no spring installed.
    pub fn potential_energy_at(&self, position: f64) -> f64 {
        self.table.energy_at(position)
    }

    /// Spring deflection at carriage `position` (deg). 0 outside
    /// `[0, max_position]` or with no spring installed.
    pub fn spring_angle_at(&self, position: f64) -> f64 {
        let (Some(mount), Some(spring)) = (&self.mount, &self.spring) else {
            return 0.0;
        };
        if !(0.0..=self.max_position()).contains(&position) {
            return 0.0;
        }
        mount
            .leg_state(&self.case, spring, position)
            .map(|leg| leg.deflection)
            .unwrap_or(0.0)
    }

    /// Unloaded contact angle of the solved mount (deg), if a spring is installed.
    pub fn contact_angle(&self) -> Option<f64> {
        self.mount.as_ref().map(|m| m.contact_angle)
    }

    /// Unloaded leg length of the solved mount (mm), if a spring is installed.
    pub fn unloaded_leg_length(&self) -> Option<f64> {
        self.mount.as_ref().map(|m| m.unloaded_leg)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_spring() -> SpringSpec {
        SpringSpec {
            id: 1,
            name: "1.5mm music wire".into(),
            wire_diameter: 1.5,
            mean_diameter: 12.0,
            active_coils: 5.0,
            elastic_modulus: 200_000.0,
            preload: 30.0,
        }
    }

    pub(crate) fn test_model() -> LaunchEnergyModel {
        LaunchEnergyModel::new(CaseGeometry::default(), ProjectileSpec::default(), DEFAULT_STEP_MM)
            .with_spring(test_spring())
            .unwrap()
    }

    #[test]
    fn table_runs_top_down_at_fixed_step() {
        let model = test_model();
        let samples = model.table().samples();
        assert_eq!(samples.len(), 61);
        assert_eq!(samples[0].position, 60.0);
        assert_eq!(samples[0].energy, 0.0);
        assert_eq!(samples[60].position, 0.0);
        for pair in samples.windows(2) {
            assert!(pair[1].position < pair[0].position);
            assert!(pair[1].energy >= pair[0].energy);
        }
    }

    #[test]
    fn table_takes_force_at_upper_end_of_each_step() {
        let table = EnergyTable::build(3.0, 1.0, |p| Ok(p)).unwrap();
        let energies: Vec<f64> = table.samples().iter().map(|s| s.energy).collect();
        assert_eq!(energies, vec![0.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn out_of_range_travel_is_rejected() {
        for max in [-1.0, f64::NAN, f64::INFINITY, MAX_TRAVEL_MM + 1.0] {
            let err = EnergyTable::build(max, 1.0, |_| Ok(1.0)).unwrap_err();
            assert!(matches!(err, GeometryError::InvalidTravel { .. }));

            let case = CaseGeometry { max_carriage_position: max, ..CaseGeometry::default() };
            let err = LaunchEnergyModel::new(case, ProjectileSpec::default(), DEFAULT_STEP_MM)
                .with_spring(test_spring())
                .unwrap_err();
            assert!(matches!(err, GeometryError::InvalidTravel { .. }));
        }
    }

    #[test]
    fn degenerate_step_falls_back_to_default() {
        for step in [0.0, -2.0, 1e-300, f64::NAN] {
            let table = EnergyTable::build(5.0, step, |_| Ok(1.0)).unwrap();
            assert_eq!(table.samples().len(), 6, "step {step}");
        }
        let model = LaunchEnergyModel::new(CaseGeometry::default(), ProjectileSpec::default(), 1e-300)
            .with_spring(test_spring())
            .unwrap();
        assert_eq!(model.table().samples().len(), 61);
    }

    #[test]
    fn energy_is_non_increasing_in_position() {
        let model = test_model();
        let mut prev = model.potential_energy_at(0.0);
        let mut p = 0.0;
        while p <= 60.0 {
            let e = model.potential_energy_at(p);
            assert!(e <= prev + 1e-9, "energy rose at {p}: {e} > {prev}");
            prev = e;
            p += 0.37;
        }
        assert!(model.potential_energy_at(0.0) > 0.0);
    }

    #[test]
    fn energy_is_zero_outside_travel() {
        let model = test_model();
        assert_eq!(model.potential_energy_at(-0.01), 0.0);
        assert_eq!(model.potential_energy_at(60.01), 0.0);
        assert_eq!(model.potential_energy_at(f64::NAN), 0.0);
        assert_eq!(model.potential_energy_at(60.0), 0.0);
    }

    #[test]
    fn no_spring_is_a_valid_zero_state() {
        let model =
            LaunchEnergyModel::new(CaseGeometry::default(), ProjectileSpec::default(), DEFAULT_STEP_MM);
        assert!(model.table().is_empty());
        assert_eq!(model.potential_energy_at(10.0), 0.0);
        assert_eq!(model.spring_angle_at(10.0), 0.0);
        assert_eq!(model.contact_angle(), None);
    }

    #[test]
    fn interpolates_between_samples() {
        let model = test_model();
        let a = model.potential_energy_at(30.0);
        let b = model.potential_energy_at(29.0);
        let mid = model.potential_energy_at(29.5);
        assert!((mid - (a + b) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn spring_angle_winds_up_from_preload() {
        let model = test_model();
        let relaxed = model.spring_angle_at(60.0);
        assert!((relaxed - 30.0).abs() < 1e-6, "relaxed deflection {relaxed}");
        let drawn = model.spring_angle_at(0.0);
        assert!(drawn > relaxed && drawn < 30.0 + 180.0);
        assert_eq!(model.spring_angle_at(61.0), 0.0);
    }

    #[test]
    fn swapping_spring_rebuilds_table() {
        let mut model = test_model();
        let soft = model.potential_energy_at(0.0);
        let stiff = SpringSpec { wire_diameter: 1.8, ..test_spring() };
        model.set_spring(Some(stiff)).unwrap();
        assert!(model.potential_energy_at(0.0) > soft);
        model.set_spring(None).unwrap();
        assert!(model.table().is_empty());
        assert_eq!(model.potential_energy_at(0.0), 0.0);
    }

    #[test]
    fn unsolvable_mount_clears_spring() {
        let mut model = test_model();
        // Coil tighter than the stud.
        let tiny = SpringSpec { mean_diameter: 4.0, ..test_spring() };
        assert!(model.set_spring(Some(tiny)).is_err());
        assert!(model.spring().is_none());
        assert_eq!(model.potential_energy_at(10.0), 0.0);
    }

    #[test]
    fn mount_triangles_agree() {
        let model = test_model();
        let contact = model.contact_angle().unwrap();
        assert!(contact > 0.0 && contact < 90.0);
        assert!(model.unloaded_leg_length().unwrap() > 0.0);
    }

    #[test]
    fn torsion_rate() {
        let spring = test_spring();
        // E·d⁴/(64·D·n) = 200000·5.0625/3840 N·mm/rad
        let expected = 200_000.0 * 5.0625 / 3840.0 * std::f64::consts::PI / 180.0;
        assert!((spring.rate_per_degree() - expected).abs() < 1e-9);
        assert_eq!(spring.force_at_angle(10.0, 0.0), 0.0);
        assert!((spring.force_at_angle(10.0, 20.0) - expected * 0.5).abs() < 1e-9);
    }

    #[test]
    fn drag_factor_scales_with_area_over_mass() {
        let p = ProjectileSpec::default();
        let heavy = ProjectileSpec { weight: 10.0, ..p.clone() };
        assert!((p.drag_factor() - 2.0 * heavy.drag_factor()).abs() < 1e-12);
        assert_eq!(ProjectileSpec { weight: 0.0, ..p }.drag_factor(), 0.0);
    }
}
