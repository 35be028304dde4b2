//! Connection-scoped device context.
//!
//! One [`Device`] exists per connected launcher. It owns the energy model,
//! the simulation worker and the calibration session, and is dropped (or
//! [`Device::disconnect`]ed) with the connection.
//!
//! The transport feeds every notification to [`Device::on_notify`] and polls
//! [`Device::poll`] now and then for calibration timeouts. Nothing here
//! blocks on the device.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::calibration::{CalibrationSession, CalibrationState};
use crate::channel::Channel;
use crate::config::DeviceConfig;
use crate::energy::LaunchEnergyModel;
use crate::error::{CalibrationError, GeometryError};
use crate::link::{Envelope, Link, LinkError};
use crate::protocol::config::{ConfigCommand, ConfigResponse, ConfigTarget, Param, WireVersion};
use crate::protocol::sensor::{ResetKind, SensorId, SensorSample};
use crate::protocol::user::{ExtStoreParam, UserParam};
use crate::protocol::{Command, Message};
use crate::trajectory::{Prediction, ShotInput, Tuning};
use crate::worker::{Latest, SimulationRequest, SimulationWorker};

/// Errors from device operations.
#[derive(Debug)]
pub enum DeviceError {
    /// Outgoing write failed.
    Link(LinkError),
    /// Spring/case geometry could not be solved.
    Geometry(GeometryError),
    Calibration(CalibrationError),
    /// The simulation thread could not be started.
    Spawn(io::Error),
    /// The connected firmware's config layout cannot address `param`.
    Unsupported { param: Param, version: WireVersion },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Link(e) => write!(f, "link error: {e}"),
            DeviceError::Geometry(e) => write!(f, "geometry error: {e}"),
            DeviceError::Calibration(e) => write!(f, "calibration error: {e}"),
            DeviceError::Spawn(e) => write!(f, "failed to start simulation thread: {e}"),
            DeviceError::Unsupported { param, version } => {
                write!(f, "{param} is not addressable with {version:?} config layout")
            }
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Link(e) => Some(e),
            DeviceError::Geometry(e) => Some(e),
            DeviceError::Calibration(e) => Some(e),
            DeviceError::Spawn(e) => Some(e),
            DeviceError::Unsupported { .. } => None,
        }
    }
}

impl From<LinkError> for DeviceError {
    fn from(e: LinkError) -> Self {
        DeviceError::Link(e)
    }
}

impl From<GeometryError> for DeviceError {
    fn from(e: GeometryError) -> Self {
        DeviceError::Geometry(e)
    }
}

impl From<CalibrationError> for DeviceError {
    fn from(e: CalibrationError) -> Self {
        DeviceError::Calibration(e)
    }
}

/// Latest readings that feed a simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ShotState {
    /// Carriage position (mm); no simulation until the first reading
    position: Option<f64>,
    launch_angle: f64,
    device_height: f64,
    lens_offset: f64,
    target_distance: f64,
    target_height: f64,
}

impl ShotState {
    fn input(&self) -> Option<ShotInput> {
        Some(ShotInput {
            position: self.position?,
            launch_angle: self.launch_angle,
            device_height: self.device_height,
            lens_offset: self.lens_offset,
            target_distance: self.target_distance,
        })
    }
}

/// A connected launcher.
pub struct Device {
    config: DeviceConfig,
    /// Replaced wholesale on every spring/projectile change.
    model: Arc<LaunchEnergyModel>,
    tuning: Tuning,
    shot: ShotState,
    worker: SimulationWorker,
    calibration: Option<CalibrationSession>,
    /// Sampling was on when calibration began; turn it back on after.
    resume_sampling: bool,
    sampling: bool,
    shot_counter: Option<i32>,
    link: Box<dyn Link>,
    on_send: Option<Box<dyn FnMut(&Command, Channel)>>,
    on_recv: Option<Box<dyn FnMut(&Envelope)>>,
    on_log: Option<Box<dyn FnMut(&str)>>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("spring", &self.model.spring().map(|s| s.id))
            .field("projectile", &self.model.projectile().id)
            .field("tuning", &self.tuning)
            .field("shot", &self.shot)
            .field("calibration", &self.calibration_state())
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Set up a device context and start its simulation thread.
    pub fn new(config: DeviceConfig, link: impl Link + 'static) -> Result<Self, DeviceError> {
        let model = config.energy_model()?;
        let worker = SimulationWorker::spawn().map_err(DeviceError::Spawn)?;
        let shot = ShotState {
            position: None,
            launch_angle: 0.0,
            device_height: 0.0,
            lens_offset: config.lens_offset,
            target_distance: 0.0,
            target_height: config.target_height,
        };
        Ok(Self {
            tuning: config.tuning,
            config,
            model: Arc::new(model),
            shot,
            worker,
            calibration: None,
            resume_sampling: false,
            sampling: false,
            shot_counter: None,
            link: Box::new(link),
            on_send: None,
            on_recv: None,
            on_log: None,
        })
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    /// Register a callback invoked before every outgoing write.
    pub fn set_on_send(&mut self, f: impl FnMut(&Command, Channel) + 'static) {
        self.on_send = Some(Box::new(f));
    }

    /// Register a callback invoked after every successful notification decode.
    pub fn set_on_recv(&mut self, f: impl FnMut(&Envelope) + 'static) {
        self.on_recv = Some(Box::new(f));
    }

    /// Register a callback for dropped payloads, ignored responses and
    /// calibration progress.
    pub fn set_on_log(&mut self, f: impl FnMut(&str) + 'static) {
        self.on_log = Some(Box::new(f));
    }

    fn log(&mut self, msg: &str) {
        if let Some(cb) = self.on_log.as_mut() {
            cb(msg);
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Snapshot of the current energy model.
    pub fn model(&self) -> Arc<LaunchEnergyModel> {
        Arc::clone(&self.model)
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Inputs of the next simulation, once a carriage position is known.
    pub fn shot_input(&self) -> Option<ShotInput> {
        self.shot.input()
    }

    pub fn target_height(&self) -> f64 {
        self.shot.target_height
    }

    pub fn sampling_enabled(&self) -> bool {
        self.sampling
    }

    /// Shot counter from extended storage, once read.
    pub fn shot_counter(&self) -> Option<i32> {
        self.shot_counter
    }

    /// The channel predictions are published on.
    pub fn predictions(&self) -> Latest<Prediction> {
        self.worker.results()
    }

    pub fn latest_prediction(&self) -> Option<Prediction> {
        self.worker.results().get()
    }

    pub fn calibration(&self) -> Option<&CalibrationSession> {
        self.calibration.as_ref()
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.as_ref().map_or(CalibrationState::Na, |s| s.state())
    }

    pub fn calibration_status(&self) -> Option<&str> {
        self.calibration.as_ref().map(|s| s.status())
    }

    // -----------------------------------------------------------------------
    // Outgoing
    // -----------------------------------------------------------------------

    /// Encode and write a command.
    pub fn send(&mut self, cmd: &Command) -> Result<(), LinkError> {
        let channel = cmd.channel();
        if let Some(cb) = self.on_send.as_mut() {
            cb(cmd, channel);
        }
        let payload = cmd.encode(self.config.wire_version);
        self.link.write(channel, &payload)
    }

    /// Send commands produced while handling a notification. Errors are
    /// logged, not returned.
    fn send_logged(&mut self, cmds: Vec<Command>) {
        for cmd in cmds {
            if let Err(e) = self.send(&cmd) {
                let msg = format!("send {} failed: {e}", cmd.channel());
                self.log(&msg);
            }
        }
    }

    fn check_addressable(&self, param: Param) -> Result<(), DeviceError> {
        let version = self.config.wire_version;
        if version == WireVersion::V1 && param.target() != ConfigTarget::Sensor {
            return Err(DeviceError::Unsupported { param, version });
        }
        Ok(())
    }

    /// Read every user and extended-storage parameter. Values are applied
    /// as the responses arrive.
    pub fn request_sync(&mut self) -> Result<(), DeviceError> {
        let params = UserParam::ALL
            .iter()
            .map(|p| Param::User(*p))
            .chain(ExtStoreParam::ALL.iter().map(|p| Param::ExtStore(*p)));
        for param in params {
            self.check_addressable(param)?;
            self.send(&Command::Config(ConfigCommand::get(param)))?;
        }
        Ok(())
    }

    /// Write a user parameter, and persist it on the device if `store`.
    ///
    /// The local value changes when the device answers.
    pub fn write_user_param(&mut self, param: UserParam, value: f32, store: bool) -> Result<(), DeviceError> {
        let param = Param::User(param);
        self.check_addressable(param)?;
        self.send(&Command::Config(ConfigCommand::set_float(param, value)))?;
        if store {
            self.send(&Command::Config(ConfigCommand::store(param)))?;
        }
        Ok(())
    }

    pub fn set_sampling(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.send(&Command::SampleEnable(enabled))?;
        Ok(())
    }

    pub fn reset(&mut self, kind: ResetKind) -> Result<(), DeviceError> {
        self.send(&Command::Reset(kind))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Calibration
    // -----------------------------------------------------------------------

    /// Start calibrating `sensor`, abandoning any calibration in progress.
    pub fn start_calibration(&mut self, sensor: SensorId) -> Result<(), DeviceError> {
        self.start_calibration_at(sensor, Instant::now())
    }

    pub fn start_calibration_at(&mut self, sensor: SensorId, now: Instant) -> Result<(), DeviceError> {
        let timeout = self.config.calibration_timeout();
        let was_active = self.calibration.as_ref().is_some_and(|s| s.is_active());
        let mut session = match self.calibration.take() {
            Some(s) if s.sensor() == sensor => s,
            previous => match CalibrationSession::new(sensor, timeout) {
                Ok(s) => s,
                Err(e) => {
                    self.calibration = previous;
                    return Err(e.into());
                }
            },
        };
        if !was_active {
            self.resume_sampling = self.sampling;
        }
        let cmds = session.begin(self.sampling, now);
        let status = session.status().to_string();
        self.calibration = Some(session);
        self.log(&status);
        for cmd in cmds {
            self.send(&cmd)?;
        }
        Ok(())
    }

    /// Abandon the calibration. Safe to call at any time.
    pub fn stop_calibration(&mut self) {
        let Some(session) = self.calibration.as_mut() else {
            return;
        };
        session.stop();
        let status = session.status().to_string();
        self.log(&status);
        self.finish_calibration();
    }

    /// Fail a calibration whose device has gone quiet.
    pub fn poll(&mut self, now: Instant) {
        let Some(session) = self.calibration.as_mut() else {
            return;
        };
        if session.check_timeout(now) {
            let status = session.status().to_string();
            self.log(&status);
            self.finish_calibration();
        }
    }

    /// Turn sampling back on once a calibration is no longer running.
    fn finish_calibration(&mut self) {
        let active = self.calibration.as_ref().is_some_and(|s| s.is_active());
        if active || !self.resume_sampling {
            return;
        }
        self.resume_sampling = false;
        self.send_logged(vec![Command::SampleEnable(true)]);
    }

    // -----------------------------------------------------------------------
    // Incoming
    // -----------------------------------------------------------------------

    /// Handle a notification payload. Never fails: malformed payloads are
    /// logged and dropped.
    pub fn on_notify(&mut self, channel: Channel, payload: &[u8]) {
        self.on_notify_at(channel, payload, Instant::now());
    }

    pub fn on_notify_at(&mut self, channel: Channel, payload: &[u8], now: Instant) {
        let env = match Envelope::decode(channel, payload, self.config.wire_version) {
            Ok(env) => env,
            Err(e) => {
                self.log(&format!("dropped {channel} payload: {e}"));
                return;
            }
        };
        if let Some(cb) = self.on_recv.as_mut() {
            cb(&env);
        }

        match env.message {
            Message::ConfigResponse(resp) => self.handle_response(&resp, now),
            Message::SampleState(enabled) => {
                self.sampling = enabled;
                if let Some(session) = self.calibration.as_mut() {
                    let cmds = session.on_sample_state(enabled, now);
                    if !cmds.is_empty() {
                        let status = session.status().to_string();
                        self.log(&status);
                        self.send_logged(cmds);
                    }
                }
            }
            Message::Sample(sample) => self.handle_sample(sample),
            Message::Unknown { channel, payload } => {
                self.log(&format!("ignored {}B on write-only {channel}", payload.len()));
            }
        }
    }

    fn handle_response(&mut self, resp: &ConfigResponse, now: Instant) {
        if let Some(session) = self.calibration.as_mut()
            && let Some(cmds) = session.on_response(resp, now)
        {
            let status = session.status().to_string();
            self.log(&status);
            self.send_logged(cmds);
            self.finish_calibration();
            return;
        }
        self.apply_response(resp);
    }

    /// General config sync: apply whatever the device reports.
    fn apply_response(&mut self, resp: &ConfigResponse) {
        let param = resp.param();
        if !resp.status.is_applicable() {
            self.log(&format!("ignored {param} {}", resp.status));
            return;
        }
        match param {
            Param::User(p) => {
                let value = f64::from(resp.value_f32());
                match p {
                    UserParam::ForceOffset => self.tuning.force_offset = value,
                    UserParam::Efficiency => self.tuning.efficiency = value,
                    UserParam::Friction => self.tuning.friction = value,
                    UserParam::TargetHeight => self.shot.target_height = value,
                    UserParam::LensOffset => self.shot.lens_offset = value,
                }
                self.resimulate();
            }
            Param::ExtStore(ExtStoreParam::SpringModel) => {
                if let Err(e) = self.install_spring(resp.value) {
                    self.log(&format!("spring model {}: {e}", resp.value));
                }
            }
            Param::ExtStore(ExtStoreParam::ProjectileModel) => {
                if let Err(e) = self.install_projectile(resp.value) {
                    self.log(&format!("projectile model {}: {e}", resp.value));
                }
            }
            Param::ExtStore(ExtStoreParam::ShotCounter) => self.shot_counter = Some(resp.value),
            Param::Sensor(_) | Param::Unknown { .. } => {
                self.log(&format!("ignored unsolicited {param} {}", resp.status));
            }
        }
    }

    fn handle_sample(&mut self, sample: SensorSample) {
        let mm = f64::from(sample.distance_mm);
        match sample.sensor {
            SensorId::Position => self.shot.position = Some(mm),
            SensorId::Height => self.shot.device_height = mm / 1000.0,
            SensorId::Unknown(_) => {
                self.log(&format!("sample from unknown {}", sample.sensor));
                return;
            }
        }
        self.resimulate();
    }

    // -----------------------------------------------------------------------
    // Shot inputs
    // -----------------------------------------------------------------------

    /// Device pitch from the host's orientation sensor (deg).
    pub fn update_orientation(&mut self, pitch: f64) {
        self.shot.launch_angle = pitch;
        self.resimulate();
    }

    /// Horizontal distance to the target (m).
    pub fn set_target(&mut self, distance: f64) {
        self.shot.target_distance = distance;
        self.resimulate();
    }

    /// Install spring model `id` from the catalog; `id <= 0` removes it.
    pub fn install_spring(&mut self, id: i32) -> Result<(), DeviceError> {
        let spring = if id <= 0 {
            None
        } else {
            let spec = self.config.spring(id).cloned();
            if spec.is_none() {
                self.log(&format!("unknown spring model {id}, keeping current"));
                return Ok(());
            }
            spec
        };
        let mut model = LaunchEnergyModel::clone(&self.model);
        let result = model.set_spring(spring);
        // Even on error the model is in a valid (spring-less) state.
        self.model = Arc::new(model);
        self.resimulate();
        result.map_err(DeviceError::from)
    }

    /// Install projectile model `id` from the catalog.
    pub fn install_projectile(&mut self, id: i32) -> Result<(), DeviceError> {
        let Some(spec) = self.config.projectile(id).cloned() else {
            self.log(&format!("unknown projectile model {id}, keeping current"));
            return Ok(());
        };
        let mut model = LaunchEnergyModel::clone(&self.model);
        let result = model.set_projectile(spec);
        self.model = Arc::new(model);
        self.resimulate();
        result.map_err(DeviceError::from)
    }

    fn resimulate(&mut self) {
        let Some(input) = self.shot.input() else {
            return;
        };
        self.worker.submit(SimulationRequest {
            model: Arc::clone(&self.model),
            tuning: self.tuning,
            input,
            target_height: self.shot.target_height,
        });
    }

    /// Tear down the connection scope: abandon calibration and stop the
    /// simulation thread.
    pub fn disconnect(mut self) {
        if let Some(session) = self.calibration.as_mut() {
            session.stop();
        }
        self.calibration = None;
        self.worker.stop();
        if self.worker.panicked() {
            self.log("simulation thread panicked");
        }
        self.log("disconnected");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::link::MemoryLink;
    use crate::protocol::config::{ConfigCmd, ConfigStatus};
    use crate::protocol::sensor::SensorParam;

    const WAIT: Duration = Duration::from_secs(5);

    fn device() -> (Device, MemoryLink, Rc<RefCell<Vec<String>>>) {
        let link = MemoryLink::new();
        let mut dev = Device::new(DeviceConfig::default(), link.clone()).unwrap();
        let logs = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&logs);
        dev.set_on_log(move |msg| sink.borrow_mut().push(msg.to_string()));
        (dev, link, logs)
    }

    fn response(target: ConfigTarget, param_id: u8, status: ConfigStatus, value: i32) -> Vec<u8> {
        ConfigResponse { target, status, param_id, value }.encode(WireVersion::V2)
    }

    /// Decode the config commands among `writes`.
    fn config_writes(writes: &[(Channel, Vec<u8>)]) -> Vec<ConfigCommand> {
        writes
            .iter()
            .filter(|(ch, _)| *ch == Channel::Config)
            .map(|(_, raw)| ConfigCommand::decode(raw, WireVersion::V2).unwrap())
            .collect()
    }

    /// Answer every config command the device writes with `status` until
    /// it stops writing. Returns the number answered.
    fn answer_all(dev: &mut Device, link: &MemoryLink, status: ConfigStatus) -> usize {
        let mut answered = 0;
        loop {
            let cmds = config_writes(&link.drain());
            if cmds.is_empty() {
                return answered;
            }
            for cmd in cmds {
                let raw = response(cmd.target, cmd.param_id, status, cmd.value);
                dev.on_notify(Channel::Config, &raw);
                answered += 1;
            }
        }
    }

    #[test]
    fn position_sample_publishes_prediction() {
        let (mut dev, _link, _logs) = device();
        let mut sub = dev.predictions().subscribe();
        dev.update_orientation(30.0);
        dev.set_target(2.0);
        assert!(sub.try_next().is_none());

        dev.on_notify(Channel::Samples, &SensorSample { sensor: SensorId::Position, distance_mm: 0 }.encode());
        let p = sub.wait_timeout(WAIT).unwrap();
        assert_eq!(p.input.position, 0.0);
        assert_eq!(p.input.launch_angle, 30.0);
        assert!(p.impact.distance > 0.0);
    }

    #[test]
    fn height_sample_is_converted_to_metres() {
        let (mut dev, _link, _logs) = device();
        dev.on_notify(Channel::Samples, &SensorSample { sensor: SensorId::Position, distance_mm: 10 }.encode());
        dev.on_notify(Channel::Samples, &SensorSample { sensor: SensorId::Height, distance_mm: 1250 }.encode());
        assert_eq!(dev.shot_input().unwrap().device_height, 1.25);
    }

    #[test]
    fn malformed_payloads_are_logged_and_dropped() {
        let (mut dev, _link, logs) = device();
        dev.on_notify(Channel::Config, &[0x00, 0x01]);
        dev.on_notify(Channel::Samples, &[0x00]);
        dev.on_notify(Channel::Reset, &[0x01]);
        let logs = logs.borrow();
        assert_eq!(logs.len(), 3);
        assert!(logs[0].starts_with("dropped CONFIG payload"));
        assert!(logs[2].contains("write-only RESET"));
        assert!(dev.shot_input().is_none());
    }

    #[test]
    fn hooks_see_traffic() {
        let (mut dev, _link, _logs) = device();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sent = Rc::clone(&seen);
        dev.set_on_send(move |cmd, ch| sent.borrow_mut().push(format!("{ch} {}", cmd.debug_hex(WireVersion::V2))));
        let recv = Rc::clone(&seen);
        dev.set_on_recv(move |env| recv.borrow_mut().push(format!("{env:?}")));

        dev.set_sampling(true).unwrap();
        dev.on_notify(Channel::SampleEnable, &[0x01]);
        let seen = seen.borrow();
        assert_eq!(seen[0], "SAMPLE_ENABLE HOST→SAMPLE_ENABLE 1B | 01");
        assert_eq!(seen[1], "SampleState(true) [SAMPLE_ENABLE 1B | 01]");
        assert!(dev.sampling_enabled());
    }

    #[test]
    fn calibration_runs_to_finished() {
        let (mut dev, link, _logs) = device();
        dev.start_calibration(SensorId::Position).unwrap();
        let writes = link.drain();
        assert_eq!(writes[0], (Channel::SensorSelect, vec![0x00]));
        let get = ConfigCommand::decode(&writes[1].1, WireVersion::V2).unwrap();
        assert_eq!(get.command, ConfigCmd::Get);
        assert_eq!(get.param(), Param::Sensor(SensorParam::Config));

        dev.on_notify(Channel::Config, &response(ConfigTarget::Sensor, 0, ConfigStatus::Ok, 0));
        let answered = answer_all(&mut dev, &link, ConfigStatus::Ok);
        assert_eq!(answered, 10);
        assert_eq!(dev.calibration_state(), CalibrationState::Finished);
        assert!(dev.calibration_status().unwrap().ends_with("calibration finished"));
    }

    #[test]
    fn calibration_pauses_and_resumes_sampling() {
        let (mut dev, link, _logs) = device();
        dev.on_notify(Channel::SampleEnable, &[0x01]);
        dev.start_calibration(SensorId::Height).unwrap();
        assert_eq!(
            link.drain(),
            vec![(Channel::SensorSelect, vec![0x01]), (Channel::SampleEnable, vec![0x00])]
        );

        dev.on_notify(Channel::SampleEnable, &[0x00]);
        assert_eq!(dev.calibration_state(), CalibrationState::Prepare);
        assert_eq!(answer_all(&mut dev, &link, ConfigStatus::Ok), 10);
        assert_eq!(dev.calibration_state(), CalibrationState::Finished);

        // Last write is the resume; answer_all already drained it.
        dev.stop_calibration();
        assert!(link.drain().is_empty());
    }

    #[test]
    fn calibration_error_resumes_sampling() {
        let (mut dev, link, _logs) = device();
        dev.on_notify(Channel::SampleEnable, &[0x01]);
        dev.start_calibration(SensorId::Position).unwrap();
        dev.on_notify(Channel::SampleEnable, &[0x00]);
        link.drain();
        dev.on_notify(Channel::Config, &response(ConfigTarget::Sensor, 0, ConfigStatus::Ok, 0));
        link.drain();
        dev.on_notify(
            Channel::Config,
            &response(ConfigTarget::Sensor, SensorParam::PowerLevel.id(), ConfigStatus::Invalid, 0),
        );
        assert_eq!(dev.calibration_state(), CalibrationState::Error);
        assert_eq!(link.drain(), vec![(Channel::SampleEnable, vec![0x01])]);
    }

    #[test]
    fn calibration_times_out_on_poll() {
        let (mut dev, _link, logs) = device();
        let now = Instant::now();
        dev.start_calibration_at(SensorId::Position, now).unwrap();
        dev.poll(now + Duration::from_secs(1));
        assert_eq!(dev.calibration_state(), CalibrationState::Prepare);
        dev.poll(now + Duration::from_secs(11));
        assert_eq!(dev.calibration_state(), CalibrationState::Error);
        assert!(logs.borrow().last().unwrap().contains("timed out"));
    }

    #[test]
    fn switching_sensor_replaces_session() {
        let (mut dev, link, _logs) = device();
        dev.start_calibration(SensorId::Position).unwrap();
        dev.start_calibration(SensorId::Height).unwrap();
        assert_eq!(dev.calibration().unwrap().sensor(), SensorId::Height);
        let writes = link.drain();
        assert_eq!(writes[2], (Channel::SensorSelect, vec![0x01]));
    }

    #[test]
    fn unknown_sensor_cannot_calibrate() {
        let (mut dev, link, _logs) = device();
        let err = dev.start_calibration(SensorId::Unknown(5)).unwrap_err();
        assert!(matches!(err, DeviceError::Calibration(CalibrationError::UnknownSensor(_))));
        assert!(link.drain().is_empty());
    }

    #[test]
    fn user_responses_update_tuning() {
        let (mut dev, _link, logs) = device();
        let raw = |status, value: f32| {
            response(ConfigTarget::User, UserParam::ForceOffset.id(), status, value.to_bits() as i32)
        };
        dev.on_notify(Channel::Config, &raw(ConfigStatus::Updated, 1.2));
        assert_eq!(dev.tuning().force_offset, f64::from(1.2f32));
        dev.on_notify(Channel::Config, &raw(ConfigStatus::Mismatch, 0.75));
        assert_eq!(dev.tuning().force_offset, 0.75);

        dev.on_notify(Channel::Config, &raw(ConfigStatus::Invalid, 1.9));
        assert_eq!(dev.tuning().force_offset, 0.75);
        assert_eq!(logs.borrow().last().unwrap(), "ignored force offset INVALID");

        let height = response(ConfigTarget::User, UserParam::TargetHeight.id(), ConfigStatus::Ok, 0.5f32.to_bits() as i32);
        dev.on_notify(Channel::Config, &height);
        assert_eq!(dev.target_height(), 0.5);
    }

    #[test]
    fn ext_store_installs_catalog_entries() {
        let (mut dev, _link, logs) = device();
        let before = dev.model();
        let spring = |id| response(ConfigTarget::ExtStore, ExtStoreParam::SpringModel.id(), ConfigStatus::Ok, id);

        dev.on_notify(Channel::Config, &spring(2));
        assert_eq!(dev.model().spring().map(|s| s.id), Some(2));
        assert!(dev.model().potential_energy_at(0.0) > before.potential_energy_at(0.0));
        // Old snapshots are untouched.
        assert_eq!(before.spring().map(|s| s.id), Some(1));

        dev.on_notify(Channel::Config, &spring(9));
        assert_eq!(dev.model().spring().map(|s| s.id), Some(2));
        assert!(logs.borrow().last().unwrap().contains("unknown spring model 9"));

        dev.on_notify(Channel::Config, &spring(0));
        assert!(dev.model().spring().is_none());

        let projectile = response(ConfigTarget::ExtStore, ExtStoreParam::ProjectileModel.id(), ConfigStatus::Ok, 2);
        dev.on_notify(Channel::Config, &projectile);
        assert_eq!(dev.model().projectile().id, 2);

        let counter = response(ConfigTarget::ExtStore, ExtStoreParam::ShotCounter.id(), ConfigStatus::Ok, 311);
        dev.on_notify(Channel::Config, &counter);
        assert_eq!(dev.shot_counter(), Some(311));
    }

    #[test]
    fn unsolicited_sensor_response_is_ignored() {
        let (mut dev, _link, logs) = device();
        dev.on_notify(
            Channel::Config,
            &response(ConfigTarget::Sensor, SensorParam::PowerLevel.id(), ConfigStatus::Ok, 1),
        );
        assert_eq!(logs.borrow()[0], "ignored unsolicited power level OK");
    }

    #[test]
    fn request_sync_reads_every_parameter() {
        let (mut dev, link, _logs) = device();
        dev.request_sync().unwrap();
        let cmds = config_writes(&link.drain());
        assert_eq!(cmds.len(), UserParam::ALL.len() + ExtStoreParam::ALL.len());
        assert!(cmds.iter().all(|c| c.command == ConfigCmd::Get));
        assert_eq!(cmds[0].param(), Param::User(UserParam::ForceOffset));
    }

    #[test]
    fn write_user_param_sets_and_stores() {
        let (mut dev, link, _logs) = device();
        dev.write_user_param(UserParam::Friction, 0.4, true).unwrap();
        let cmds = config_writes(&link.drain());
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].command, ConfigCmd::Set);
        assert_eq!(cmds[0].value, 0.4f32.to_bits() as i32);
        assert_eq!(cmds[1].command, ConfigCmd::Store);
        // Applied only once the device answers.
        assert_eq!(dev.tuning().friction, Tuning::default().friction);
    }

    #[test]
    fn v1_layout_cannot_address_user_namespace() {
        let link = MemoryLink::new();
        let config = DeviceConfig { wire_version: WireVersion::V1, ..DeviceConfig::default() };
        let mut dev = Device::new(config, link.clone()).unwrap();
        let err = dev.request_sync().unwrap_err();
        assert!(matches!(err, DeviceError::Unsupported { version: WireVersion::V1, .. }));
        assert!(link.drain().is_empty());

        // Calibration still works on the 6-byte layout.
        dev.start_calibration(SensorId::Position).unwrap();
        let writes = link.drain();
        assert_eq!(writes[1].1.len(), 6);
    }

    #[test]
    fn closed_link_is_reported() {
        let (mut dev, link, _logs) = device();
        link.close();
        assert!(matches!(dev.reset(ResetKind::Reboot), Err(DeviceError::Link(LinkError::Closed))));
    }

    #[test]
    fn disconnect_stops_everything() {
        let (mut dev, _link, logs) = device();
        dev.start_calibration(SensorId::Position).unwrap();
        dev.disconnect();
        assert_eq!(logs.borrow().last().unwrap(), "disconnected");
    }
}
