use std::fmt::{self, Display};

use tracing::{error, info, instrument, warn};

use loraprov_device::{DeviceClient, Transport};
use loraprov_remote::{Orchestrator, RegistrationStep};
use loraprov_util::types::{AppKey, DevEui, DeviceId};

/// Stage at which a session gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    EuiRead,
    KeyWrite,
    Registration(RegistrationStep),
}

/// Provisioning progress. States only ever move forward; `Failed` and
/// `Done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    EuiRead,
    KeyGenerated,
    KeyWritten,
    RegisteredRemote,
    Inventoried,
    Done,
    Failed(FailedStage),
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Start => f.write_str("START"),
            SessionState::EuiRead => f.write_str("EUI_READ"),
            SessionState::KeyGenerated => f.write_str("KEY_GENERATED"),
            SessionState::KeyWritten => f.write_str("KEY_WRITTEN"),
            SessionState::RegisteredRemote => f.write_str("REGISTERED_REMOTE"),
            SessionState::Inventoried => f.write_str("INVENTORIED"),
            SessionState::Done => f.write_str("DONE"),
            SessionState::Failed(FailedStage::EuiRead) => f.write_str("FAILED(EUI_READ)"),
            SessionState::Failed(FailedStage::KeyWrite) => f.write_str("FAILED(KEY_WRITE)"),
            SessionState::Failed(FailedStage::Registration(step)) => {
                write!(f, "FAILED(REGISTRATION, {step})")
            }
        }
    }
}

/// What a finished session went through
#[derive(Debug)]
pub struct SessionReport {
    /// Every state entered, in order
    pub states: Vec<SessionState>,
    pub dev_eui: Option<DevEui>,
    pub device_id: Option<DeviceId>,
    /// Set when the device is registered but could not be added to the
    /// inventory
    pub warning: Option<String>,
}

impl SessionReport {
    pub fn state(&self) -> SessionState {
        self.states.last().copied().unwrap_or(SessionState::Start)
    }

    pub fn succeeded(&self) -> bool {
        self.state() == SessionState::Done
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        if self.succeeded() { 0 } else { 1 }
    }
}

/// Coordinates one provisioning run for one unit.
///
/// The session owns the device transport for the whole run; it is released
/// when [`Session::run`] returns, on success and on every failure path.
pub struct Session<T> {
    device: DeviceClient<T>,
    orchestrator: Orchestrator,
    test_string: Option<String>,
    report: SessionReport,
}

impl<T: Transport> Session<T> {
    pub fn new(device: DeviceClient<T>, orchestrator: Orchestrator) -> Self {
        Self {
            device,
            orchestrator,
            test_string: None,
            report: SessionReport {
                states: vec![SessionState::Start],
                dev_eui: None,
                device_id: None,
                warning: None,
            },
        }
    }

    /// Also write a diagnostic string once the device answers
    pub fn with_test_string(mut self, value: Option<String>) -> Self {
        self.test_string = value;
        self
    }

    fn enter(&mut self, state: SessionState) {
        match state {
            SessionState::Failed(_) => error!(state = %state, "provisioning failed"),
            _ => info!(state = %state, "provisioning"),
        }
        self.report.states.push(state);
    }

    fn fail(mut self, stage: FailedStage) -> SessionReport {
        self.enter(SessionState::Failed(stage));
        self.report
    }

    #[instrument(name = "session", skip_all)]
    pub async fn run(mut self) -> SessionReport {
        let dev_eui = match self.device.read_identity().await {
            Ok(eui) => eui,
            Err(err) => {
                error!("failed to read device identity: {err}");
                return self.fail(FailedStage::EuiRead);
            }
        };
        self.report.dev_eui = Some(dev_eui);
        self.enter(SessionState::EuiRead);

        if let Some(value) = self.test_string.take() {
            if let Err(err) = self.device.write_test_string(&value).await {
                warn!("diagnostic write failed: {err}");
            }
        }

        let app_key = AppKey::generate();
        self.enter(SessionState::KeyGenerated);

        // the device must hold the key before the registry learns about it
        if let Err(err) = self.device.write_app_key(&app_key).await {
            error!("failed to write app key: {err}");
            return self.fail(FailedStage::KeyWrite);
        }
        self.enter(SessionState::KeyWritten);

        let registration = match self.orchestrator.register(dev_eui, app_key).await {
            Ok(registration) => registration,
            Err(err) => {
                error!("registration failed: {err}");
                return self.fail(FailedStage::Registration(err.step()));
            }
        };
        self.report.device_id = Some(registration.record.device_id.clone());
        self.enter(SessionState::RegisteredRemote);

        match registration.inventory {
            Ok(()) => self.enter(SessionState::Inventoried),
            Err(err) => {
                warn!("device works but is missing from the inventory: {err}");
                self.report.warning = Some(err.to_string());
            }
        }
        self.enter(SessionState::Done);

        info!(
            eui = %dev_eui,
            device_id = %registration.record.device_id,
            "provisioning complete"
        );
        self.report
    }
}
