use super::ffi::{EyeMeasurements, Gaze, GazeEyeStatus, GazeStatus, PropertyKey, Ray};
use super::library::{SessionHandle, VarjoApi, VarjoLibrary};
use crate::error::{Result, VarjoError};
use crate::frame::{EyeSample, GazeFrame};
use crate::hook::HookScope;
use crate::probe;
use api::ModuleLogger;
use std::path::{Path, PathBuf};

/// Successful ticks between two property syncs.
pub const PROPERTY_SYNC_INTERVAL: u32 = 90;

/// OS services the direct session needs. Swapped out in tests.
pub trait NativePlatform {
    type Api: VarjoApi;
    /// Keeps the process id interception alive until dropped.
    type Guard;

    fn runtime_available(&self) -> bool;
    fn load_library(&self, path: &Path) -> Result<Self::Api>;
    fn intercept_process_id(&self) -> Result<Self::Guard>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// Session exists but gaze was not permitted, so it never became active.
    /// Still needs a teardown.
    Opened(SessionHandle),
    Active(SessionHandle),
    ShutDown,
}

pub struct NativeInterface<P: NativePlatform> {
    platform: P,
    library_path: Option<PathBuf>,
    api: Option<P::Api>,
    state: SessionState,
    gaze: Gaze,
    measurements: EyeMeasurements,
    frame: GazeFrame,
    calibrated: bool,
    ticks_since_sync: u32,
    logger: Option<ModuleLogger>,
}

impl<P: NativePlatform> NativeInterface<P> {
    /// `library_path` is `None` when the host install directory could not be
    /// resolved; `initialize` then fails with `LibraryLoad`.
    pub fn new(platform: P, library_path: Option<PathBuf>) -> Self {
        Self {
            platform,
            library_path,
            api: None,
            state: SessionState::Uninitialized,
            gaze: Gaze::default(),
            measurements: EyeMeasurements::default(),
            frame: GazeFrame::default(),
            calibrated: false,
            ticks_since_sync: 0,
            logger: None,
        }
    }

    /// Session events go to the host through this logger.
    pub fn set_logger(&mut self, logger: ModuleLogger) {
        self.logger = Some(logger);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frame(&self) -> &GazeFrame {
        &self.frame
    }

    pub fn gaze(&self) -> &Gaze {
        &self.gaze
    }

    pub fn eye_measurements(&self) -> &EyeMeasurements {
        &self.measurements
    }

    fn session(&self) -> Option<(&P::Api, SessionHandle)> {
        match (self.state, &self.api) {
            (SessionState::Active(s) | SessionState::Opened(s), Some(api)) => Some((api, s)),
            _ => None,
        }
    }

    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            SessionState::Active(_) => return Ok(()),
            // Gaze may have been enabled in Varjo Base since the last attempt.
            SessionState::Opened(session) => return self.activate(session),
            SessionState::Uninitialized | SessionState::ShutDown => {}
        }

        if !self.platform.runtime_available() {
            return Err(VarjoError::Unavailable);
        }

        let api = match self.api.take() {
            Some(api) => api,
            None => {
                let path = self.library_path.as_deref().ok_or_else(|| {
                    VarjoError::library_load("VarjoLib.dll", "host install directory not found")
                })?;
                let api = self.platform.load_library(path)?;
                if let Some(logger) = &self.logger {
                    logger.info(&format!("Loaded library {:?}", path));
                }
                api
            }
        };

        let opened = open_session(&self.platform, &api);
        self.api = Some(api);
        let session = opened?;
        self.state = SessionState::Opened(session);
        self.activate(session)
    }

    /// Opened -> Active once gaze is permitted.
    fn activate(&mut self, session: SessionHandle) -> Result<()> {
        let Some(api) = &self.api else {
            return Err(VarjoError::SessionInit);
        };
        if !api.is_gaze_allowed(session) {
            return Err(VarjoError::PermissionDenied);
        }

        api.gaze_init(session);
        api.sync_properties(session);
        self.calibrated = api.property_bool(session, PropertyKey::GazeCalibrated);
        self.ticks_since_sync = 0;
        self.state = SessionState::Active(session);
        Ok(())
    }

    /// Fetches one gaze/measurement pair. `Ok(false)` when there is no active
    /// session; `NoData` keeps the previous sample.
    pub fn update(&mut self) -> Result<bool> {
        let (SessionState::Active(session), Some(api)) = (self.state, &self.api) else {
            return Ok(false);
        };

        let mut gaze = Gaze::default();
        let mut measurements = EyeMeasurements::default();
        if !api.gaze_data(session, &mut gaze, &mut measurements) {
            let (code, description) = api.last_error(session);
            return Err(VarjoError::NoData { code, description });
        }

        self.ticks_since_sync += 1;
        if self.ticks_since_sync >= PROPERTY_SYNC_INTERVAL {
            api.sync_properties(session);
            self.calibrated = api.property_bool(session, PropertyKey::GazeCalibrated);
            self.ticks_since_sync = 0;
        }

        self.gaze = gaze;
        self.measurements = measurements;
        self.frame = frame_from_native(&gaze, &measurements, self.calibrated);
        Ok(true)
    }

    pub fn teardown(&mut self) {
        let (SessionState::Active(session) | SessionState::Opened(session)) = self.state else {
            return;
        };
        if let Some(api) = &self.api {
            api.session_shutdown(session);
        }
        self.state = SessionState::ShutDown;
    }

    /// HMD product name, empty if unknown.
    pub fn device_name(&self) -> String {
        self.property_string(PropertyKey::HmdProductName)
    }

    pub fn property_string(&self, key: PropertyKey) -> String {
        let Some((api, session)) = self.session() else {
            return String::new();
        };

        let size = api.property_string_size(session, key);
        if size <= 0 {
            return String::new();
        }

        let mut buffer = vec![0u8; size as usize];
        api.property_string(session, key, &mut buffer);
        let len = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        String::from_utf8_lossy(&buffer[..len]).into_owned()
    }

    pub fn property_bool(&self, key: PropertyKey) -> Option<bool> {
        self.session()
            .map(|(api, session)| api.property_bool(session, key))
    }

    pub fn property_int(&self, key: PropertyKey) -> Option<i32> {
        self.session()
            .map(|(api, session)| api.property_int(session, key))
    }
}

impl<P: NativePlatform> Drop for NativeInterface<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Opens the session with the interception in place. The guard is gone
/// before this returns, whatever `session_init` does.
fn open_session<P: NativePlatform>(platform: &P, api: &P::Api) -> Result<SessionHandle> {
    let guard = platform.intercept_process_id()?;
    let session = api.session_init();
    drop(guard);
    session.ok_or(VarjoError::SessionInit)
}

pub fn frame_from_native(
    gaze: &Gaze,
    measurements: &EyeMeasurements,
    calibrated: bool,
) -> GazeFrame {
    let left_pupil = measurements.left_pupil_diameter_in_mm as f64;
    let right_pupil = measurements.right_pupil_diameter_in_mm as f64;

    GazeFrame {
        shutdown_requested: false,
        is_calibrated: calibrated,
        left: eye_sample(gaze.left_status, &gaze.left_eye, left_pupil),
        right: eye_sample(gaze.right_status, &gaze.right_eye, right_pupil),
        combined: EyeSample {
            is_open: gaze.status != GazeStatus::Invalid as i64,
            pupil_diameter: (left_pupil + right_pupil) / 2.0,
            gaze_x: gaze.gaze.forward[0],
            gaze_y: gaze.gaze.forward[1],
        },
    }
}

fn eye_sample(status: i64, ray: &Ray, pupil_diameter: f64) -> EyeSample {
    EyeSample {
        is_open: status != GazeEyeStatus::Invalid as i64,
        pupil_diameter,
        gaze_x: ray.forward[0],
        gaze_y: ray.forward[1],
    }
}

/// VarjoLib from disk, guarded by the real `GetCurrentProcessId` hook.
#[derive(Default)]
pub struct SystemNative;

impl NativePlatform for SystemNative {
    type Api = VarjoLibrary;
    type Guard = HookScope;

    fn runtime_available(&self) -> bool {
        probe::is_available()
    }

    fn load_library(&self, path: &Path) -> Result<VarjoLibrary> {
        VarjoLibrary::load(path)
    }

    fn intercept_process_id(&self) -> Result<HookScope> {
        HookScope::install()
    }
}
