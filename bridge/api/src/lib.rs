use anyhow::Result;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, CString};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSingleEyeData {
    pub gaze: Vec3,
    pub pupil_diameter_mm: f32,
    pub openness: f32,
}

/// Eye state handed to the host once per tick.
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeTrackingData {
    pub left: UnifiedSingleEyeData,
    pub right: UnifiedSingleEyeData,
    pub combined: UnifiedSingleEyeData,
    pub max_dilation: f32,
    pub min_dilation: f32,
    pub left_diameter: f32,
    pub right_diameter: f32,
    pub is_calibrated: bool,
}

/// log level for module logging
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

/// logger callback for modules
pub type LogCallback = extern "C" fn(level: LogLevel, target: *const c_char, message: *const c_char);

/// Logger interface for modules. Messages cross the dylib boundary through
/// the host-provided callback, so the module never touches the host's `log`
/// statics directly.
#[derive(Clone)]
pub struct ModuleLogger {
    callback: LogCallback,
    module_name: String,
}

impl ModuleLogger {
    pub fn new(callback: LogCallback, module_name: String) -> Self {
        Self {
            callback,
            module_name,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        let target = to_c_string(&self.module_name);
        let msg = to_c_string(message);
        (self.callback)(level, target.as_ptr(), msg.as_ptr());
    }
}

// Interior NULs would truncate the message on the host side; drop them instead.
fn to_c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

/// Lifecycle the host drives: `initialize` once, `update` once per tick,
/// `unload` on exit.
pub trait TrackingModule {
    fn initialize(&mut self, logger: ModuleLogger) -> Result<()>;
    fn update(&mut self, data: &mut EyeTrackingData) -> Result<()>;
    fn unload(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<(LogLevel, String, String)>> = Mutex::new(Vec::new());

    extern "C" fn capture(level: LogLevel, target: *const c_char, message: *const c_char) {
        let target = unsafe { CStr::from_ptr(target) }.to_string_lossy().into_owned();
        let message = unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned();
        CAPTURED.lock().unwrap().push((level, target, message));
    }

    #[test]
    fn test_logger_forwards_level_target_and_message() {
        let logger = ModuleLogger::new(capture, "varjo".to_string());
        logger.warn("gaze\0 lost");
        logger.info("hello");

        let captured = CAPTURED.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].0, LogLevel::Warn);
        assert_eq!(captured[0].1, "varjo");
        assert_eq!(captured[0].2, "gaze lost");
        assert_eq!(captured[1].0, LogLevel::Info);
    }
}
