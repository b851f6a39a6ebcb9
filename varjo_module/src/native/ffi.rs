use std::ffi::{c_char, c_void};

pub type Session = c_void;
pub type Nanoseconds = i64;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ray {
    pub origin: [f64; 3],
    pub forward: [f64; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gaze {
    pub left_eye: Ray,
    pub right_eye: Ray,
    pub gaze: Ray,
    pub focus_distance: f64,
    pub stability: f64,
    pub capture_time: Nanoseconds,
    pub left_status: i64,
    pub right_status: i64,
    pub status: i64,
    pub frame_number: i64,
    pub left_pupil_size: f64,
    pub right_pupil_size: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeMeasurements {
    pub frame_number: i64,
    pub capture_time: Nanoseconds,
    pub inter_pupillary_distance_in_mm: f32,
    pub left_pupil_iris_diameter_ratio: f32,
    pub right_pupil_iris_diameter_ratio: f32,
    pub left_pupil_diameter_in_mm: f32,
    pub right_pupil_diameter_in_mm: f32,
    pub left_iris_diameter_in_mm: f32,
    pub right_iris_diameter_in_mm: f32,
    pub left_eye_openness: f32,
    pub right_eye_openness: f32,
}

#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GazeStatus {
    Invalid = 0,
    Adjust = 1,
    Valid = 2,
}

#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GazeEyeStatus {
    Invalid = 0,
    Visible = 1,
    Compensated = 2,
    Tracked = 3,
}

/// `varjo_PropertyKey`, an `int64_t` on the C side.
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKey {
    UserPresence = 0x2000,
    GazeCalibrating = 0xA000,
    GazeCalibrated = 0xA001,
    GazeCalibrationQuality = 0xA002,
    GazeAllowed = 0xA003,
    HmdConnected = 0xE001,
    HmdProductName = 0xE002,
    HmdSerialNumber = 0xE003,
}

// Function signatures
pub type SessionInitFn = unsafe extern "C" fn() -> *mut Session;
pub type SessionShutDownFn = unsafe extern "C" fn(session: *mut Session);
pub type GazeInitFn = unsafe extern "C" fn(session: *mut Session);
pub type IsGazeAllowedFn = unsafe extern "C" fn(session: *mut Session) -> i32;
pub type GetGazeDataFn = unsafe extern "C" fn(
    session: *mut Session,
    gaze: *mut Gaze,
    measurements: *mut EyeMeasurements,
) -> i32;
pub type GetErrorFn = unsafe extern "C" fn(session: *mut Session) -> i64;
pub type GetErrorDescFn = unsafe extern "C" fn(error: i64) -> *const c_char;
pub type GetPropertyBoolFn = unsafe extern "C" fn(session: *mut Session, key: i64) -> i32;
pub type GetPropertyIntFn = unsafe extern "C" fn(session: *mut Session, key: i64) -> i32;
pub type GetPropertyStringSizeFn = unsafe extern "C" fn(session: *mut Session, key: i64) -> i32;
pub type GetPropertyStringFn =
    unsafe extern "C" fn(session: *mut Session, key: i64, buffer: *mut c_char, size: i32);
pub type SyncPropertiesFn = unsafe extern "C" fn(session: *mut Session);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(size_of::<Ray>(), 48);
        assert_eq!(size_of::<Gaze>(), 3 * 48 + 9 * 8);
        assert_eq!(size_of::<EyeMeasurements>(), 16 + 9 * 4 + 4);
    }

    #[test]
    fn test_property_keys_match_sdk_header() {
        assert_eq!(size_of::<PropertyKey>(), 8);
        assert_eq!(PropertyKey::UserPresence as i64, 0x2000);
        assert_eq!(PropertyKey::GazeCalibrating as i64, 0xA000);
        assert_eq!(PropertyKey::GazeCalibrated as i64, 0xA001);
        assert_eq!(PropertyKey::GazeCalibrationQuality as i64, 0xA002);
        assert_eq!(PropertyKey::GazeAllowed as i64, 0xA003);
        assert_eq!(PropertyKey::HmdProductName as i64, 0xE002);
    }
}
