//! Gaze record shared with the companion process.
//!
//! The companion writes a C struct with 1-byte bools and 8-byte aligned
//! doubles into the mapping. `MemoryData` mirrors that struct so the field
//! offsets below are derived from the compiler's C layout instead of being
//! hand-counted, and the bytes themselves are moved around as `RawFrame` so
//! padding and odd bool bytes survive a read/write cycle untouched.

use std::mem::{offset_of, size_of};

#[repr(C)]
#[allow(dead_code)]
struct MemoryEye {
    opened: u8,
    pupil_size: f64,
    x: f64,
    y: f64,
}

#[repr(C)]
#[allow(dead_code)]
struct MemoryData {
    shutdown: u8,
    calibrated: u8,
    left_eye: MemoryEye,
    right_eye: MemoryEye,
    combined: MemoryEye,
}

pub const FRAME_SIZE: usize = size_of::<MemoryData>();
const EYE_SIZE: usize = size_of::<MemoryEye>();

const SHUTDOWN_OFFSET: usize = offset_of!(MemoryData, shutdown);
const CALIBRATED_OFFSET: usize = offset_of!(MemoryData, calibrated);
const LEFT_OFFSET: usize = offset_of!(MemoryData, left_eye);
const RIGHT_OFFSET: usize = offset_of!(MemoryData, right_eye);
const COMBINED_OFFSET: usize = offset_of!(MemoryData, combined);

const OPENED_OFFSET: usize = offset_of!(MemoryEye, opened);
const PUPIL_OFFSET: usize = offset_of!(MemoryEye, pupil_size);
const X_OFFSET: usize = offset_of!(MemoryEye, x);
const Y_OFFSET: usize = offset_of!(MemoryEye, y);

const _: () = assert!(FRAME_SIZE == 104);
const _: () = assert!(EYE_SIZE == 32);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeSample {
    pub is_open: bool,
    pub pupil_diameter: f64,
    pub gaze_x: f64,
    pub gaze_y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GazeFrame {
    pub shutdown_requested: bool,
    pub is_calibrated: bool,
    pub left: EyeSample,
    pub right: EyeSample,
    pub combined: EyeSample,
}

/// Byte-exact copy of the shared record.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawFrame([u8; FRAME_SIZE]);

impl RawFrame {
    pub fn from_bytes(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; FRAME_SIZE] {
        &mut self.0
    }

    pub fn decode(&self) -> GazeFrame {
        GazeFrame {
            shutdown_requested: self.0[SHUTDOWN_OFFSET] != 0,
            is_calibrated: self.0[CALIBRATED_OFFSET] != 0,
            left: decode_eye(&self.0[LEFT_OFFSET..LEFT_OFFSET + EYE_SIZE]),
            right: decode_eye(&self.0[RIGHT_OFFSET..RIGHT_OFFSET + EYE_SIZE]),
            combined: decode_eye(&self.0[COMBINED_OFFSET..COMBINED_OFFSET + EYE_SIZE]),
        }
    }

    /// Raises the shutdown flag and leaves every other byte alone.
    pub fn request_shutdown(&mut self) {
        self.0[SHUTDOWN_OFFSET] = 1;
    }
}

impl Default for RawFrame {
    fn default() -> Self {
        Self([0; FRAME_SIZE])
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RawFrame").field(&self.decode()).finish()
    }
}

impl GazeFrame {
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Self {
        RawFrame::from_bytes(*bytes).decode()
    }

    /// Canonical encoding: bools as 0/1, zeroed padding.
    pub fn encode(&self) -> RawFrame {
        let mut raw = RawFrame::default();
        raw.0[SHUTDOWN_OFFSET] = self.shutdown_requested as u8;
        raw.0[CALIBRATED_OFFSET] = self.is_calibrated as u8;
        encode_eye(&self.left, &mut raw.0[LEFT_OFFSET..LEFT_OFFSET + EYE_SIZE]);
        encode_eye(&self.right, &mut raw.0[RIGHT_OFFSET..RIGHT_OFFSET + EYE_SIZE]);
        encode_eye(
            &self.combined,
            &mut raw.0[COMBINED_OFFSET..COMBINED_OFFSET + EYE_SIZE],
        );
        raw
    }
}

fn decode_eye(bytes: &[u8]) -> EyeSample {
    EyeSample {
        is_open: bytes[OPENED_OFFSET] != 0,
        pupil_diameter: read_f64(bytes, PUPIL_OFFSET),
        gaze_x: read_f64(bytes, X_OFFSET),
        gaze_y: read_f64(bytes, Y_OFFSET),
    }
}

fn encode_eye(eye: &EyeSample, bytes: &mut [u8]) {
    bytes[OPENED_OFFSET] = eye.is_open as u8;
    bytes[PUPIL_OFFSET..PUPIL_OFFSET + 8].copy_from_slice(&eye.pupil_diameter.to_le_bytes());
    bytes[X_OFFSET..X_OFFSET + 8].copy_from_slice(&eye.gaze_x.to_le_bytes());
    bytes[Y_OFFSET..Y_OFFSET + 8].copy_from_slice(&eye.gaze_y.to_le_bytes());
}

fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    f64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> GazeFrame {
        GazeFrame {
            shutdown_requested: false,
            is_calibrated: true,
            left: EyeSample {
                is_open: true,
                pupil_diameter: 3.25,
                gaze_x: -0.125,
                gaze_y: 0.5,
            },
            right: EyeSample {
                is_open: false,
                pupil_diameter: 3.5,
                gaze_x: 0.25,
                gaze_y: -0.75,
            },
            combined: EyeSample {
                is_open: true,
                pupil_diameter: 3.375,
                gaze_x: 0.0625,
                gaze_y: -0.125,
            },
        }
    }

    #[test]
    fn test_layout_offsets() {
        assert_eq!(FRAME_SIZE, 104);
        assert_eq!(CALIBRATED_OFFSET, 1);
        assert_eq!(LEFT_OFFSET, 8);
        assert_eq!(RIGHT_OFFSET, 40);
        assert_eq!(COMBINED_OFFSET, 72);
        assert_eq!(PUPIL_OFFSET, 8);
        assert_eq!(Y_OFFSET, 24);
    }

    #[test]
    fn test_decode_known_bytes() {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[1] = 1;
        bytes[8] = 1;
        bytes[16..24].copy_from_slice(&4.0f64.to_le_bytes());
        bytes[88..96].copy_from_slice(&(-0.5f64).to_le_bytes());

        let frame = GazeFrame::decode(&bytes);
        assert!(!frame.shutdown_requested);
        assert!(frame.is_calibrated);
        assert!(frame.left.is_open);
        assert_eq!(frame.left.pupil_diameter, 4.0);
        assert!(!frame.right.is_open);
        assert_eq!(frame.combined.gaze_x, -0.5);
    }

    #[test]
    fn test_canonical_round_trip() {
        let encoded = sample_frame().encode();
        let decoded = GazeFrame::decode(encoded.as_bytes());
        assert_eq!(decoded, sample_frame());
        assert_eq!(decoded.encode().as_bytes(), encoded.as_bytes());
    }

    #[test]
    fn test_raw_frame_keeps_arbitrary_bytes() {
        // Garbage in the padding and a non-canonical bool byte, as an uninitialized
        // C struct on the companion side could produce.
        let mut bytes = [0u8; FRAME_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        bytes[0] = 0;
        let raw = RawFrame::from_bytes(bytes);
        assert_eq!(raw.as_bytes(), &bytes);

        let mut flagged = raw;
        flagged.request_shutdown();
        assert!(flagged.decode().shutdown_requested);
        assert_eq!(&flagged.as_bytes()[1..], &bytes[1..]);
    }

    #[test]
    fn test_nan_payload_survives() {
        let nan = f64::from_bits(0x7ff8_0000_dead_beef);
        let mut bytes = sample_frame().encode().as_bytes().to_owned();
        bytes[48..56].copy_from_slice(&nan.to_le_bytes());
        let frame = GazeFrame::decode(&bytes);
        assert_eq!(frame.right.pupil_diameter.to_bits(), nan.to_bits());
        assert_eq!(frame.encode().as_bytes(), &bytes);
    }
}
