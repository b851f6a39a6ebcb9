use crate::frame::{EyeSample, GazeFrame};
use api::{EyeTrackingData, UnifiedSingleEyeData};
use glam::Vec3;

/// Copies a decoded frame into the host's per-tick eye data.
pub fn update_eye(data: &mut EyeTrackingData, frame: &GazeFrame) {
    data.is_calibrated = frame.is_calibrated;

    update_single_eye(&mut data.left, &frame.left);
    update_single_eye(&mut data.right, &frame.right);
    update_single_eye(&mut data.combined, &frame.combined);

    data.left_diameter = data.left.pupil_diameter_mm;
    data.right_diameter = data.right.pupil_diameter_mm;
    update_dilation_range(data, &[&frame.left, &frame.right]);
}

fn update_single_eye(eye: &mut UnifiedSingleEyeData, sample: &EyeSample) {
    eye.openness = if sample.is_open { 1.0 } else { 0.0 };

    // Closed eyes report garbage gaze and pupil values; keep the last ones.
    if !sample.is_open {
        return;
    }
    eye.gaze = gaze_vector(sample.gaze_x, sample.gaze_y);
    eye.pupil_diameter_mm = sample.pupil_diameter as f32;
}

/// Rebuilds the forward (+Z) unit vector from its x/y components.
pub fn gaze_vector(x: f64, y: f64) -> Vec3 {
    let (x, y) = (x as f32, y as f32);
    if !x.is_finite() || !y.is_finite() {
        return Vec3::Z;
    }
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
    Vec3::new(x, y, z).normalize_or_zero()
}

fn update_dilation_range(data: &mut EyeTrackingData, samples: &[&EyeSample]) {
    for sample in samples {
        if !sample.is_open || !(sample.pupil_diameter > 0.0) {
            continue;
        }
        let d = sample.pupil_diameter as f32;
        if data.max_dilation == 0.0 || d > data.max_dilation {
            data.max_dilation = d;
        }
        if data.min_dilation == 0.0 || d < data.min_dilation {
            data.min_dilation = d;
        }
    }
}
