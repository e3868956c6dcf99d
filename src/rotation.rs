//! Display and capture rotation.
//!
//! Front cameras mirror the viewfinder, so their rotation adds the display
//! rotation where back cameras subtract it, and their captures additionally
//! need a horizontal flip.

use crate::types::{Facing, CARDINAL_DEGREES};

/// Accept a device orientation reading only when it is exactly a right angle.
pub fn display_rotation_degrees(reading: i32) -> Option<u32> {
    u32::try_from(reading)
        .ok()
        .filter(|degrees| CARDINAL_DEGREES.contains(degrees))
}

/// Rotation to apply to a captured image so it displays upright.
pub fn capture_rotation_degrees(sensor_orientation: u32, display_rotation: u32, facing: Facing) -> u32 {
    let sensor = sensor_orientation as i64;
    let display = display_rotation as i64;
    let degrees = match facing {
        Facing::Front => sensor + display,
        Facing::Back => sensor - display,
    };
    degrees.rem_euclid(360) as u32
}

/// Hardware display orientation for the legacy preview stream.
pub fn preview_rotation_degrees(sensor_orientation: u32, display_rotation: u32, facing: Facing) -> u32 {
    match facing {
        Facing::Front => {
            let combined = (sensor_orientation as i64 + display_rotation as i64).rem_euclid(360);
            (360 - combined).rem_euclid(360) as u32
        }
        Facing::Back => capture_rotation_degrees(sensor_orientation, display_rotation, facing),
    }
}

pub fn needs_horizontal_flip(facing: Facing) -> bool {
    facing == Facing::Front
}

/// Last accepted display rotation.
///
/// Readings outside the four right angles leave the value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayRotation {
    degrees: u32,
}

impl DisplayRotation {
    pub fn new(initial_reading: i32) -> Self {
        let mut rotation = Self::default();
        rotation.update(initial_reading);
        rotation
    }

    pub fn degrees(&self) -> u32 {
        self.degrees
    }

    /// Returns true when the reading changed the stored rotation.
    pub fn update(&mut self, reading: i32) -> bool {
        match display_rotation_degrees(reading) {
            Some(degrees) if degrees != self.degrees => {
                log::debug!("Display rotation {} -> {}", self.degrees, degrees);
                self.degrees = degrees;
                true
            }
            Some(_) => false,
            None => {
                log::debug!("Ignoring non-cardinal orientation reading {}", reading);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_rotation_only_cardinal() {
        assert_eq!(display_rotation_degrees(0), Some(0));
        assert_eq!(display_rotation_degrees(270), Some(270));
        assert_eq!(display_rotation_degrees(45), None);
        assert_eq!(display_rotation_degrees(-90), None);
        assert_eq!(display_rotation_degrees(360), None);
    }

    #[test]
    fn test_tracker_keeps_previous_value() {
        let mut rotation = DisplayRotation::new(90);
        assert_eq!(rotation.degrees(), 90);
        assert!(!rotation.update(135));
        assert_eq!(rotation.degrees(), 90);
        assert!(rotation.update(180));
        assert_eq!(rotation.degrees(), 180);
        assert!(!rotation.update(180));
    }

    #[test]
    fn test_front_camera_capture_rotation() {
        assert_eq!(capture_rotation_degrees(90, 0, Facing::Front), 90);
        assert!(needs_horizontal_flip(Facing::Front));
        assert!(!needs_horizontal_flip(Facing::Back));
    }

    #[test]
    fn test_back_camera_capture_rotation() {
        assert_eq!(capture_rotation_degrees(90, 0, Facing::Back), 90);
        assert_eq!(capture_rotation_degrees(90, 90, Facing::Back), 0);
        assert_eq!(capture_rotation_degrees(90, 180, Facing::Back), 270);
        assert_eq!(capture_rotation_degrees(0, 270, Facing::Back), 90);
    }

    #[test]
    fn test_legacy_preview_rotation() {
        assert_eq!(preview_rotation_degrees(90, 0, Facing::Back), 90);
        assert_eq!(preview_rotation_degrees(270, 0, Facing::Front), 90);
        assert_eq!(preview_rotation_degrees(270, 90, Facing::Front), 0);
        assert_eq!(preview_rotation_degrees(90, 270, Facing::Back), 180);
    }
}
