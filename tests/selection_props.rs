//! Property-based tests for size selection and rotation math
//!
//! Run with: cargo test --test selection_props

use camerakit::rotation::{capture_rotation_degrees, display_rotation_degrees, DisplayRotation};
use camerakit::selection::{adjusted_preview_size, select_preview_size, select_image_size};
use camerakit::{Facing, Size};
use proptest::prelude::*;

fn size() -> impl Strategy<Value = Size> {
    (1u32..4096, 1u32..4096).prop_map(|(w, h)| Size::new(w, h))
}

fn candidates() -> impl Strategy<Value = Vec<Size>> {
    prop::collection::vec(size(), 1..12)
}

fn cardinal() -> impl Strategy<Value = u32> {
    prop::sample::select(vec![0u32, 90, 180, 270])
}

fn facing() -> impl Strategy<Value = Facing> {
    prop_oneof![Just(Facing::Back), Just(Facing::Front)]
}

// ═══════════════════════════════════════════════════════════════════════════
// PREVIEW SIZE SELECTION
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// The chosen size always comes from the candidate list
    #[test]
    fn selected_size_is_a_candidate(
        target in size(),
        sensor in cardinal(),
        display in cardinal(),
        sizes in candidates(),
    ) {
        let selected = select_preview_size(target.width, target.height, sensor, display, &sizes)
            .unwrap();
        prop_assert!(sizes.contains(&selected));
    }

    /// Asking twice gives the same answer
    #[test]
    fn selection_is_deterministic(
        target in size(),
        sensor in cardinal(),
        display in cardinal(),
        sizes in candidates(),
    ) {
        let first = select_preview_size(target.width, target.height, sensor, display, &sizes);
        let second = select_preview_size(target.width, target.height, sensor, display, &sizes);
        prop_assert_eq!(first, second);
    }

    /// Nothing that needs upscaling beats an exact match (in sensor orientation)
    #[test]
    fn exact_match_wins(
        target in size(),
        sensor in cardinal(),
        display in cardinal(),
        mut sizes in candidates(),
        position in any::<prop::sample::Index>(),
    ) {
        let swap = (display % 180) != (sensor % 180);
        let native = if swap { target.swapped() } else { target };
        sizes.retain(|s| *s != native);
        let at = position.index(sizes.len() + 1);
        sizes.insert(at, native);

        let selected = select_preview_size(target.width, target.height, sensor, display, &sizes)
            .unwrap();
        // Only a candidate at least as large on both axes has a ratio <= 1.
        prop_assert!(
            selected == native
                || (selected.width >= native.width && selected.height >= native.height)
        );
    }

    /// Duplicated entries resolve to the first occurrence
    #[test]
    fn duplicate_candidates_keep_order(
        target in size(),
        sizes in candidates(),
    ) {
        let doubled: Vec<Size> = sizes.iter().chain(sizes.iter()).copied().collect();
        let once = select_preview_size(target.width, target.height, 0, 0, &sizes).unwrap();
        let twice = select_preview_size(target.width, target.height, 0, 0, &doubled).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Converting to display orientation and back is the identity
    #[test]
    fn adjusted_size_swap_is_an_involution(
        preview in size(),
        sensor in cardinal(),
        display in cardinal(),
    ) {
        let adjusted = adjusted_preview_size(preview, sensor, display);
        prop_assert_eq!(adjusted_preview_size(adjusted, sensor, display), preview);
        prop_assert_eq!(adjusted.area(), preview.area());
    }

    /// Picture size selection never invents a size
    #[test]
    fn image_size_is_a_candidate(
        megapixels in 0.1f32..50.0,
        sizes in candidates(),
    ) {
        let selected = select_image_size(megapixels, &sizes).unwrap();
        prop_assert!(sizes.contains(&selected));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ROTATION
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Capture rotation is always one of the four right angles
    #[test]
    fn capture_rotation_is_cardinal(
        sensor in cardinal(),
        display in cardinal(),
        facing in facing(),
    ) {
        let degrees = capture_rotation_degrees(sensor, display, facing);
        prop_assert!([0, 90, 180, 270].contains(&degrees));
    }

    /// Adding a full turn to the display rotation changes nothing
    #[test]
    fn capture_rotation_is_periodic(
        sensor in cardinal(),
        display in cardinal(),
        turns in 1u32..4,
        facing in facing(),
    ) {
        prop_assert_eq!(
            capture_rotation_degrees(sensor, display, facing),
            capture_rotation_degrees(sensor, display + 360 * turns, facing)
        );
    }

    /// Front and back differ by twice the display rotation
    #[test]
    fn front_and_back_differ_by_twice_display(
        sensor in cardinal(),
        display in cardinal(),
    ) {
        let front = capture_rotation_degrees(sensor, display, Facing::Front) as i64;
        let back = capture_rotation_degrees(sensor, display, Facing::Back) as i64;
        prop_assert_eq!((front - back).rem_euclid(360), (2 * display as i64) % 360);
    }

    /// Only exact right angles are accepted as display readings
    #[test]
    fn display_readings_are_cardinal_only(reading in -720i32..720) {
        let accepted = display_rotation_degrees(reading);
        let expected = [0, 90, 180, 270].contains(&reading);
        prop_assert_eq!(accepted.is_some(), expected);
    }

    /// Rejected readings leave the tracked rotation where it was
    #[test]
    fn rejected_readings_do_not_move_rotation(
        initial in cardinal(),
        readings in prop::collection::vec(-720i32..720, 0..20),
    ) {
        let mut rotation = DisplayRotation::new(initial as i32);
        let mut expected = initial;
        for reading in readings {
            rotation.update(reading);
            if let Some(degrees) = display_rotation_degrees(reading) {
                expected = degrees;
            }
        }
        prop_assert_eq!(rotation.degrees(), expected);
    }
}
