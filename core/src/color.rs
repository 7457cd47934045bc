//! Color distance metrics used by probe evaluation.
//!
//! `DeltaE` is the plain RGB Euclidean distance, there is no Lab conversion.

use argus_types::{ColorMetric, Rgb};

/// Distance between two colors under `metric`.
pub fn distance(metric: ColorMetric, a: Rgb, b: Rgb) -> f64 {
    match metric {
        ColorMetric::Rgb | ColorMetric::DeltaE => rgb_distance(a, b),
        ColorMetric::Hsv => hsv_distance(a, b),
    }
}

/// Euclidean distance in (R, G, B) space, range `[0, ~441.7]`.
pub fn rgb_distance(a: Rgb, b: Rgb) -> f64 {
    let dr = a.r as f64 - b.r as f64;
    let dg = a.g as f64 - b.g as f64;
    let db = a.b as f64 - b.b as f64;
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Circular hue difference plus saturation/value scaled x100 so they weigh
/// comparably against hue's `[0, 180]` span.
pub fn hsv_distance(a: Rgb, b: Rgb) -> f64 {
    let (h1, s1, v1) = a.to_hsv();
    let (h2, s2, v2) = b.to_hsv();

    let raw = (h1 - h2).abs();
    let dh = raw.min(360.0 - raw);
    let ds = (s1 - s2) * 100.0;
    let dv = (v1 - v2) * 100.0;

    (dh * dh + ds * ds + dv * dv).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_distance_is_euclidean() {
        assert_eq!(rgb_distance(Rgb::new(0, 0, 0), Rgb::new(3, 4, 0)), 5.0);
        assert_eq!(rgb_distance(Rgb::WHITE, Rgb::WHITE), 0.0);
    }

    #[test]
    fn delta_e_matches_rgb() {
        let a = Rgb::new(12, 200, 77);
        let b = Rgb::new(90, 14, 250);
        assert_eq!(
            distance(ColorMetric::DeltaE, a, b),
            distance(ColorMetric::Rgb, a, b)
        );
    }

    #[test]
    fn hue_wraps_around() {
        // 350 and 10 degrees are 20 apart, not 340
        let a = Rgb::new(255, 0, 43); // ~350
        let b = Rgb::new(255, 43, 0); // ~10
        let d = hsv_distance(a, b);
        assert!(d < 25.0, "expected circular hue distance, got {d}");
    }

    #[test]
    fn hsv_value_difference_is_scaled() {
        let d = hsv_distance(Rgb::BLACK, Rgb::WHITE);
        assert!((d - 100.0).abs() < 1e-9);
    }
}
