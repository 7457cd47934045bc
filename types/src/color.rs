use serde::{Deserialize, Serialize};

/// 8-bit RGB color.
///
/// Serialized as a `[r, g, b]` array so config files stay compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
    pub fn to_hsv(self) -> (f64, f64, f64) {
        let r = self.r as f64 / 255.0;
        let g = self.g as f64 / 255.0;
        let b = self.b as f64 / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        let saturation = if max == 0.0 { 0.0 } else { delta / max };

        (hue, saturation, max)
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// How two colors are compared against a probe's tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMetric {
    /// Euclidean distance over (R, G, B)
    #[default]
    Rgb,
    /// Weighted Euclidean over circular hue, saturation x100 and value x100
    Hsv,
    /// Kept for existing tuned tolerances; computes the same value as `Rgb`
    DeltaE,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_of_primaries() {
        assert_eq!(Rgb::new(255, 0, 0).to_hsv(), (0.0, 1.0, 1.0));
        let (h, s, v) = Rgb::new(0, 255, 0).to_hsv();
        assert!((h - 120.0).abs() < 1e-9);
        assert_eq!((s, v), (1.0, 1.0));
        let (h, _, _) = Rgb::new(0, 0, 255).to_hsv();
        assert!((h - 240.0).abs() < 1e-9);
    }

    #[test]
    fn grey_has_no_saturation() {
        let (h, s, v) = Rgb::new(128, 128, 128).to_hsv();
        assert_eq!(h, 0.0);
        assert_eq!(s, 0.0);
        assert!((v - 128.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Rgb::new(255, 16, 0).to_string(), "#FF1000");
    }
}
