//! Severity classification and report colouring.

use crate::core::types::SeverityClass;

/// Exception count at which the exception band saturates.
pub const EXCEPTION_MAX: u32 = 5;
/// Error count at which the error band saturates.
pub const ERROR_MAX: u32 = 15;
/// Warning count at which the warning band saturates.
pub const WARNING_MAX: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear interpolation towards `other`; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| {
            let value = f64::from(a) + (f64::from(b) - f64::from(a)) * t;
            value.round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const HEALTHY: Rgb = Rgb::new(72, 170, 96);
pub const WARNING_BAND: (Rgb, Rgb) = (Rgb::new(240, 224, 96), Rgb::new(232, 176, 32));
pub const ERROR_BAND: (Rgb, Rgb) = (Rgb::new(240, 136, 56), Rgb::new(208, 80, 24));
pub const EXCEPTION_BAND: (Rgb, Rgb) = (Rgb::new(216, 48, 48), Rgb::new(120, 0, 0));

/// Bucket by the highest tier present: exception > error > warning > clean.
pub fn classify(warnings: u32, errors: u32, exceptions: u32) -> SeverityClass {
    if exceptions > 0 {
        SeverityClass::Exception
    } else if errors > 0 {
        SeverityClass::Error
    } else if warnings > 0 {
        SeverityClass::Warning
    } else {
        SeverityClass::Clean
    }
}

/// Colour for a run, interpolated inside the band of its highest tier.
pub fn severity_color(warnings: u32, errors: u32, exceptions: u32) -> Rgb {
    match classify(warnings, errors, exceptions) {
        SeverityClass::Exception => interpolate(EXCEPTION_BAND, exceptions, EXCEPTION_MAX),
        SeverityClass::Error => interpolate(ERROR_BAND, errors, ERROR_MAX),
        SeverityClass::Warning => interpolate(WARNING_BAND, warnings, WARNING_MAX),
        SeverityClass::Clean => HEALTHY,
    }
}

fn interpolate(band: (Rgb, Rgb), count: u32, max: u32) -> Rgb {
    let t = (f64::from(count) / f64::from(max)).min(1.0);
    band.0.lerp(band.1, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_band(color: Rgb, band: (Rgb, Rgb)) -> bool {
        (0..=100).any(|step| band.0.lerp(band.1, f64::from(step) / 100.0) == color)
    }

    #[test]
    fn classify_prefers_highest_tier() {
        assert_eq!(classify(0, 0, 0), SeverityClass::Clean);
        assert_eq!(classify(3, 0, 0), SeverityClass::Warning);
        assert_eq!(classify(3, 1, 0), SeverityClass::Error);
        assert_eq!(classify(0, 0, 1), SeverityClass::Exception);
    }

    #[test]
    fn exceptions_always_use_exception_band() {
        for exceptions in 1..=8 {
            for (warnings, errors) in [(0, 0), (200, 0), (0, 200), (99, 99)] {
                let color = severity_color(warnings, errors, exceptions);
                assert_ne!(color, HEALTHY);
                let expected = interpolate(EXCEPTION_BAND, exceptions, EXCEPTION_MAX);
                assert_eq!(color, expected);
                assert!(on_band(color, EXCEPTION_BAND));
            }
        }
    }

    #[test]
    fn band_saturates_at_threshold() {
        assert_eq!(severity_color(0, ERROR_MAX, 0), ERROR_BAND.1);
        assert_eq!(severity_color(0, ERROR_MAX * 4, 0), ERROR_BAND.1);
        assert_eq!(severity_color(WARNING_MAX, 0, 0), WARNING_BAND.1);
    }

    #[test]
    fn clean_is_healthy() {
        assert_eq!(severity_color(0, 0, 0), HEALTHY);
        assert_eq!(HEALTHY.to_hex(), "#48aa60");
    }
}
