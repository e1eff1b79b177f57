//! Fixed-precision rounding

/// Round `value` to `decimals` places, halves away from zero.
///
/// Non-finite values pass through untouched so a NaN sentinel survives
/// rounding and can be detected afterwards.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_six() {
        assert_eq!(round_to(-10.9709 / 100.0, 6), -0.109709);
        assert_eq!(round_to(1.23456789, 6), 1.234568);
    }

    #[test]
    fn test_round_is_idempotent() {
        let once = round_to(-8.1139 / 100.0, 6);
        assert_eq!(round_to(once, 6), once);
    }

    #[test]
    fn test_nan_passes_through() {
        assert!(round_to(f64::NAN, 6).is_nan());
    }
}
