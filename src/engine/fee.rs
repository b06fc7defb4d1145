pub const BASE_FEE: f64 = 500.0;
pub const PER_KM_RATE: f64 = 100.0;

/// Delivery fee from route distance, in the same currency-agnostic units
/// as the rest of the system. Negative distances clamp to zero instead of
/// erroring; callers are not expected to pass them.
pub fn compute_fee(distance_km: f64) -> f64 {
    BASE_FEE + PER_KM_RATE * distance_km.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::compute_fee;

    #[test]
    fn zero_distance_yields_base_fee() {
        assert_eq!(compute_fee(0.0), 500.0);
    }

    #[test]
    fn fee_grows_linearly_with_distance() {
        assert_eq!(compute_fee(5.0), 1000.0);
        assert_eq!(compute_fee(10.0), 1500.0);
    }

    #[test]
    fn negative_distance_clamps_to_base_fee() {
        assert_eq!(compute_fee(-3.0), 500.0);
    }
}
