//! Pricing calculation: upstream decimal cost to integer microcents.

use crate::types::PricingResult;

/// Default markup applied on top of the provider-reported cost.
pub const DEFAULT_MARKUP_RATE: f64 = 0.15;

/// One microcent is 1/100,000,000 of a major currency unit.
const MICROCENTS_PER_MAJOR_UNIT: f64 = 100_000_000.0;

/// Converts a provider-reported cost (major currency units) into integer
/// microcents with a deterministic markup.
#[derive(Debug, Clone, Copy)]
pub struct PricingCalculator {
    markup_rate: f64,
}

impl Default for PricingCalculator {
    fn default() -> Self {
        Self {
            markup_rate: DEFAULT_MARKUP_RATE,
        }
    }
}

impl PricingCalculator {
    pub fn new(markup_rate: f64) -> Self {
        Self { markup_rate }
    }

    /// Price an upstream cost.
    ///
    /// Returns `None` when the cost is missing, non-finite, or negative:
    /// "no cost available" means do not bill, never bill zero. Rounding is
    /// half-up (f64::round on non-negative values).
    pub fn price_cost(&self, cost_major_units: Option<f64>) -> Option<PricingResult> {
        let cost = cost_major_units.filter(|c| c.is_finite() && *c >= 0.0)?;

        let base_microcents = (cost * MICROCENTS_PER_MAJOR_UNIT).round() as i64;
        let markup_microcents = (base_microcents as f64 * self.markup_rate).round() as i64;

        Some(PricingResult {
            base_microcents,
            markup_microcents,
            total_microcents: base_microcents + markup_microcents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_cost_basic() {
        let pricing = PricingCalculator::default();

        // $0.02 -> 2,000,000 microcents base, 15% markup.
        let result = pricing.price_cost(Some(0.02)).unwrap();
        assert_eq!(result.base_microcents, 2_000_000);
        assert_eq!(result.markup_microcents, 300_000);
        assert_eq!(result.total_microcents, 2_300_000);
    }

    #[test]
    fn test_price_cost_missing_is_none() {
        let pricing = PricingCalculator::default();
        assert!(pricing.price_cost(None).is_none());
    }

    #[test]
    fn test_price_cost_non_finite_is_none() {
        let pricing = PricingCalculator::default();
        assert!(pricing.price_cost(Some(f64::NAN)).is_none());
        assert!(pricing.price_cost(Some(f64::INFINITY)).is_none());
        assert!(pricing.price_cost(Some(-0.01)).is_none());
    }

    #[test]
    fn test_price_cost_zero_bills_zero() {
        // A present zero cost is still a priceable cost, distinct from
        // "no cost available".
        let pricing = PricingCalculator::default();
        let result = pricing.price_cost(Some(0.0)).unwrap();
        assert_eq!(result.total_microcents, 0);
    }

    #[test]
    fn test_markup_rounds_half_up() {
        // base = 10 microcents, 15% markup = 1.5 -> rounds to 2.
        let pricing = PricingCalculator::default();
        let result = pricing.price_cost(Some(0.000_000_1)).unwrap();
        assert_eq!(result.base_microcents, 10);
        assert_eq!(result.markup_microcents, 2);
        assert_eq!(result.total_microcents, 12);
    }

    #[test]
    fn test_custom_markup_rate() {
        let pricing = PricingCalculator::new(0.0);
        let result = pricing.price_cost(Some(1.0)).unwrap();
        assert_eq!(result.base_microcents, 100_000_000);
        assert_eq!(result.markup_microcents, 0);
        assert_eq!(result.total_microcents, 100_000_000);
    }
}
