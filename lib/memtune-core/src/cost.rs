//! Rough cost estimation.
//!
//! Pricing here is a simplified linear table over the memory ladder rather than real per-GB-second pricing, and the
//! estimate is only meant to compare buckets against each other.

use std::collections::HashMap;

use crate::{
    bucket::Bucket,
    ladder::{BillingLadder, MemoryLadder},
};

const DEFAULT_REQUEST_BASE_PER_MILLION: f64 = 0.20;
const DEFAULT_UNIT_PRICE_STEP: f64 = 0.000_000_208;

/// Price per billing unit for each size on the memory ladder.
#[derive(Clone, Debug)]
pub struct PricingTable {
    request_base_per_million: f64,
    unit_prices: HashMap<u32, f64>,
}

impl PricingTable {
    /// Creates a pricing table where the size at zero-based position `i` on the ladder costs `unit_price_step * (i + 1)`
    /// per billing unit, plus a flat `request_base_per_million` per million requests.
    pub fn new(memory: &MemoryLadder, request_base_per_million: f64, unit_price_step: f64) -> Self {
        let unit_prices = memory
            .sizes()
            .iter()
            .enumerate()
            .map(|(i, size)| (*size, unit_price_step * (i + 1) as f64))
            .collect();

        Self {
            request_base_per_million,
            unit_prices,
        }
    }

    /// Creates a pricing table with the default request and unit prices.
    pub fn with_defaults(memory: &MemoryLadder) -> Self {
        Self::new(memory, DEFAULT_REQUEST_BASE_PER_MILLION, DEFAULT_UNIT_PRICE_STEP)
    }

    /// Returns the flat price per million requests.
    pub fn request_base_per_million(&self) -> f64 {
        self.request_base_per_million
    }

    /// Returns the price per billing unit for the given memory size.
    ///
    /// Sizes that aren't on the memory ladder have no price.
    pub fn unit_price(&self, size_mb: u32) -> f64 {
        self.unit_prices.get(&size_mb).copied().unwrap_or(0.0)
    }

    /// Estimates the cost of a million requests with the same billed duration distribution as the given bucket.
    pub fn estimate_per_million(&self, bucket: &Bucket, billing: &BillingLadder) -> f64 {
        if bucket.is_empty() {
            return self.request_base_per_million;
        }

        let unit_price = self.unit_price(bucket.size_mb());
        let total = bucket.count() as f64;
        let granularity = billing.granularity_ms();

        bucket
            .billed_durations()
            .fold(self.request_base_per_million, |acc, (billed, count)| {
                let share = count as f64 / total;
                let units = f64::from(billed / granularity);
                acc + unit_price * 1_000_000.0 * share * units
            })
    }
}
