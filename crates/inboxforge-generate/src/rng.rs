use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::DateRange;
use crate::errors::GenerationError;

/// Relative weight of each hour of day: quiet nights, busy office hours,
/// moderate evenings.
const HOUR_WEIGHTS: [u32; 24] = [
    1, 1, 1, 1, 1, 1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2,
];

/// The single seeded random source of a generation run.
///
/// Every draw (numbers, weighted choices, faker text) goes through the same
/// `ChaCha8Rng`, so a seed fully determines the generated archive.
pub struct RngContext {
    rng: ChaCha8Rng,
    hours: WeightedIndex<u32>,
}

impl RngContext {
    pub fn seeded(seed: u64) -> Result<Self, GenerationError> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            hours: weighted(&HOUR_WEIGHTS)?,
        })
    }

    /// `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.random_bool(p.clamp(0.0, 1.0))
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    pub fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.random_range(0..len)
    }

    pub fn between(&mut self, low: i64, high: i64) -> i64 {
        if low >= high {
            return low;
        }
        self.rng.random_range(low..=high)
    }

    pub fn sample(&mut self, distribution: &WeightedIndex<u32>) -> usize {
        distribution.sample(&mut self.rng)
    }

    pub fn nonce(&mut self) -> u64 {
        self.rng.random()
    }

    /// A timestamp within `range`, with the hour biased toward working hours.
    pub fn timestamp(&mut self, range: &DateRange) -> NaiveDateTime {
        let start = range.start.and_time(NaiveTime::MIN);
        let end = range.end.and_time(NaiveTime::MIN);
        let span = (end - start).num_seconds().max(0);
        let offset = self.rng.random_range(0..=span);
        let base = start + TimeDelta::seconds(offset);

        let hour = self.hours.sample(&mut self.rng) as u32;
        let minute = self.rng.random_range(0..60);
        base.with_hour(hour)
            .and_then(|ts| ts.with_minute(minute))
            .unwrap_or(base)
    }

    /// Underlying generator, for faker-driven text synthesis.
    pub fn inner(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

pub fn weighted(weights: &[u32]) -> Result<WeightedIndex<u32>, GenerationError> {
    WeightedIndex::new(weights.iter().copied())
        .map_err(|err| GenerationError::InvalidConfig(format!("invalid weights: {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn range() -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RngContext::seeded(42).expect("rng");
        let mut b = RngContext::seeded(42).expect("rng");
        for _ in 0..32 {
            assert_eq!(a.nonce(), b.nonce());
            assert_eq!(a.timestamp(&range()), b.timestamp(&range()));
            assert_eq!(a.chance(0.5), b.chance(0.5));
        }
    }

    #[test]
    fn timestamps_stay_within_range_days() {
        let mut rng = RngContext::seeded(7).expect("rng");
        let range = range();
        for _ in 0..500 {
            let ts = rng.timestamp(&range);
            assert!(ts.date() >= range.start);
            assert!(ts.date() <= range.end);
        }
    }

    #[test]
    fn zero_weights_are_rejected() {
        assert!(matches!(
            weighted(&[0, 0]),
            Err(GenerationError::InvalidConfig(_))
        ));
    }
}
