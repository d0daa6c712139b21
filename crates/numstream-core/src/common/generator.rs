//! Sequence generation strategies.
//!
//! A generator turns a quantity and a seed into an ordered sequence of
//! values. The server picks a [`Strategy`] once per call from the RPC method;
//! everything downstream works against [`SequenceGenerator`] and never looks
//! at which strategy is active.

use crate::{Error, Result, types::Value};
use core::fmt;
use rand::{TryRngCore, rngs::OsRng};

/// Produces an ordered sequence of values from a quantity and a seed.
pub trait SequenceGenerator {
    /// Generates the sequence for a request of `quantity` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if a random source is needed and
    /// unavailable.
    fn generate(&self, quantity: usize, seed: &Value) -> Result<Vec<Value>>;
}

/// Deterministic strategy: `seed, seed * 2, seed * 4, ...`.
///
/// Produces exactly `quantity` values; the seed counts as the first one.
#[derive(Clone, Copy, Debug, Default)]
pub struct Doubling;

impl SequenceGenerator for Doubling {
    fn generate(&self, quantity: usize, seed: &Value) -> Result<Vec<Value>> {
        let mut sequence: Vec<Value> = Vec::with_capacity(quantity);
        let mut value = seed.clone();
        for _ in 0..quantity {
            let next = &value << 1_u32;
            sequence.push(core::mem::replace(&mut value, next));
        }
        Ok(sequence)
    }
}

/// Random strategy: `quantity + 1` independent values, uniform over
/// `[0, MAX_RANDOM_VALUE]`.
///
/// The seed is ignored. Values come from the wrapped entropy source, which
/// defaults to the operating system's.
///
/// [`MAX_RANDOM_VALUE`]: crate::types::MAX_RANDOM_VALUE
#[derive(Clone, Debug, Default)]
pub struct Random<R = OsRng> {
    source: R,
}

impl<R> Random<R> {
    /// Creates a random strategy drawing from `source`.
    pub const fn with_source(source: R) -> Self {
        Self { source }
    }
}

impl<R> SequenceGenerator for Random<R>
where
    R: TryRngCore + Clone,
{
    fn generate(&self, quantity: usize, _seed: &Value) -> Result<Vec<Value>> {
        // Each call gets its own handle on the source so `&self` suffices.
        let mut source = self.source.clone();
        (0..=quantity)
            .map(|_| {
                source
                    .try_next_u32()
                    .map(Value::from)
                    .map_err(|e| Error::Entropy {
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}

/// The generation strategy of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    Doubling,
    Random,
}

impl Strategy {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Doubling => "doubling",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl SequenceGenerator for Strategy {
    fn generate(&self, quantity: usize, seed: &Value) -> Result<Vec<Value>> {
        match self {
            Self::Doubling => Doubling.generate(quantity, seed),
            Self::Random => Random::<OsRng>::default().generate(quantity, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_RANDOM_VALUE;
    use rand::rand_core::{RngCore, impls};

    #[test]
    fn doubling_starts_at_seed_and_doubles() {
        for (quantity, seed) in [(1_usize, 0_u32), (4, 1), (10, 3), (70, 255)] {
            let seed = Value::from(seed);
            let sequence = Doubling.generate(quantity, &seed).unwrap();
            assert_eq!(sequence.len(), quantity);
            assert_eq!(sequence[0], seed);
            for pair in sequence.windows(2) {
                assert_eq!(pair[1], &pair[0] * 2_u32);
            }
        }
    }

    #[test]
    fn doubling_of_one() {
        let sequence = Doubling.generate(4, &Value::from(1_u32)).unwrap();
        let expected: Vec<Value> = [1_u32, 2, 4, 8].into_iter().map(Value::from).collect();
        assert_eq!(sequence, expected);
    }

    #[test]
    fn doubling_outgrows_u64() {
        let sequence = Doubling.generate(100, &Value::from(1_u32)).unwrap();
        assert_eq!(sequence[99], Value::from(1_u32) << 99_u32);
    }

    #[test]
    fn doubling_zero_quantity_is_empty() {
        assert!(Doubling.generate(0, &Value::from(7_u32)).unwrap().is_empty());
    }

    #[test]
    fn random_yields_one_extra_value_within_bounds() {
        let max = Value::from(MAX_RANDOM_VALUE);
        for quantity in [0_usize, 1, 10, 500] {
            let sequence = Random::<OsRng>::default()
                .generate(quantity, &Value::ZERO)
                .unwrap();
            assert_eq!(sequence.len(), quantity + 1);
            assert!(sequence.iter().all(|v| *v <= max));
        }
    }

    #[test]
    fn strategy_dispatches_to_variant() {
        let seed = Value::from(5_u32);
        assert_eq!(Strategy::Doubling.generate(3, &seed).unwrap().len(), 3);
        assert_eq!(Strategy::Random.generate(3, &seed).unwrap().len(), 4);
        assert_eq!(Strategy::Random.to_string(), "random");
    }

    #[derive(Clone)]
    struct FixedSource(u32);

    impl RngCore for FixedSource {
        fn next_u32(&mut self) -> u32 {
            self.0
        }

        fn next_u64(&mut self) -> u64 {
            u64::from(self.0)
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            impls::fill_bytes_via_next(self, dst);
        }
    }

    #[test]
    fn random_uses_injected_source() {
        let sequence = Random::with_source(FixedSource(u32::MAX))
            .generate(2, &Value::ZERO)
            .unwrap();
        assert_eq!(sequence, vec![Value::from(u32::MAX); 3]);
    }

    #[derive(Clone)]
    struct Unavailable;

    impl TryRngCore for Unavailable {
        type Error = std::io::Error;

        fn try_next_u32(&mut self) -> core::result::Result<u32, Self::Error> {
            Err(std::io::Error::other("no entropy"))
        }

        fn try_next_u64(&mut self) -> core::result::Result<u64, Self::Error> {
            Err(std::io::Error::other("no entropy"))
        }

        fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> core::result::Result<(), Self::Error> {
            Err(std::io::Error::other("no entropy"))
        }
    }

    #[test]
    fn random_surfaces_entropy_failure() {
        let err = Random::with_source(Unavailable)
            .generate(3, &Value::ZERO)
            .unwrap_err();
        assert!(matches!(err, Error::Entropy { ref reason } if reason == "no entropy"));
    }
}
