//! Correlation ids.
//!
//! A correlation id ties one command frame to its response. It only has to
//! be unique for the lifetime of a single exchange, so a few random hex
//! digits are enough. The device must accept any length from 1 to 8; the
//! generator can vary the length between commands to exercise that.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{FrameError, Result};

/// Shortest correlation id the protocol allows.
pub const MIN_ID_LEN: usize = 1;
/// Longest correlation id the protocol allows.
pub const MAX_ID_LEN: usize = 8;

/// An uppercase hexadecimal token of 1 to 8 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Validate and wrap an existing token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if !is_valid_token(token.as_bytes()) {
            return Err(FrameError::InvalidCorrelationId(token));
        }
        Ok(Self(token))
    }

    /// Generate a random id of exactly `len` characters.
    ///
    /// `len` is clamped into `1..=8`.
    pub fn generate<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let len = len.clamp(MIN_ID_LEN, MAX_ID_LEN);
        let value: u32 = rng.gen();
        let hex = format!("{value:08X}");
        Self(hex[..len].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of hex characters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; ids are never empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn is_valid_token(token: &[u8]) -> bool {
    (MIN_ID_LEN..=MAX_ID_LEN).contains(&token.len())
        && token
            .iter()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b))
}

/// How the generator picks the length of each new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdLengthPolicy {
    /// Always the same length (clamped into `1..=8`).
    Fixed(usize),
    /// 1, 2, ... 8, then back to 1.
    #[default]
    Cycle,
    /// Uniformly random in `1..=8`.
    Random,
}

/// Produces fresh correlation ids according to an [`IdLengthPolicy`].
#[derive(Debug, Clone)]
pub struct IdGenerator {
    policy: IdLengthPolicy,
    last_len: usize,
    rng: StdRng,
}

impl IdGenerator {
    /// Generator seeded from OS entropy.
    pub fn new(policy: IdLengthPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// Deterministic generator, for tests and reproducible runs.
    pub fn seeded(policy: IdLengthPolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(policy: IdLengthPolicy, rng: StdRng) -> Self {
        Self {
            policy,
            last_len: 0,
            rng,
        }
    }

    pub fn policy(&self) -> IdLengthPolicy {
        self.policy
    }

    /// Produce the next id.
    pub fn next_id(&mut self) -> CorrelationId {
        let len = match self.policy {
            IdLengthPolicy::Fixed(len) => len,
            IdLengthPolicy::Cycle => {
                if self.last_len < MAX_ID_LEN {
                    self.last_len + 1
                } else {
                    MIN_ID_LEN
                }
            }
            IdLengthPolicy::Random => self.rng.gen_range(MIN_ID_LEN..=MAX_ID_LEN),
        };
        let id = CorrelationId::generate(len, &mut self.rng);
        self.last_len = id.len();
        id
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(IdLengthPolicy::default())
    }
}
