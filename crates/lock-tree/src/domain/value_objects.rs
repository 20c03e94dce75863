//! Value objects for the lock tree
//!
//! Identifiers, lock modes, key bounds, key ranges and resource costs.
//! All of them are immutable once built.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed per-record overhead charged against `max_lock_memory`, in bytes.
pub const LOCK_RECORD_OVERHEAD: u64 = 96;

/// Encoded size charged for an infinite bound.
pub const INFINITE_BOUND_LEN: u64 = 1;

/// Transaction identifier. Assigned and disposed of by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Opaque table handle used to resolve a comparator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table:{}", self.0)
    }
}

/// Identity of a lock tree within its manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreeId(pub u64);

/// Identity of a lock request, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Lock mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Shared: compatible with other readers.
    Read,
    /// Exclusive: conflicts with every other owner.
    Write,
}

impl LockMode {
    /// Two modes held by distinct owners may overlap only if both are `Read`.
    pub fn compatible_with(self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Read, LockMode::Read))
    }

    /// Whether holding `self` already grants `other`.
    pub fn dominates(self, other: LockMode) -> bool {
        match self {
            LockMode::Write => true,
            LockMode::Read => other == LockMode::Read,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Read => write!(f, "READ"),
            LockMode::Write => write!(f, "WRITE"),
        }
    }
}

/// One end of a key range.
///
/// Infinite bounds sort before (`NegInfinity`) or after (`PosInfinity`) every
/// key; keys are ordered by the table comparator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyBound {
    /// Before every key.
    NegInfinity,
    /// An opaque key.
    Key(Vec<u8>),
    /// After every key.
    PosInfinity,
}

impl KeyBound {
    /// Bytes charged for this bound.
    pub fn encoded_len(&self) -> u64 {
        match self {
            KeyBound::Key(bytes) => bytes.len() as u64,
            KeyBound::NegInfinity | KeyBound::PosInfinity => INFINITE_BOUND_LEN,
        }
    }

    /// The key bytes, if this bound is finite.
    pub fn as_key(&self) -> Option<&[u8]> {
        match self {
            KeyBound::Key(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<&[u8]> for KeyBound {
    fn from(key: &[u8]) -> Self {
        KeyBound::Key(key.to_vec())
    }
}

impl From<Vec<u8>> for KeyBound {
    fn from(key: Vec<u8>) -> Self {
        KeyBound::Key(key)
    }
}

impl From<&str> for KeyBound {
    fn from(key: &str) -> Self {
        KeyBound::Key(key.as_bytes().to_vec())
    }
}

/// Closed key range `[low, high]`.
///
/// `low <= high` is checked by the lock tree against the table comparator,
/// since only the comparator defines the order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    low: KeyBound,
    high: KeyBound,
}

impl KeyRange {
    /// Build a range from two bounds.
    pub fn new(low: impl Into<KeyBound>, high: impl Into<KeyBound>) -> Self {
        Self {
            low: low.into(),
            high: high.into(),
        }
    }

    /// A single-key range.
    pub fn point(key: impl Into<KeyBound>) -> Self {
        let key = key.into();
        Self {
            low: key.clone(),
            high: key,
        }
    }

    /// The whole key space.
    pub fn everything() -> Self {
        Self {
            low: KeyBound::NegInfinity,
            high: KeyBound::PosInfinity,
        }
    }

    /// Lower bound.
    pub fn low(&self) -> &KeyBound {
        &self.low
    }

    /// Upper bound.
    pub fn high(&self) -> &KeyBound {
        &self.high
    }

    /// Bytes charged for both bounds.
    pub fn encoded_len(&self) -> u64 {
        self.low.encoded_len() + self.high.encoded_len()
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bound(b: &KeyBound, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match b {
                KeyBound::NegInfinity => write!(f, "-inf"),
                KeyBound::PosInfinity => write!(f, "+inf"),
                KeyBound::Key(bytes) => match std::str::from_utf8(bytes) {
                    Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{:?}", s),
                    _ => {
                        for byte in bytes {
                            write!(f, "{:02x}", byte)?;
                        }
                        Ok(())
                    }
                },
            }
        }
        write!(f, "[")?;
        bound(&self.low, f)?;
        write!(f, ", ")?;
        bound(&self.high, f)?;
        write!(f, "]")
    }
}

/// Resource cost of one lock record against the manager ceilings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockCost {
    /// Lock slots consumed.
    pub locks: u64,
    /// Estimated bytes consumed.
    pub memory: u64,
}

impl LockCost {
    /// Nothing.
    pub const ZERO: LockCost = LockCost {
        locks: 0,
        memory: 0,
    };

    /// Build a cost from raw parts.
    pub fn new(locks: u64, memory: u64) -> Self {
        Self { locks, memory }
    }

    /// Cost of a record covering `range`: one lock slot plus the fixed
    /// overhead and the encoded length of both bounds.
    pub fn for_range(range: &KeyRange) -> Self {
        Self {
            locks: 1,
            memory: LOCK_RECORD_OVERHEAD + range.encoded_len(),
        }
    }

    /// Component-wise sum.
    pub fn saturating_add(self, other: LockCost) -> LockCost {
        LockCost {
            locks: self.locks.saturating_add(other.locks),
            memory: self.memory.saturating_add(other.memory),
        }
    }

    /// True when both components are zero.
    pub fn is_zero(&self) -> bool {
        self.locks == 0 && self.memory == 0
    }
}
