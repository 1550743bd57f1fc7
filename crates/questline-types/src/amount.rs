use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-negative token balance. Ledger deltas are signed separately;
/// a stored balance can never go below zero.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_tokens(tokens: u64) -> Self {
        Self(tokens)
    }

    pub fn to_tokens(&self) -> u64 {
        self.0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Apply a signed ledger delta. `None` when the result would
    /// underflow zero or overflow `u64`.
    pub fn checked_apply(&self, delta: i64) -> Option<Self> {
        if delta >= 0 {
            self.0.checked_add(delta as u64).map(Self)
        } else {
            self.0.checked_sub(delta.unsigned_abs()).map(Self)
        }
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_apply() {
        let balance = TokenAmount::from_tokens(100);
        assert_eq!(
            balance.checked_apply(50),
            Some(TokenAmount::from_tokens(150))
        );
        assert_eq!(
            balance.checked_apply(-100),
            Some(TokenAmount::ZERO)
        );
        assert_eq!(balance.checked_apply(-101), None);
        assert_eq!(TokenAmount::from_tokens(u64::MAX).checked_apply(1), None);
    }

    #[test]
    fn test_saturating_ops() {
        let a = TokenAmount::from_tokens(10);
        let b = TokenAmount::from_tokens(25);
        assert_eq!(a.saturating_sub(b), TokenAmount::ZERO);
        assert_eq!(b.saturating_sub(a), TokenAmount::from_tokens(15));
    }
}
