//! Session capability tiers.
//!
//! A tier selects the model and tool surface an agent session runs with.
//! Higher tiers use more capable (and costlier) models; escalation only ever
//! moves upward, so [`Tier::next`] is the sole way to derive a successor.

use serde::{Deserialize, Serialize};

/// Capability level of an agent session, 1 through 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Routine health checks with the cheapest model.
    One,
    /// Focused investigation with a mid-range model.
    Two,
    /// Full remediation authority with the most capable model.
    Three,
}

impl Tier {
    /// Lowest tier.
    pub const MIN: Tier = Tier::One;
    /// Highest tier.
    pub const MAX: Tier = Tier::Three;

    /// Numeric value (1–3) as stored and exposed on the wire.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
        }
    }

    /// Parse a numeric tier. Returns `None` outside 1–3.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Tier> {
        match value {
            1 => Some(Tier::One),
            2 => Some(Tier::Two),
            3 => Some(Tier::Three),
            _ => None,
        }
    }

    /// The next tier up, or `None` at [`Tier::MAX`].
    #[must_use]
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::One => Some(Tier::Two),
            Tier::Two => Some(Tier::Three),
            Tier::Three => None,
        }
    }

    /// Clamp into `[MIN, max]`.
    #[must_use]
    pub fn clamp_to(self, max: Tier) -> Tier {
        if self > max { max } else { self }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.as_u8()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Tier::from_u8(value).ok_or_else(|| format!("tier out of range: {value}"))
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
