//! Priority tiers for probe targets

use serde::{Deserialize, Deserializer, Serialize};

/// Operator-declared importance of a target: 1 is highest, 5 is lowest
///
/// Ordering follows the numeric value, so sorting ascending puts the most
/// important targets first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(5);

    /// Create a priority, clamping the value into 1..=5
    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::HIGHEST.0, Self::LOWEST.0))
    }

    /// Numeric tier value
    pub fn value(self) -> u8 {
        self.0
    }

    /// Human-readable tier name
    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "High",
            2 => "Important",
            3 => "Valuable",
            4 => "Experimental",
            _ => "Low",
        }
    }

    /// All tiers, highest first
    pub fn all() -> impl Iterator<Item = Priority> {
        (Self::HIGHEST.0..=Self::LOWEST.0).map(Priority)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Hand-edited files may carry out-of-range or fractional values
        let raw = f64::deserialize(deserializer)?;
        let value = if raw.is_finite() { raw.round().clamp(1.0, 5.0) as u8 } else { Self::LOWEST.0 };
        Ok(Self::new(value))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
