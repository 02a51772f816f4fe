//! Corporate-action price adjustment modes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::AdjustParseError;

/// Price normalization mode for corporate actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Adjust {
    /// Raw prices, no adjustment.
    None,
    /// Provider-chosen default adjustment.
    #[default]
    Auto,
    /// Historical prices adjusted (back/backward adjustment).
    Back,
    /// Recent prices adjusted (forward/front adjustment).
    Forward,
}

impl Adjust {
    /// Returns the adjustment mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Auto => "auto",
            Self::Back => "back",
            Self::Forward => "forward",
        }
    }
}

impl std::fmt::Display for Adjust {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Adjust {
    type Err = AdjustParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "raw" => Ok(Self::None),
            "auto" => Ok(Self::Auto),
            "back" | "backward" => Ok(Self::Back),
            "forward" | "front" => Ok(Self::Forward),
            _ => Err(AdjustParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_aliases() {
        assert_eq!("front".parse::<Adjust>().unwrap(), Adjust::Forward);
        assert_eq!("backward".parse::<Adjust>().unwrap(), Adjust::Back);
        assert_eq!("raw".parse::<Adjust>().unwrap(), Adjust::None);
        assert!("sideways".parse::<Adjust>().is_err());
    }
}
