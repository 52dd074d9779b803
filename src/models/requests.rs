//! Request DTOs for the operational API
//!
//! Defines the structure of incoming path parameters.

use std::fmt;

use serde::Deserialize;

/// Manual override in POST /breakers/:name/:action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerAction {
    /// Close and zero every counter
    Reset,
    /// Force open
    Open,
    /// Force closed
    Close,
}

impl fmt::Display for BreakerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BreakerAction::Reset => "reset",
            BreakerAction::Open => "open",
            BreakerAction::Close => "close",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_action_deserialize() {
        let action: BreakerAction = serde_json::from_str(r#""reset""#).unwrap();
        assert_eq!(action, BreakerAction::Reset);
        let action: BreakerAction = serde_json::from_str(r#""close""#).unwrap();
        assert_eq!(action.to_string(), "close");
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_str::<BreakerAction>(r#""explode""#).is_err());
    }
}
