use serde::{Deserialize, Serialize};
use std::fmt;

/// Forecast request state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Validated and assigned an id
    Created,
    /// Expert panel launched
    Dispatched,
    /// Opinions arriving
    Collecting,
    /// Panel settled, fitting consensus
    Aggregating,
    /// Consensus and recommendation attached
    Completed,
    /// Terminal failure with a reason
    Failed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Created => "CREATED",
            RequestState::Dispatched => "DISPATCHED",
            RequestState::Collecting => "COLLECTING",
            RequestState::Aggregating => "AGGREGATING",
            RequestState::Completed => "COMPLETED",
            RequestState::Failed => "FAILED",
        }
    }

    /// Check if this state can transition to another state.
    /// The machine only moves forward; `Failed` is reachable from any
    /// non-terminal state.
    pub fn can_transition_to(&self, target: RequestState) -> bool {
        use RequestState::*;

        match (self, target) {
            (Created, Dispatched) => true,
            (Dispatched, Collecting) => true,
            (Collecting, Aggregating) => true,
            (Aggregating, Completed) => true,

            (Created | Dispatched | Collecting | Aggregating, Failed) => true,

            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<RequestState> {
        use RequestState::*;

        match self {
            Created => vec![Dispatched, Failed],
            Dispatched => vec![Collecting, Failed],
            Collecting => vec![Aggregating, Failed],
            Aggregating => vec![Completed, Failed],
            Completed | Failed => vec![],
        }
    }

    /// Is the request frozen?
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RequestState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "CREATED" => Ok(RequestState::Created),
            "DISPATCHED" => Ok(RequestState::Dispatched),
            "COLLECTING" => Ok(RequestState::Collecting),
            "AGGREGATING" => Ok(RequestState::Aggregating),
            "COMPLETED" => Ok(RequestState::Completed),
            "FAILED" => Ok(RequestState::Failed),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// Why a request ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidInput,
    NoUsableOpinions,
    InternalError,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InvalidInput => "invalid_input",
            FailureReason::NoUsableOpinions => "no_usable_opinions",
            FailureReason::InternalError => "internal_error",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: RequestState,
    pub to: RequestState,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: RequestState, to: RequestState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestState::*;

    const ALL: [RequestState; 6] = [Created, Dispatched, Collecting, Aggregating, Completed, Failed];

    #[test]
    fn test_forward_path() {
        assert!(Created.can_transition_to(Dispatched));
        assert!(Dispatched.can_transition_to(Collecting));
        assert!(Collecting.can_transition_to(Aggregating));
        assert!(Aggregating.can_transition_to(Completed));
    }

    #[test]
    fn test_no_state_revisited() {
        assert!(!Collecting.can_transition_to(Dispatched));
        assert!(!Aggregating.can_transition_to(Collecting));
        assert!(!Created.can_transition_to(Collecting));
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Failed), !state.is_terminal());
        }
    }

    #[test]
    fn test_terminal_states_frozen() {
        for target in ALL {
            assert!(!Completed.can_transition_to(target));
            assert!(!Failed.can_transition_to(target));
        }
        assert!(Completed.valid_transitions().is_empty());
    }

    #[test]
    fn test_valid_transitions_consistent() {
        for from in ALL {
            for to in ALL {
                assert_eq!(from.can_transition_to(to), from.valid_transitions().contains(&to));
            }
        }
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in ALL {
            assert_eq!(RequestState::try_from(state.as_str()), Ok(state));
        }
        assert!(RequestState::try_from("settled").is_err());
    }

    #[test]
    fn test_failure_reason_codes() {
        assert_eq!(FailureReason::NoUsableOpinions.to_string(), "no_usable_opinions");
        let json = serde_json::to_string(&FailureReason::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
