//! The closed set of command actions the hub will relay.
//!
//! Actions outside this set are rejected at command creation; the closed
//! set is the hub's only validation of command content -- parameters are
//! opaque to it.

/// Every action an admin or dashboard may issue, grouped by the worker
/// family that implements it.
pub const VALID_ACTIONS: &[&str] = &[
    // Universal
    "pause",
    "resume",
    "status",
    "get_state",
    // Executor
    "close_all",
    "close_symbol",
    "close_position",
    "reload_config",
    "get_symbol_config",
    "set_symbol_config",
    "get_general_config",
    "set_general_config",
    // Preditor
    "load_model",
    "unload_model",
    "list_models",
    "get_available_models",
    "request_history",
    // Connector
    "get_history",
    "get_account",
    "get_positions",
    "reconnect",
];

/// Whether `action` belongs to [`VALID_ACTIONS`].
#[must_use]
pub fn is_valid_action(action: &str) -> bool {
    VALID_ACTIONS.contains(&action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_listed_action() {
        for action in VALID_ACTIONS {
            assert!(is_valid_action(action), "{action} should be valid");
        }
    }

    #[test]
    fn rejects_unlisted_actions() {
        for action in ["hack", "shutdown", "", "PAUSE", "pause "] {
            assert!(!is_valid_action(action), "{action:?} should be invalid");
        }
    }

    #[test]
    fn action_count_is_stable() {
        assert_eq!(VALID_ACTIONS.len(), 21);
    }
}
