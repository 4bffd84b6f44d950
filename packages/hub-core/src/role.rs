//! Worker roles.
//!
//! A role is self-declared during authentication and selects which fan-out
//! sets the worker participates in. The hub stores whatever string the peer
//! declared -- an unrecognized role simply matches no fan-out filter --
//! so the enum carries an `Other` variant preserving the verbatim string.

use std::fmt;

use serde::{Serialize, Serializer};

/// Classification of a connected worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// Market data / broker bridge. Publishes bars, order results,
    /// position events, and account updates.
    Connector,
    /// Prediction engine. Consumes bars and history, publishes signals.
    Preditor,
    /// Order executor. Consumes signals, publishes order commands.
    Executor,
    /// Operator dashboard. Read-mostly; may issue commands.
    Dashboard,
    /// Administrative client. May issue commands.
    Admin,
    /// Legacy monolithic worker. Generic authenticated peer with no
    /// fan-out subscriptions; first in command target resolution.
    Bot,
    /// Not yet authenticated.
    Unknown,
    /// A role string outside the known set, kept verbatim.
    Other(String),
}

impl Role {
    /// Parses a declared role string. Unrecognized strings are preserved
    /// in [`Role::Other`] rather than rejected.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "connector" => Self::Connector,
            "preditor" => Self::Preditor,
            "executor" => Self::Executor,
            "dashboard" => Self::Dashboard,
            "admin" => Self::Admin,
            "bot" => Self::Bot,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The wire representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connector => "connector",
            Self::Preditor => "preditor",
            Self::Executor => "executor",
            Self::Dashboard => "dashboard",
            Self::Admin => "admin",
            Self::Bot => "bot",
            Self::Unknown => "unknown",
            Self::Other(s) => s,
        }
    }

    /// Whether this role may issue commands over the WebSocket surface.
    #[must_use]
    pub fn can_issue_commands(&self) -> bool {
        matches!(self, Self::Admin | Self::Dashboard)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_roles() {
        assert_eq!(Role::parse("connector"), Role::Connector);
        assert_eq!(Role::parse("preditor"), Role::Preditor);
        assert_eq!(Role::parse("executor"), Role::Executor);
        assert_eq!(Role::parse("dashboard"), Role::Dashboard);
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("bot"), Role::Bot);
    }

    #[test]
    fn parse_preserves_unknown_strings() {
        let role = Role::parse("scalper");
        assert_eq!(role, Role::Other("scalper".to_owned()));
        assert_eq!(role.as_str(), "scalper");
    }

    #[test]
    fn round_trips_through_wire_form() {
        for s in ["connector", "preditor", "executor", "dashboard", "admin", "bot"] {
            assert_eq!(Role::parse(s).as_str(), s);
        }
    }

    #[test]
    fn only_admin_and_dashboard_issue_commands() {
        assert!(Role::Admin.can_issue_commands());
        assert!(Role::Dashboard.can_issue_commands());
        assert!(!Role::Connector.can_issue_commands());
        assert!(!Role::Bot.can_issue_commands());
        assert!(!Role::Unknown.can_issue_commands());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Role::Preditor).unwrap();
        assert_eq!(json, "\"preditor\"");
    }
}
