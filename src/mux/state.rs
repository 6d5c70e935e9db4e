// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::fmt;

/// Lifecycle of the shared connection.
///
/// ```text
///   Idle ──register──▶ Connecting ──connected──▶ Connected
///    ▲                  │    ▲                      │
///    │            disconnect  └────────error────────┤
///    │                  ▼                           │
///    └──disconnect── Disconnecting ◀──last leaves───┘
///                        │
///                        └──disconnect (closing)──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition. Staying in the same
    /// state is always allowed.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Idle, Connecting | Disconnecting) => true,
            (Connecting, Connected | Disconnecting | Idle) => true,
            (Connected, Connecting | Disconnecting | Idle) => true,
            (Disconnecting, Idle | Closed) => true,
            (Closed, _) => false,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;

    #[test]
    fn test_closed_is_terminal() {
        for next in [Idle, Connecting, Connected, Disconnecting] {
            assert!(!Closed.can_transition_to(next));
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_closed_only_reached_through_disconnecting() {
        assert!(Disconnecting.can_transition_to(Closed));
        for from in [Idle, Connecting, Connected] {
            assert!(!from.can_transition_to(Closed));
        }
    }

    #[test]
    fn test_no_direct_connect_from_disconnecting() {
        assert!(!Disconnecting.can_transition_to(Connecting));
        assert!(!Disconnecting.can_transition_to(Connected));
        assert!(!Idle.can_transition_to(Connected));
    }
}
