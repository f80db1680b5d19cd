//! Connection lifecycle state.
//!
//! [`ConnectionState`] is the coarse lifecycle a client moves through,
//! [`HandshakeMachine`] is the sans-IO registration logic that drives it
//! between `Registering` and `Connected`, and [`ShutdownGuard`] makes
//! teardown idempotent.

mod guard;
mod machine;

pub use self::guard::ShutdownGuard;
pub use self::machine::{alternate_nick, HandshakeAction, HandshakeMachine, HandshakeSettings};

/// Where a client is in its connection lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Looking up and connecting to the server's addresses.
    Resolving,
    /// Registration lines sent, waiting for the server to accept them.
    Registering,
    /// `CAP` negotiation in progress.
    NegotiatingCapabilities,
    /// Swapping the plain transport for TLS after `670`.
    UpgradingTransport,
    /// Registered; the consumer task owns the read side.
    Connected,
    /// Teardown in progress.
    ShuttingDown,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Transitions only go forward, except that a finished teardown or a
    /// failed attempt returns to `Disconnected`, and a transport upgrade
    /// returns to the negotiation it interrupted.
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (_, ShuttingDown) => self != ShuttingDown,
            (ShuttingDown, Disconnected) => true,
            (Resolving | Registering | NegotiatingCapabilities | UpgradingTransport, Disconnected) => {
                true
            }
            (Disconnected, Resolving) => true,
            (Resolving, Registering) => true,
            (Registering, NegotiatingCapabilities | UpgradingTransport | Connected) => true,
            (NegotiatingCapabilities, UpgradingTransport | Connected) => true,
            (UpgradingTransport, NegotiatingCapabilities | Registering | Connected) => true,
            _ => false,
        }
    }

    /// Whether a handshake is running.
    pub fn is_handshaking(self) -> bool {
        matches!(
            self,
            Self::Resolving
                | Self::Registering
                | Self::NegotiatingCapabilities
                | Self::UpgradingTransport
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Resolving => "resolving",
            Self::Registering => "registering",
            Self::NegotiatingCapabilities => "negotiating capabilities",
            Self::UpgradingTransport => "upgrading transport",
            Self::Connected => "connected",
            Self::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}
