//! Handshake state machine.

/// Handshake progress, in the order the states are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    /// No connection.
    Disconnected,
    /// TLS session up, nothing sent.
    TlsConnected,
    /// Watermark uploaded.
    SignatureSent,
    /// Server challenge received.
    HelloReceived,
    /// Login sent.
    AuthSent,
    /// Session accepted by the server.
    WelcomeReceived,
    /// Stream handed over to the tunnel.
    Established,
}

impl HandshakeState {
    /// The state that follows this one on success.
    pub fn next(self) -> Option<Self> {
        use HandshakeState::*;
        match self {
            Disconnected => Some(TlsConnected),
            TlsConnected => Some(SignatureSent),
            SignatureSent => Some(HelloReceived),
            HelloReceived => Some(AuthSent),
            AuthSent => Some(WelcomeReceived),
            WelcomeReceived => Some(Established),
            Established => None,
        }
    }

    pub fn is_established(self) -> bool {
        self == Self::Established
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::TlsConnected => "TLS Connected",
            Self::SignatureSent => "Signature Sent",
            Self::HelloReceived => "Hello Received",
            Self::AuthSent => "Auth Sent",
            Self::WelcomeReceived => "Welcome Received",
            Self::Established => "Established",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_advance_in_order() {
        let mut state = HandshakeState::Disconnected;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            assert!(next > state);
            state = next;
            seen.push(state);
        }
        assert_eq!(seen.len(), 7);
        assert!(state.is_established());
        assert_eq!(state.to_string(), "Established");
    }
}
