use std::sync::Arc;

use tokio::sync::watch;

/// Connection lifecycle. `Closed` and `Failed` are terminal; only `Idle`
/// may transition to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, Reconnecting)
                | (Connecting, Closing)
                | (Open, Reconnecting)
                | (Open, Closing)
                | (Reconnecting, Open)
                | (Reconnecting, Failed)
                | (Reconnecting, Closing)
                | (Closing, Closed)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared state holder; transitions are validated against the table
/// above and observable through a watch channel.
#[derive(Clone)]
pub(crate) struct StateCell {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl StateCell {
    pub(crate) fn new() -> (Self, watch::Receiver<ConnectionState>) {
        let (tx, rx) = watch::channel(ConnectionState::Idle);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply a transition; illegal ones are refused and logged.
    pub(crate) fn set(&self, next: ConnectionState) -> bool {
        let current = self.get();
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            tracing::warn!("refusing state transition {} -> {}", current, next);
            return false;
        }
        tracing::debug!("connection state {} -> {}", current, next);
        self.tx.send_replace(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        for (from, to) in [
            (Idle, Connecting),
            (Connecting, Open),
            (Open, Closing),
            (Closing, Closed),
        ] {
            assert!(from.can_transition_to(to), "{} -> {}", from, to);
        }
    }

    #[test]
    fn reconnect_path_is_legal() {
        assert!(Open.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Open));
        assert!(Reconnecting.can_transition_to(Failed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [Closed, Failed] {
            for next in [Idle, Connecting, Open, Reconnecting, Closing, Closed, Failed] {
                if next == terminal {
                    continue;
                }
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn only_idle_may_start_connecting() {
        for from in [Open, Reconnecting, Closing, Closed, Failed] {
            assert!(!from.can_transition_to(Connecting), "{} -> connecting", from);
        }
    }

    #[test]
    fn cell_refuses_illegal_transitions() {
        let (cell, rx) = StateCell::new();
        assert!(cell.set(Connecting));
        assert!(!cell.set(Closed));
        assert_eq!(*rx.borrow(), Connecting);
        assert!(cell.set(Open));
        assert_eq!(*rx.borrow(), Open);
    }
}
