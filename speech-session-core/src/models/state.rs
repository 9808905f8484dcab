use super::error::SessionError;

/// Session controller state machine.
///
/// State transitions:
/// ```text
/// idle → starting → listening → stopping → idle
///           ↓           ↓
///           └─ errored ─┘ → idle
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Listening,
    Stopping,
    Errored(SessionError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, Self::Listening)
    }

    /// Every state except `Idle` belongs to a live session.
    pub fn is_active(&self) -> bool {
        !self.is_idle()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Stopping => "stopping",
            Self::Errored(_) => "errored",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let state = SessionState::default();
        assert!(state.is_idle());
        assert!(!state.is_active());
        assert_eq!(state.name(), "idle");
    }

    #[test]
    fn errored_counts_as_active() {
        let state = SessionState::Errored(SessionError::BackendFault("crash".into()));
        assert!(state.is_active());
        assert!(!state.is_listening());
        assert_eq!(state.name(), "errored");
    }
}
