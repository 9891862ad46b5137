//! Switch state machine deciding which session is attached.

use super::registry::Session;

/// Which session is attached and whether a switch is awaiting confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SwitchState {
    #[default]
    NoSession,
    Active {
        current: Session,
    },
    SwitchPending {
        current: Session,
        candidate: Session,
    },
}

impl SwitchState {
    fn name(&self) -> &'static str {
        match self {
            Self::NoSession => "no-session",
            Self::Active { .. } => "active",
            Self::SwitchPending { .. } => "switch-pending",
        }
    }
}

/// What the owner loop should do after [`SessionController::observe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerAction {
    /// Attach to this session now.
    Attach(Session),
    /// Ask the user whether to switch to this session.
    PromptSwitch(Session),
    /// Nothing to do.
    None,
}

/// Tracks the attached session. Only one session is attached at a time.
#[derive(Debug, Clone, Default)]
pub struct SessionController {
    state: SwitchState,
}

impl SessionController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &SwitchState {
        &self.state
    }

    #[must_use]
    pub fn current(&self) -> Option<&Session> {
        match &self.state {
            SwitchState::NoSession => None,
            SwitchState::Active { current } | SwitchState::SwitchPending { current, .. } => {
                Some(current)
            }
        }
    }

    #[must_use]
    pub fn current_id(&self) -> Option<&str> {
        self.current().map(|s| s.id.as_str())
    }

    #[must_use]
    pub fn candidate(&self) -> Option<&Session> {
        match &self.state {
            SwitchState::SwitchPending { candidate, .. } => Some(candidate),
            _ => None,
        }
    }

    fn transition(&mut self, from: &'static str, next: SwitchState) {
        tracing::debug!(from, to = next.name(), "Switch state transition");
        self.state = next;
    }

    /// Record a newly discovered session.
    ///
    /// The first session is attached automatically. Later ones become the
    /// pending candidate, replacing any earlier candidate.
    pub fn observe(&mut self, session: Session) -> ControllerAction {
        if self.current_id() == Some(session.id.as_str())
            || self.candidate().is_some_and(|c| c.id == session.id)
        {
            return ControllerAction::None;
        }

        let from = self.state.name();
        match std::mem::take(&mut self.state) {
            SwitchState::NoSession => {
                self.transition(from, SwitchState::Active {
                    current: session.clone(),
                });
                ControllerAction::Attach(session)
            }
            SwitchState::Active { current } | SwitchState::SwitchPending { current, .. } => {
                self.transition(from, SwitchState::SwitchPending {
                    current,
                    candidate: session.clone(),
                });
                ControllerAction::PromptSwitch(session)
            }
        }
    }

    /// Attach to `session` directly, discarding any pending candidate.
    pub fn attach(&mut self, session: Session) {
        self.transition(self.state.name(), SwitchState::Active { current: session });
    }

    /// Accept the pending candidate. Returns the session to attach.
    pub fn switch(&mut self) -> Option<Session> {
        let from = self.state.name();
        match std::mem::take(&mut self.state) {
            SwitchState::SwitchPending { candidate, .. } => {
                self.transition(from, SwitchState::Active {
                    current: candidate.clone(),
                });
                Some(candidate)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Reject the pending candidate. Returns the discarded session.
    pub fn ignore(&mut self) -> Option<Session> {
        let from = self.state.name();
        match std::mem::take(&mut self.state) {
            SwitchState::SwitchPending { current, candidate } => {
                self.transition(from, SwitchState::Active { current });
                Some(candidate)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Drop the attached session and any candidate.
    pub fn detach(&mut self) {
        self.transition(self.state.name(), SwitchState::NoSession);
    }
}
