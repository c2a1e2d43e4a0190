/// Whether new reconciliation results are published to the visible active view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Live,
    Paused,
}

impl RefreshState {
    pub fn label(self) -> &'static str {
        match self {
            RefreshState::Live => "LIVE",
            RefreshState::Paused => "PAUSED",
        }
    }
}

/// Manual pause/resume toggle for the active view
#[derive(Debug, Default)]
pub struct RefreshGate {
    state: RefreshState,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == RefreshState::Live
    }

    pub fn toggle(&mut self) -> RefreshState {
        self.state = match self.state {
            RefreshState::Live => RefreshState::Paused,
            RefreshState::Paused => RefreshState::Live,
        };
        log::info!("Refresh {}", self.state.label());
        self.state
    }
}
