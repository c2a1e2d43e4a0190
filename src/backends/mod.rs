// Backend trait definitions and core types

pub mod transport;

/// Backend priority ranking (higher = better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendPriority {
    Fallback = 1, // Works but limited (periodic polling)
    Better = 2,   // Server push (WebSocket stream)
}

/// Capabilities that a backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Snapshots arrive as the proxy produces them
    pub push: bool,
}
