//! Lifecycle states and the operations that move a component between them.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Current state of a lifecycle component
///
/// ```text
/// Created ─initialize─▶ Initialized ─start─▶ Started ─stop─▶ Stopped ─terminate─▶ Terminated
///                            ▲                                  │
///                            └──────────────start───────────────┘
/// any failed transition ─▶ Error ─terminate─▶ Terminated
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum LifecycleStatus {
    Created,
    Initializing,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
    Error,
}

/// A single lifecycle transition request
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum LifecycleOperation {
    Initialize,
    Start,
    Stop,
    Terminate,
}

impl LifecycleOperation {
    /// Returns `true` if the operation may be attempted from `status`.
    pub fn is_allowed_from(self, status: LifecycleStatus) -> bool {
        use LifecycleStatus::*;
        match self {
            Self::Initialize => status == Created,
            Self::Start => matches!(status, Initialized | Stopped),
            Self::Stop => status == Started,
            Self::Terminate => matches!(status, Stopped | Error),
        }
    }

    /// State held while the operation's hook runs
    pub fn transient_status(self) -> LifecycleStatus {
        match self {
            Self::Initialize => LifecycleStatus::Initializing,
            Self::Start => LifecycleStatus::Starting,
            Self::Stop => LifecycleStatus::Stopping,
            Self::Terminate => LifecycleStatus::Terminating,
        }
    }

    /// State reached when the operation succeeds
    pub fn target_status(self) -> LifecycleStatus {
        match self {
            Self::Initialize => LifecycleStatus::Initialized,
            Self::Start => LifecycleStatus::Started,
            Self::Stop => LifecycleStatus::Stopped,
            Self::Terminate => LifecycleStatus::Terminated,
        }
    }
}
