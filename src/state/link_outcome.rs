/// Per-link results reported by the orchestrator
use std::fmt;

/// What happened to one detail link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Fetched, extracted and upserted
    Stored { canonical_id: String },

    /// Already in the store and `skip_existing` is on
    Skipped { canonical_id: String },

    /// Gave up on the link; the run carries on
    Failed { url: String, reason: FailureReason },
}

impl LinkOutcome {
    /// Returns true if a record was written for this link
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }

    /// Returns true if the link was deliberately not fetched
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns true if the link ended in a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Why a link ended in failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The page could not be loaded after `attempts` tries
    Navigation { attempts: u32, message: String },

    /// The record could not be written after a retry
    Store { message: String },
}

impl FailureReason {
    /// Short label used to group failures in the run summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Navigation { .. } => "navigation",
            Self::Store { .. } => "store",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation { attempts, message } => {
                write!(f, "navigation failed after {} attempt(s): {}", attempts, message)
            }
            Self::Store { message } => write!(f, "store write failed: {}", message),
        }
    }
}
