//! Client-side sync status

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Sync state of a single note, and of the orchestrator as a whole.
///
/// Never sent to the server and never part of conflict resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Matches the last canonical copy received from the server
    Synced,
    /// Has local changes the server has not confirmed
    #[default]
    Pending,
    /// The last attempt to push local changes failed
    Error,
}

impl SyncStatus {
    /// Stable lowercase name, used for storage and display
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `synced -> pending`, `pending -> synced`, `pending -> error` and
    /// `error -> pending` are legal; staying put is always allowed.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Synced, Self::Synced | Self::Pending)
                | (Self::Pending, _)
                | (Self::Error, Self::Error | Self::Pending)
        )
    }

    /// Whether the note still carries changes the server has not accepted
    pub const fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "error" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}
