//! Session lifecycle notifications.

use std::fmt;

/// Broadcast once each time the active session is torn down.
///
/// Observers (a UI, the CLI) react by sending the user back to login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnded {
    /// The user logged out.
    Logout,
    /// The refresh token was rejected; credentials were discarded.
    RefreshRejected,
    /// The account was deleted.
    ProfileDeleted,
}

impl fmt::Display for SessionEnded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionEnded::Logout => "logged out",
            SessionEnded::RefreshRejected => "session expired",
            SessionEnded::ProfileDeleted => "account deleted",
        })
    }
}
