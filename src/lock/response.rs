//! Response-once types.

use std::fmt;

// == Request Origin ==
/// Identity of the request a reply belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestOrigin {
    /// A text command, identified by its message id
    Message(u64),
    /// A slash command or component interaction
    Interaction(u64),
    /// Anything else with a stable identity (e.g. an HTTP request id)
    Other(String),
}

impl RequestOrigin {
    /// Key used in the response-lock namespace.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RequestOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOrigin::Message(id) => write!(f, "message:{}", id),
            RequestOrigin::Interaction(id) => write!(f, "interaction:{}", id),
            RequestOrigin::Other(id) => write!(f, "other:{}", id),
        }
    }
}

// == Response Outcome ==
/// What happened to one attempt at answering a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome<T> {
    /// This attempt sent the reply
    Sent(T),
    /// Another attempt already answered the request
    Suppressed,
    /// The response lock was not acquired in time
    TimedOut,
}

impl<T> ResponseOutcome<T> {
    pub fn is_sent(&self) -> bool {
        matches!(self, ResponseOutcome::Sent(_))
    }

    pub fn into_sent(self) -> Option<T> {
        match self {
            ResponseOutcome::Sent(value) => Some(value),
            _ => None,
        }
    }
}
