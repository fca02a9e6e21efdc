//! JSON bodies returned by the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::{SubscriberId, SwitchState};

/// Body of `GET /status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: SwitchState,
}

/// Body of a successful `POST /optin`, shaped as a Slack slash-command reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptInAck {
    pub response_type: String,
    pub text: String,
}

impl OptInAck {
    #[must_use]
    pub fn for_subscriber(id: &SubscriberId) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: format!("You have opted in for notifications, <@{id}>."),
        }
    }
}
