use serde::{Deserialize, Serialize};

use super::{is_not, ClientRoles, RouterRoles, URI};

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct HelloDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent: Option<String>,
    /// Self-claimed identity, unverified: this router has no challenge-
    /// response authentication, so `authid`/`authrole` are whatever the
    /// client asserts. `router::auth` treats them as authorization
    /// principals on that basis.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "authid")]
    pub auth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "authrole")]
    pub auth_role: Option<String>,
    #[serde(default)]
    roles: ClientRoles,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct WelcomeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent: Option<String>,
    roles: RouterRoles,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct SubscribeOptions {}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct PublishOptions {
    #[serde(default, skip_serializing_if = "is_not")]
    acknowledge: bool,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct RegisterOptions {}

/// Options a caller attaches to CALL. `receive_progress` asks the callee to
/// stream intermediate YIELDs as progressive RESULTs ahead of the final one.
/// `disclose_me` asks the dealer to reveal the caller's identity to the
/// callee in the INVOCATION's details.
#[derive(PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct CallOptions {
    #[serde(default, rename = "receive_progress", skip_serializing_if = "is_not")]
    pub receive_progress: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, rename = "disclose_me", skip_serializing_if = "is_not")]
    pub disclose_me: bool,
}

/// Options a callee attaches to YIELD. `progress = true` marks this YIELD as
/// an intermediate result; the pending call stays open until a final YIELD.
#[derive(PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct YieldOptions {
    #[serde(default, skip_serializing_if = "is_not")]
    pub progress: bool,
}

/// `mode` controls how a CANCEL propagates to the callee: "skip" drops the
/// pending call locally without notifying the callee, "kill" sends INTERRUPT
/// and waits for an error YIELD, "killnowait" sends INTERRUPT but answers the
/// caller immediately rather than waiting for the callee to respond.
#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct CallCancelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct InterruptOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct EventDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    trustlevel: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<URI>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct InvocationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<URI>,

    #[serde(default, rename = "receive_progress", skip_serializing_if = "is_not")]
    pub receive_progress: bool,

    /// The caller's session id, disclosed when the CALL carried `disclose_me`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<u64>,

    #[serde(default, rename = "caller_authid", skip_serializing_if = "Option::is_none")]
    pub caller_authid: Option<String>,
}

/// `progress = true` marks a RESULT as intermediate; the caller keeps the
/// pending call open and waits for a final, non-progressive RESULT.
#[derive(PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct ResultDetails {
    #[serde(default, skip_serializing_if = "is_not")]
    pub progress: bool,
}

impl HelloDetails {
    pub fn new(roles: ClientRoles) -> HelloDetails {
        HelloDetails {
            roles,
            agent: None,
            auth_id: None,
            auth_role: None,
        }
    }

    pub fn new_with_agent(roles: ClientRoles, agent: &str) -> HelloDetails {
        HelloDetails {
            roles,
            agent: Some(agent.to_string()),
            auth_id: None,
            auth_role: None,
        }
    }
}

impl WelcomeDetails {
    pub fn new(roles: RouterRoles) -> WelcomeDetails {
        WelcomeDetails { roles, agent: None }
    }

    pub fn new_with_agent(roles: RouterRoles, agent: &str) -> WelcomeDetails {
        WelcomeDetails {
            roles,
            agent: Some(agent.to_string()),
        }
    }
}

impl ErrorDetails {
    pub fn new() -> ErrorDetails {
        ErrorDetails { message: None }
    }

    pub fn new_with_message(message: &str) -> ErrorDetails {
        ErrorDetails {
            message: Some(message.to_string()),
        }
    }
}

impl SubscribeOptions {
    pub fn new() -> SubscribeOptions {
        SubscribeOptions {}
    }
}

impl PublishOptions {
    pub fn new(acknowledge: bool) -> PublishOptions {
        PublishOptions { acknowledge }
    }

    pub fn should_acknowledge(&self) -> bool {
        self.acknowledge
    }
}

impl RegisterOptions {
    pub fn new() -> RegisterOptions {
        RegisterOptions {}
    }
}

impl CallOptions {
    pub fn new() -> CallOptions {
        CallOptions {
            receive_progress: false,
            timeout: None,
            disclose_me: false,
        }
    }
}

impl YieldOptions {
    pub fn new() -> YieldOptions {
        YieldOptions { progress: false }
    }
}

impl CallCancelOptions {
    pub fn new(mode: Option<String>) -> CallCancelOptions {
        CallCancelOptions { mode }
    }
}

impl InterruptOptions {
    pub fn new(mode: Option<String>) -> InterruptOptions {
        InterruptOptions { mode }
    }
}

impl EventDetails {
    pub fn new() -> EventDetails {
        EventDetails {
            publisher: None,
            trustlevel: None,
            topic: None,
        }
    }

    pub fn new_with_topic(topic: URI) -> EventDetails {
        EventDetails {
            publisher: None,
            trustlevel: None,
            topic: Some(topic),
        }
    }
}

impl InvocationDetails {
    pub fn new() -> InvocationDetails {
        InvocationDetails {
            procedure: None,
            receive_progress: false,
            caller: None,
            caller_authid: None,
        }
    }
}

impl ResultDetails {
    pub fn new() -> ResultDetails {
        ResultDetails { progress: false }
    }
}
