use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::is_not;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct ClientRoles {
    pub publisher: PublisherRole,
    pub subscriber: SubscriberRole,
    pub caller: CallerRole,
    pub callee: CalleeRole,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct RouterRoles {
    pub dealer: DealerRole,
    pub broker: BrokerRole,
}

/**************************
          Roles
**************************/
#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct PublisherRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<HashMap<String, bool>>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct CallerRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<CallerFeatures>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct CalleeRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<CalleeFeatures>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct SubscriberRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<HashMap<String, bool>>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct DealerRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<DealerFeatures>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct BrokerRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<HashMap<String, bool>>,
}

/// Advanced-profile features this crate supports for callers: progressive
/// call results and cooperative cancellation of a pending call.
#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct CallerFeatures {
    #[serde(skip_serializing_if = "is_not", default)]
    progressive_call_results: bool,

    #[serde(skip_serializing_if = "is_not", default)]
    call_canceling: bool,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct CalleeFeatures {
    #[serde(skip_serializing_if = "is_not", default)]
    progressive_call_results: bool,

    #[serde(skip_serializing_if = "is_not", default)]
    call_canceling: bool,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct DealerFeatures {
    #[serde(skip_serializing_if = "is_not", default)]
    progressive_call_results: bool,

    #[serde(skip_serializing_if = "is_not", default)]
    call_canceling: bool,
}

/**************************
      Implementations
**************************/

impl RouterRoles {
    #[inline]
    pub fn new() -> RouterRoles {
        RouterRoles {
            broker: BrokerRole { features: None },
            dealer: DealerRole {
                features: Some(DealerFeatures {
                    progressive_call_results: true,
                    call_canceling: true,
                }),
            },
        }
    }

    #[inline]
    pub fn new_basic() -> RouterRoles {
        RouterRoles {
            broker: BrokerRole { features: None },
            dealer: DealerRole { features: None },
        }
    }
}

impl ClientRoles {
    #[inline]
    pub fn new() -> ClientRoles {
        ClientRoles {
            publisher: PublisherRole {
                features: Some(HashMap::new()),
            },
            subscriber: SubscriberRole {
                features: Some(HashMap::new()),
            },
            caller: CallerRole {
                features: Some(CallerFeatures {
                    progressive_call_results: true,
                    call_canceling: true,
                }),
            },
            callee: CalleeRole {
                features: Some(CalleeFeatures {
                    progressive_call_results: true,
                    call_canceling: true,
                }),
            },
        }
    }

    #[inline]
    pub fn new_basic() -> ClientRoles {
        ClientRoles {
            publisher: PublisherRole {
                features: Some(HashMap::new()),
            },
            subscriber: SubscriberRole {
                features: Some(HashMap::new()),
            },
            caller: CallerRole { features: None },
            callee: CalleeRole { features: None },
        }
    }
}

impl Default for RouterRoles {
    fn default() -> RouterRoles {
        RouterRoles::new()
    }
}

impl Default for ClientRoles {
    fn default() -> ClientRoles {
        ClientRoles::new()
    }
}
