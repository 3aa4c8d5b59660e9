//! Per-realm, role-based authorization.
//!
//! Every realm carries a `Roles` table checked before a session's PUBLISH,
//! SUBSCRIBE, CALL, REGISTER or YIELD is allowed to reach the broker/dealer.
//! There is one `ActionRole` per WAMP action (not per session): its
//! blacklist/whitelist hold *principal* identities — a session's self-claimed
//! `authid`/`authrole` from HELLO, or its bare session id when neither was
//! claimed. The check order for a given principal is blacklist, then
//! whitelist, then the action's default.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::ID;

pub const ACTION_PUBLISH: &str = "publish";
pub const ACTION_SUBSCRIBE: &str = "subscribe";
pub const ACTION_CALL: &str = "call";
pub const ACTION_REGISTER: &str = "register";
pub const ACTION_YIELD: &str = "yield";

/// The identity a session presents to the authorizer: whatever it claimed in
/// HELLO (`authid`/`authrole`, unverified — this router has no challenge-
/// response authentication) plus its router-assigned session id, which is
/// always available as a fallback principal key.
pub struct Principal<'a> {
    pub auth_id: Option<&'a str>,
    pub auth_role: Option<&'a str>,
    pub session_id: ID,
}

impl<'a> Principal<'a> {
    /// Every identity string this principal could be matched against in a
    /// blacklist/whitelist, in preference order.
    fn keys(&self) -> [Option<String>; 3] {
        [
            self.auth_id.map(str::to_string),
            self.auth_role.map(str::to_string),
            Some(self.session_id.to_string()),
        ]
    }
}

#[derive(Clone)]
struct ActionRole {
    blacklist: HashSet<String>,
    whitelist: HashSet<String>,
    default_allow: bool,
}

impl ActionRole {
    fn new() -> ActionRole {
        ActionRole {
            blacklist: HashSet::new(),
            whitelist: HashSet::new(),
            default_allow: true,
        }
    }

    fn authorize(&self, principal: &Principal) -> bool {
        let keys: Vec<String> = principal.keys().into_iter().flatten().collect();
        if keys.iter().any(|k| self.blacklist.contains(k)) {
            return false;
        }
        if keys.iter().any(|k| self.whitelist.contains(k)) {
            return true;
        }
        self.default_allow
    }
}

#[derive(Clone)]
pub struct Roles {
    actions: HashMap<&'static str, ActionRole>,
}

impl Roles {
    #[inline]
    pub fn new() -> Roles {
        Roles {
            actions: HashMap::new(),
        }
    }

    fn entry(&mut self, action: &'static str) -> &mut ActionRole {
        self.actions.entry(action).or_insert_with(ActionRole::new)
    }

    /// Denies `action` to `principal` (an `authid`, `authrole`, or stringified
    /// session id), overriding any whitelist entry for the same principal.
    pub fn blacklist(&mut self, action: &'static str, principal: &str) {
        let entry = self.entry(action);
        entry.whitelist.remove(principal);
        entry.blacklist.insert(principal.to_string());
    }

    /// Grants `action` to `principal`, overriding any blacklist entry for the
    /// same principal.
    pub fn whitelist(&mut self, action: &'static str, principal: &str) {
        let entry = self.entry(action);
        entry.blacklist.remove(principal);
        entry.whitelist.insert(principal.to_string());
    }

    pub fn set_default_allow(&mut self, action: &'static str, allow: bool) {
        self.entry(action).default_allow = allow;
    }

    /// Grants `action` to `principal` iff one of `principal`'s identity
    /// strings is blacklisted (deny), whitelisted (allow), or else the
    /// action's default applies. An action with no blacklist/whitelist/
    /// default configured at all defaults to allow, matching a realm with no
    /// authorization policy configured.
    pub fn authorize(&self, action: &str, principal: &Principal) -> bool {
        match self.actions.get(action) {
            Some(entry) => entry.authorize(principal),
            None => true,
        }
    }
}

impl Default for Roles {
    fn default() -> Roles {
        Roles::new()
    }
}

lazy_static! {
    /// The process-wide authorization policy every new `Realm` starts from.
    static ref DEFAULT_ROLES: Mutex<Roles> = Mutex::new(Roles::new());
}

/// A copy of the process-wide default role table, for `Realm::new` to seed
/// a freshly created realm with. Each realm keeps its own independent copy
/// after that, so later changes to the default via `configure_default` only
/// affect realms created afterward.
pub fn default_roles() -> Roles {
    DEFAULT_ROLES.lock().unwrap().clone()
}

/// Mutates the process-wide default role table in place, e.g. at startup
/// before any realm has been created.
pub fn configure_default<F: FnOnce(&mut Roles)>(f: F) {
    f(&mut DEFAULT_ROLES.lock().unwrap());
}
