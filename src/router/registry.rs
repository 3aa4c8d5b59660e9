//! The exact-name book of subscriptions and registrations a realm keeps.
//!
//! Matching is strict-uri-equality only: no prefix or wildcard patterns. A
//! topic or procedure uri maps to at most one live entry, indexed both by
//! name (for SUBSCRIBE/REGISTER/PUBLISH/CALL) and by id (for UNSUBSCRIBE,
//! UNREGISTER, and EVENT/INVOCATION routing). Topics and procedures share one
//! namespace: a uri already claimed by one cannot be claimed by the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::identifier::next_id;
use crate::ID;

use super::ConnectionInfo;

/// Who answers a CALL routed to a `Procedure`. `wamp.session.count` and
/// `wamp.session.list` are `Local`: the router answers them in-process
/// without ever constructing an INVOCATION.
pub enum Provider {
    Remote(Arc<Mutex<ConnectionInfo>>),
    Local(PseudoProcedure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoProcedure {
    SessionCount,
    SessionList,
}

pub struct Topic {
    pub id: ID,
    pub uri: String,
    pub subscribers: HashMap<ID, Arc<Mutex<ConnectionInfo>>>,
}

pub struct Procedure {
    pub id: ID,
    pub uri: String,
    pub provider: Provider,
}

impl Procedure {
    /// The session id of a remote provider, or `None` for a pseudo-procedure.
    pub fn provider_session_id(&self) -> Option<ID> {
        match self.provider {
            Provider::Remote(ref info) => Some(info.lock().unwrap().id),
            Provider::Local(_) => None,
        }
    }
}

/// The error URIs listed in the predefined-error-URIs interface: present in
/// every realm's registry from creation, and never assignable to a Topic or
/// Procedure.
pub const PREDEFINED_ERROR_URIS: &[&str] = &[
    "wamp.close.close_realm",
    "wamp.close.goodbye_and_out",
    "wamp.close.system_shutdown",
    "wamp.error.invalid_uri",
    "wamp.error.no_such_procedure",
    "wamp.error.procedure_already_exists",
    "wamp.error.no_such_registration",
    "wamp.error.no_such_subscription",
    "wamp.error.invalid_argument",
    "wamp.error.protocol_violation",
    "wamp.error.not_authorized",
    "wamp.error.authorization_failed",
    "wamp.error.no_such_realm",
    "wamp.error.no_such_role",
    "wamp.error.canceled",
    "wamp.error.option_not_allowed",
    "wamp.error.no_eligible_callee",
    "wamp.error.option_disallowed.disclose_me",
    "wamp.error.network_failure",
    "wamp.error.not_pending",
    "wamp.error.unsupported",
    "wamp.error.general_error",
];

pub struct UriRegistry {
    topics_by_uri: HashMap<String, ID>,
    topics_by_id: HashMap<ID, Topic>,
    procedures_by_uri: HashMap<String, ID>,
    procedures_by_id: HashMap<ID, Procedure>,
    /// Stateless entries for `PREDEFINED_ERROR_URIS`, indexed both ways so the
    /// `by_name`/`by_registration_id` back-reference invariant holds for them
    /// too, even though nothing ever looks an error up by its registration id.
    errors_by_uri: HashMap<String, ID>,
    errors_by_id: HashMap<ID, String>,
}

/// Why a `register`/`subscribe` call against an occupied uri failed.
pub enum NameConflict {
    /// The uri is already a procedure with this registration id.
    ProcedureExists(ID),
    /// The uri is already a topic; creating a procedure there is invalid.
    TopicExists,
    /// The uri is one of the predefined error URIs and can never be claimed.
    ErrorUriReserved,
}

impl Default for UriRegistry {
    fn default() -> UriRegistry {
        let mut errors_by_uri = HashMap::new();
        let mut errors_by_id = HashMap::new();
        for uri in PREDEFINED_ERROR_URIS {
            let id = next_id();
            errors_by_uri.insert((*uri).to_string(), id);
            errors_by_id.insert(id, (*uri).to_string());
        }
        UriRegistry {
            topics_by_uri: HashMap::new(),
            topics_by_id: HashMap::new(),
            procedures_by_uri: HashMap::new(),
            procedures_by_id: HashMap::new(),
            errors_by_uri,
            errors_by_id,
        }
    }
}

impl UriRegistry {
    pub fn new() -> UriRegistry {
        UriRegistry::default()
    }

    /// Whether `uri` is one of the predefined error URIs, reserved from
    /// creation in every realm and never assignable to a Topic or Procedure.
    pub fn is_reserved(&self, uri: &str) -> bool {
        self.errors_by_uri.contains_key(uri)
    }

    /// The predefined error uri a registration id identifies, if any.
    pub fn error_uri(&self, registration_id: ID) -> Option<&str> {
        self.errors_by_id.get(&registration_id).map(String::as_str)
    }

    /// Subscribes `subscriber` to `uri`, creating the topic if needed. Returns
    /// the (possibly pre-existing) subscription id, or `Err` if `uri` is
    /// already a registered procedure or a reserved error uri.
    pub fn subscribe(
        &mut self,
        uri: &str,
        subscriber_id: ID,
        subscriber: Arc<Mutex<ConnectionInfo>>,
    ) -> Result<ID, ID> {
        if let Some(&existing) = self.errors_by_uri.get(uri) {
            return Err(existing);
        }
        if let Some(&existing) = self.procedures_by_uri.get(uri) {
            return Err(existing);
        }
        let topics_by_id = &mut self.topics_by_id;
        let topic_id = *self
            .topics_by_uri
            .entry(uri.to_string())
            .or_insert_with(next_id);
        let topic = topics_by_id.entry(topic_id).or_insert_with(|| Topic {
            id: topic_id,
            uri: uri.to_string(),
            subscribers: HashMap::new(),
        });
        topic.subscribers.insert(subscriber_id, subscriber);
        Ok(topic_id)
    }

    /// Removes `subscriber_id` from the topic. Returns `None` if the
    /// subscription id is unknown. The topic itself is dropped once it has
    /// no more subscribers.
    pub fn unsubscribe(&mut self, topic_id: ID, subscriber_id: ID) -> Option<()> {
        let (uri, is_empty) = {
            let topic = self.topics_by_id.get_mut(&topic_id)?;
            topic.subscribers.remove(&subscriber_id);
            (topic.uri.clone(), topic.subscribers.is_empty())
        };
        if is_empty {
            self.topics_by_id.remove(&topic_id);
            self.topics_by_uri.remove(&uri);
        }
        Some(())
    }

    pub fn topic(&self, topic_id: ID) -> Option<&Topic> {
        self.topics_by_id.get(&topic_id)
    }

    pub fn topic_id_for_uri(&self, uri: &str) -> Option<ID> {
        self.topics_by_uri.get(uri).copied()
    }

    /// Registers a remote `callee` for `uri`. Errs with `NameConflict` if the
    /// uri is already taken, either by another procedure (the basic profile
    /// allows only a single registrant) or by a topic.
    pub fn register(
        &mut self,
        uri: &str,
        callee: Arc<Mutex<ConnectionInfo>>,
    ) -> Result<ID, NameConflict> {
        self.register_provider(uri, Provider::Remote(callee))
    }

    /// Registers a pseudo-procedure answered in-process by the router.
    pub fn register_pseudo(&mut self, uri: &str, kind: PseudoProcedure) -> ID {
        self.register_provider(uri, Provider::Local(kind))
            .unwrap_or_else(|_| panic!("pseudo-procedure {} collides with a prior registration", uri))
    }

    fn register_provider(&mut self, uri: &str, provider: Provider) -> Result<ID, NameConflict> {
        if self.errors_by_uri.contains_key(uri) {
            return Err(NameConflict::ErrorUriReserved);
        }
        if let Some(&existing) = self.procedures_by_uri.get(uri) {
            return Err(NameConflict::ProcedureExists(existing));
        }
        if self.topics_by_uri.contains_key(uri) {
            return Err(NameConflict::TopicExists);
        }
        let registration_id = next_id();
        self.procedures_by_uri
            .insert(uri.to_string(), registration_id);
        self.procedures_by_id.insert(
            registration_id,
            Procedure {
                id: registration_id,
                uri: uri.to_string(),
                provider,
            },
        );
        Ok(registration_id)
    }

    pub fn unregister(&mut self, registration_id: ID) -> Option<Procedure> {
        let procedure = self.procedures_by_id.remove(&registration_id)?;
        self.procedures_by_uri.remove(&procedure.uri);
        Some(procedure)
    }

    pub fn procedure(&self, registration_id: ID) -> Option<&Procedure> {
        self.procedures_by_id.get(&registration_id)
    }

    pub fn procedure_id_for_uri(&self, uri: &str) -> Option<ID> {
        self.procedures_by_uri.get(uri).copied()
    }

    /// All procedures currently provided by `session_id`, used to resolve
    /// outstanding calls when their provider disconnects.
    pub fn procedures_provided_by(&self, session_id: ID) -> Vec<ID> {
        self.procedures_by_id
            .values()
            .filter(|p| p.provider_session_id() == Some(session_id))
            .map(|p| p.id)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dummy_connection(id: ID) -> Arc<Mutex<ConnectionInfo>> {
        // Connections are only ever looked up by id in these tests; no real
        // socket is needed so we never touch `sender`.
        Arc::new(Mutex::new(ConnectionInfo::for_test(id)))
    }

    #[test]
    fn subscribe_then_unsubscribe_drops_empty_topic() {
        let mut registry = UriRegistry::new();
        let conn = dummy_connection(1);
        let topic_id = registry.subscribe("com.example.topic", 1, conn).unwrap();
        assert!(registry.topic(topic_id).is_some());
        registry.unsubscribe(topic_id, 1);
        assert!(registry.topic(topic_id).is_none());
        assert_eq!(registry.topic_id_for_uri("com.example.topic"), None);
    }

    #[test]
    fn register_rejects_duplicate_uri() {
        let mut registry = UriRegistry::new();
        let a = dummy_connection(1);
        let b = dummy_connection(2);
        let first = registry.register("com.example.proc", a).unwrap();
        match registry.register("com.example.proc", b) {
            Err(NameConflict::ProcedureExists(id)) => assert_eq!(first, id),
            _ => panic!("expected ProcedureExists"),
        }
    }

    #[test]
    fn register_rejects_uri_already_a_topic() {
        let mut registry = UriRegistry::new();
        let sub = dummy_connection(1);
        registry.subscribe("com.example.thing", 1, sub).unwrap();
        let callee = dummy_connection(2);
        match registry.register("com.example.thing", callee) {
            Err(NameConflict::TopicExists) => {}
            _ => panic!("expected TopicExists"),
        }
    }

    #[test]
    fn subscribe_rejects_uri_already_a_procedure() {
        let mut registry = UriRegistry::new();
        let callee = dummy_connection(1);
        registry.register("com.example.thing", callee).unwrap();
        let sub = dummy_connection(2);
        assert!(registry.subscribe("com.example.thing", 2, sub).is_err());
    }

    #[test]
    fn procedures_provided_by_finds_only_that_sessions_procedures() {
        let mut registry = UriRegistry::new();
        let a = dummy_connection(1);
        let b = dummy_connection(2);
        registry.register("com.example.a", a).unwrap();
        registry.register("com.example.b", b).unwrap();
        assert_eq!(registry.procedures_provided_by(1).len(), 1);
        assert_eq!(registry.procedures_provided_by(2).len(), 1);
        assert_eq!(registry.procedures_provided_by(3).len(), 0);
    }

    #[test]
    fn pseudo_procedures_have_no_provider_session() {
        let mut registry = UriRegistry::new();
        let id = registry.register_pseudo("wamp.session.count", PseudoProcedure::SessionCount);
        assert_eq!(registry.procedure(id).unwrap().provider_session_id(), None);
    }

    #[test]
    fn predefined_error_uris_are_present_from_creation() {
        let registry = UriRegistry::new();
        for uri in PREDEFINED_ERROR_URIS {
            assert!(registry.is_reserved(uri), "{} should be reserved", uri);
        }
        assert!(!registry.is_reserved("com.example.not_an_error"));
    }

    #[test]
    fn register_rejects_a_reserved_error_uri() {
        let mut registry = UriRegistry::new();
        let callee = dummy_connection(1);
        match registry.register("wamp.error.no_such_procedure", callee) {
            Err(NameConflict::ErrorUriReserved) => {}
            _ => panic!("expected ErrorUriReserved"),
        }
    }

    #[test]
    fn subscribe_rejects_a_reserved_error_uri() {
        let mut registry = UriRegistry::new();
        let sub = dummy_connection(1);
        assert!(registry
            .subscribe("wamp.error.no_such_procedure", 1, sub)
            .is_err());
    }

    #[test]
    fn error_registration_ids_resolve_back_to_their_uri() {
        let registry = UriRegistry::new();
        let id = registry.procedure_id_for_uri("wamp.error.unsupported");
        assert!(id.is_none(), "errors are not procedures");
        for uri in PREDEFINED_ERROR_URIS {
            let id = registry
                .errors_by_uri
                .get(*uri)
                .copied()
                .expect("reserved uri must have an id");
            assert_eq!(registry.error_uri(id), Some(*uri));
        }
    }
}
