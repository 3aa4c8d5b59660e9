//! # Message Routing in WAMP[](#message-routing-in-wamp "Permalink to this headline")
//!
//! - [Loosely coupled](#loosely-coupled)
//! - [Component based](#component-based)
//! - [Real-time](#real-time)
//! - [Language independent](#language-independent)
//! - [Network spanning](#network-spanning)
//!
//!
//! ---
//!
//! WAMP provides [Unified Application Routing](#unified-application-routing) in an open [WebSocket protocol](#websocket-protocol)
//! that works with [different](#different) languages.
//!
//! Using WAMP you can build distributed systems out of application components which are **loosely coupled**
//! and communicate in (soft) **real-time**.
//!
//! At its core, WAMP offers two communication patterns for application components to talk to each other:
//!
//! - [Publish & Subscribe](https://wamp-proto.org/faq.html#pubsub) (PubSub)
//! - [Remote Procedure Calls](https://wamp-proto.org/faq.html#rpc) (RPC)
//!
//! A *Broker* keeps a book of subscriptions: who is currently subscribed on which topic. When a *Publisher* publishes
//! some information ("event") to a topic, the *Broker* will look up who is currently subscribed on that topic:
//! determine the set of *Subscribers* on the topic published to. And then forward the information ("event") to all those *Subscribers*.
//!
//! Similar to a *Broker's* role with PubSub, the *Dealer* is responsible for routing a call originating
//! from the *Caller* to the *Callee* and route back results or errors vice-versa. Both do not know about each other:
//! where the peer resides and how to reach it. This knowledge is encapsulated in the *Dealer*.
//!
//! When you combine a *Broker* and a *Dealer* you get what WAMP calls a *Router*, which is what this module implements:
//! realm-scoped session tracking, an exact-name uri registry shared by broker and dealer, and a transport layer that
//! accepts both WebSocket and framed-TCP peers.

use std::{
    collections::{HashMap, HashSet},
    marker::Sync,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, trace};
use ws::{listen as ws_listen, CloseCode, Message as WSMessage, Sender};

use crate::identifier::next_id;
use crate::messages::{ErrorDetails, ErrorType, Message, Reason};
use crate::{Error, ErrorKind, WampResult};

use super::ID;

mod auth;
pub use self::auth::Roles;

mod handshake;

mod messaging;
use self::messaging::send_message;

mod pubsub;

mod registry;
use self::registry::{PseudoProcedure, UriRegistry};

mod rpc;
use self::rpc::PendingCall;

pub mod tcp;
use self::tcp::TcpSink;

struct Realm {
    name: String,
    registry: UriRegistry,
    roles: Roles,
    /// Keyed by invocation id: one entry per INVOCATION currently in flight
    /// with a remote provider.
    pending_calls: HashMap<ID, PendingCall>,
    /// Lets a CANCEL (which only knows the caller's own request id) find the
    /// invocation id it maps to.
    calls_by_request: HashMap<ID, ID>,
    /// Invocation ids whose caller disconnected before the provider yielded.
    /// A YIELD that later arrives for one of these gets an INTERRUPT
    /// (`killnowait`) instead of the generic "not pending" error, since the
    /// router, not the peer, is at fault for the dangling correlation.
    orphaned_calls: HashSet<ID>,
    connections: Vec<Arc<Mutex<ConnectionInfo>>>,
}

impl Realm {
    fn new(name: &str) -> Realm {
        let mut registry = UriRegistry::new();
        registry.register_pseudo("wamp.session.count", PseudoProcedure::SessionCount);
        registry.register_pseudo("wamp.session.list", PseudoProcedure::SessionList);
        Realm {
            name: name.to_string(),
            registry,
            roles: auth::default_roles(),
            pending_calls: HashMap::new(),
            calls_by_request: HashMap::new(),
            orphaned_calls: HashSet::new(),
            connections: Vec::new(),
        }
    }
}

/// Represents WAMP Router
pub struct Router {
    info: Arc<RouterInfo>,
}

struct RouterInfo {
    realms: Mutex<HashMap<String, Arc<Mutex<Realm>>>>,
}

struct ConnectionHandler {
    info: Arc<Mutex<ConnectionInfo>>,
    router: Arc<RouterInfo>,
    realm: Option<Arc<Mutex<Realm>>>,
    subscribed_topics: Vec<ID>,
    registered_procedures: Vec<ID>,
}

/// A peer's write half, abstracted over the two transports this router speaks.
pub enum PeerSink {
    WebSocket(Sender),
    Tcp(Arc<TcpSink>),
    #[cfg(test)]
    Null,
    /// Captures each outbound JSON text frame instead of dropping it, so
    /// `pubsub`/`rpc` unit tests can assert on what the router actually sent
    /// a given peer rather than only on realm/registry state.
    #[cfg(test)]
    Record(Arc<Mutex<Vec<String>>>),
}

impl PeerSink {
    fn send_text(&self, payload: &str) -> WampResult<()> {
        match *self {
            PeerSink::WebSocket(ref sender) => sender
                .send(WSMessage::Text(payload.to_string()))
                .map_err(|e| Error::new(ErrorKind::WSError(e))),
            PeerSink::Tcp(ref sink) => sink.send_text(payload).map_err(Error::from),
            #[cfg(test)]
            PeerSink::Null => Ok(()),
            #[cfg(test)]
            PeerSink::Record(ref sent) => {
                sent.lock().unwrap().push(payload.to_string());
                Ok(())
            }
        }
    }

    fn send_binary(&self, payload: Vec<u8>) -> WampResult<()> {
        match *self {
            PeerSink::WebSocket(ref sender) => sender
                .send(WSMessage::Binary(payload))
                .map_err(|e| Error::new(ErrorKind::WSError(e))),
            PeerSink::Tcp(ref sink) => sink.send_binary(&payload).map_err(Error::from),
            #[cfg(test)]
            PeerSink::Null => Ok(()),
            #[cfg(test)]
            PeerSink::Record(ref sent) => {
                sent.lock().unwrap().push(format!("<binary {} bytes>", payload.len()));
                Ok(())
            }
        }
    }

    fn close(&self) -> WampResult<()> {
        self.close_with_reason(CloseCode::Normal, "")
    }

    /// Closes the connection with `reason` carried as the close frame's text,
    /// where the transport supports one. The raw-TCP transport has no
    /// equivalent of a close reason, so it just shuts the socket down.
    fn close_with_reason(&self, code: CloseCode, reason: &str) -> WampResult<()> {
        match *self {
            PeerSink::WebSocket(ref sender) => sender
                .close_with_reason(code, reason.to_string())
                .map_err(|e| Error::new(ErrorKind::WSError(e))),
            PeerSink::Tcp(ref sink) => sink.shutdown().map_err(Error::from),
            #[cfg(test)]
            PeerSink::Null => Ok(()),
            #[cfg(test)]
            PeerSink::Record(_) => Ok(()),
        }
    }

    fn shutdown(&self) -> WampResult<()> {
        match *self {
            PeerSink::WebSocket(ref sender) => sender
                .shutdown()
                .map_err(|e| Error::new(ErrorKind::WSError(e))),
            PeerSink::Tcp(ref sink) => sink.shutdown().map_err(Error::from),
            #[cfg(test)]
            PeerSink::Null => Ok(()),
            #[cfg(test)]
            PeerSink::Record(_) => Ok(()),
        }
    }
}

/// Represents WAMP Router connection information
pub struct ConnectionInfo {
    state: ConnectionState,
    sender: PeerSink,
    protocol: String,
    id: u64,
    /// Self-claimed in HELLO; `None` until the handshake completes, and
    /// always `None` if the client never asserted one. See
    /// [`auth::Principal`](self::auth::Principal).
    auth_id: Option<String>,
    auth_role: Option<String>,
}

#[derive(Clone, PartialEq)]
enum ConnectionState {
    Initializing,
    Connected,
    ShuttingDown,
    Disconnected,
}

impl ConnectionInfo {
    /// The authorization principal this connection presents: its self-claimed
    /// `authid`/`authrole` from HELLO, if any, plus its session id.
    fn principal(&self) -> auth::Principal<'_> {
        auth::Principal {
            auth_id: self.auth_id.as_deref(),
            auth_role: self.auth_role.as_deref(),
            session_id: self.id,
        }
    }
}

#[cfg(test)]
impl ConnectionInfo {
    /// A `ConnectionInfo` that drops everything sent to it. Only exists so
    /// registry/broker/dealer unit tests can build connection tables without
    /// a real socket.
    pub(crate) fn for_test(id: u64) -> ConnectionInfo {
        ConnectionInfo {
            state: ConnectionState::Connected,
            sender: PeerSink::Null,
            protocol: WAMP_JSON.to_string(),
            id,
            auth_id: None,
            auth_role: None,
        }
    }
}

static WAMP_JSON: &str = "wamp.2.json";
static WAMP_MSGPACK: &str = "wamp.2.msgpack";

unsafe impl Sync for Router {}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create the new default router
    #[inline]
    pub fn new() -> Router {
        Router {
            info: Arc::new(RouterInfo {
                realms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start listening for WebSocket connections at `url`.
    pub fn listen(&self, url: &str) -> JoinHandle<()> {
        let router_info = Arc::clone(&self.info);
        let url = url.to_string();
        thread::spawn(move || {
            ws_listen(&url[..], |sender| ConnectionHandler {
                info: Arc::new(Mutex::new(ConnectionInfo {
                    state: ConnectionState::Initializing,
                    sender: PeerSink::WebSocket(sender),
                    protocol: String::new(),
                    id: next_id(),
                    auth_id: None,
                    auth_role: None,
                })),
                subscribed_topics: Vec::new(),
                registered_procedures: Vec::new(),
                realm: None,
                router: Arc::clone(&router_info),
            })
            .unwrap();
        })
    }

    /// Start listening for framed raw-TCP connections at `addr` (e.g. `"0.0.0.0:8181"`).
    /// One OS thread is spawned per accepted connection, matching the WebSocket listener.
    pub fn listen_tcp(&self, addr: &str) -> std::io::Result<JoinHandle<()>> {
        let listener = std::net::TcpListener::bind(addr)?;
        let router_info = Arc::clone(&self.info);
        Ok(thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        error!("TCP accept failed: {}", e);
                        continue;
                    }
                };
                let router_info = Arc::clone(&router_info);
                thread::spawn(move || {
                    let protocol = match tcp::handshake(&mut stream) {
                        Ok(protocol) => protocol,
                        Err(e) => {
                            error!("TCP handshake failed: {}", e);
                            return;
                        }
                    };
                    let read_stream = match stream.try_clone() {
                        Ok(s) => s,
                        Err(e) => {
                            error!("Could not clone TCP stream: {}", e);
                            return;
                        }
                    };
                    let sink = Arc::new(TcpSink::new(stream));
                    let mut handler = ConnectionHandler {
                        info: Arc::new(Mutex::new(ConnectionInfo {
                            state: ConnectionState::Initializing,
                            sender: PeerSink::Tcp(Arc::clone(&sink)),
                            protocol: protocol.to_string(),
                            id: next_id(),
                            auth_id: None,
                            auth_role: None,
                        })),
                        subscribed_topics: Vec::new(),
                        registered_procedures: Vec::new(),
                        realm: None,
                        router: router_info,
                    };
                    handler.run_tcp(read_stream, &sink);
                });
            }
        }))
    }

    /// Add realm to router
    pub fn add_realm(&mut self, realm: &str) {
        let mut realms = self.info.realms.lock().unwrap();
        if realms.contains_key(realm) {
            return;
        }
        realms.insert(realm.to_string(), Arc::new(Mutex::new(Realm::new(realm))));
        debug!("Added realm {}", realm);
    }

    /// Mutates the process-wide default role table new realms are seeded
    /// from. Call before `add_realm`/the first HELLO on a realm for the
    /// change to take effect there; realms that already exist keep whatever
    /// role table they were created with.
    pub fn configure_default_roles<F: FnOnce(&mut Roles)>(&self, f: F) {
        auth::configure_default(f);
    }

    /// Shut down the router gracefully
    pub fn shutdown(&self) {
        for realm in self.info.realms.lock().unwrap().values() {
            for connection in &realm.lock().unwrap().connections {
                send_message(
                    connection,
                    &Message::Goodbye(ErrorDetails::new(), Reason::SystemShutdown),
                )
                .ok();
                let mut connection = connection.lock().unwrap();
                connection.state = ConnectionState::ShuttingDown;
            }
        }
        info!("Goodbye messages sent.  Waiting 5 seconds for response");
        thread::sleep(Duration::from_secs(5));
        for realm in self.info.realms.lock().unwrap().values() {
            for connection in &realm.lock().unwrap().connections {
                let connection = connection.lock().unwrap();
                connection.sender.shutdown().ok();
            }
        }
    }
}

impl ConnectionHandler {
    fn run_tcp(&mut self, mut read_stream: std::net::TcpStream, sink: &TcpSink) {
        loop {
            let frame = match tcp::read_frame(&mut read_stream) {
                Ok(frame) => frame,
                Err(e) => {
                    trace!("TCP peer disconnected: {}", e);
                    break;
                }
            };
            match frame.kind {
                tcp::MessageType::Ping => {
                    if sink.send_pong(&frame.payload).is_err() {
                        break;
                    }
                    continue;
                }
                tcp::MessageType::Pong => continue,
                tcp::MessageType::Regular => {
                    let message = match self.parse_tcp_payload(&frame.payload) {
                        Ok(message) => message,
                        Err(e) => {
                            self.on_message_error(e).ok();
                            continue;
                        }
                    };
                    if let Err(e) = self.handle_message(message) {
                        self.on_message_error(e).ok();
                    }
                }
            }
        }
        self.terminate_connection().ok();
    }

    fn remove(&mut self) {
        let emptied_realm_name = self.remove_from_realm();
        if let Some(name) = emptied_realm_name {
            // Re-acquire the realm-map lock fresh, rather than while still
            // holding the per-realm lock: `set_realm` locks the realm map
            // before the realm it finds inside it, so doing the reverse here
            // while still holding the realm lock would invert that order.
            let mut realms = self.router.realms.lock().unwrap();
            let still_empty = realms
                .get(&name)
                .map(|realm| realm.lock().unwrap().connections.is_empty())
                .unwrap_or(false);
            if still_empty {
                realms.remove(&name);
                debug!("Realm {} has no sessions left, removing it", name);
            }
        }
    }

    /// Scrubs this session out of its realm's registry and pending-call
    /// tables. Returns the realm's name iff this was its last connection, so
    /// the caller can consider destroying the realm.
    fn remove_from_realm(&mut self) -> Option<String> {
        if let Some(ref realm) = self.realm {
            let mut realm = realm.lock().unwrap();
            let my_id = self.info.lock().unwrap().id;
            trace!("Removing subscriptions and registrations for client {}", my_id);
            for topic_id in &self.subscribed_topics {
                realm.registry.unsubscribe(*topic_id, my_id);
            }
            for registration_id in &self.registered_procedures {
                realm.registry.unregister(*registration_id);
            }

            // Any call this session was waiting on an answer for: the
            // provider may still yield, but nobody is listening any more.
            let orphaned_requests: Vec<ID> = realm
                .pending_calls
                .iter()
                .filter(|(_, call)| call.caller_id() == my_id)
                .map(|(invocation_id, _)| *invocation_id)
                .collect();
            for invocation_id in orphaned_requests {
                if let Some(pending) = realm.pending_calls.remove(&invocation_id) {
                    realm.calls_by_request.remove(&pending.call_id);
                }
                realm.orphaned_calls.insert(invocation_id);
            }

            // Any call this session was providing: the caller is still
            // waiting, but there will never be a YIELD now.
            let abandoned_invocations: Vec<ID> = realm
                .pending_calls
                .iter()
                .filter(|(_, call)| call.provider_id == my_id)
                .map(|(invocation_id, _)| *invocation_id)
                .collect();
            for invocation_id in abandoned_invocations {
                if let Some(pending) = realm.pending_calls.remove(&invocation_id) {
                    realm.calls_by_request.remove(&pending.call_id);
                    send_message(
                        &pending.caller,
                        &Message::Error(
                            ErrorType::Call,
                            pending.call_id,
                            HashMap::new(),
                            Reason::NoSuchProcedure,
                            None,
                            None,
                        ),
                    )
                    .ok();
                }
            }

            realm
                .connections
                .retain(|connection| connection.lock().unwrap().id != my_id);

            if realm.connections.is_empty() {
                return Some(realm.name.clone());
            }
        }
        None
    }

    fn terminate_connection(&mut self) -> WampResult<()> {
        self.remove();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn attach(router: &Router, name: &str, id: ID) -> ConnectionHandler {
        let realm_arc = Arc::clone(
            router
                .info
                .realms
                .lock()
                .unwrap()
                .get(name)
                .expect("realm must exist"),
        );
        let info = Arc::new(Mutex::new(ConnectionInfo::for_test(id)));
        realm_arc.lock().unwrap().connections.push(Arc::clone(&info));
        ConnectionHandler {
            info,
            router: Arc::clone(&router.info),
            realm: Some(realm_arc),
            subscribed_topics: Vec::new(),
            registered_procedures: Vec::new(),
        }
    }

    #[test]
    fn realm_is_destroyed_once_its_last_session_leaves() {
        let mut router = Router::new();
        router.add_realm("test.realm");

        let mut a = attach(&router, "test.realm", 1);
        let mut b = attach(&router, "test.realm", 2);

        a.remove();
        assert!(router.info.realms.lock().unwrap().contains_key("test.realm"));

        b.remove();
        assert!(!router.info.realms.lock().unwrap().contains_key("test.realm"));
    }

    #[test]
    fn adding_the_same_realm_twice_keeps_the_first() {
        let mut router = Router::new();
        router.add_realm("test.realm");
        let first = Arc::clone(router.info.realms.lock().unwrap().get("test.realm").unwrap());
        router.add_realm("test.realm");
        let second = Arc::clone(router.info.realms.lock().unwrap().get("test.realm").unwrap());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
