//! Dealer: exact-name procedure registration, call routing, progressive
//! results and cancellation.
//!
//! `wamp.session.count` and `wamp.session.list` are registered once per realm
//! (see [`Realm::new`](super::Realm::new)) and answered here without ever
//! allocating an invocation id: there is no remote callee to round-trip to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::messages::{
    CallCancelOptions, CallOptions, ErrorType, InterruptOptions, InvocationDetails, Message,
    Reason, RegisterOptions, ResultDetails, Value, YieldOptions, URI,
};
use crate::{Dict, Error, ErrorKind, List, WampResult, ID};

use crate::identifier::next_id;

use super::registry::{NameConflict, PseudoProcedure, Provider};
use super::auth::{ACTION_CALL, ACTION_REGISTER, ACTION_YIELD};
use super::messaging::send_message;
use super::{ConnectionHandler, ConnectionInfo};

/// One CALL routed to a remote provider, awaiting YIELD/ERROR correlation.
/// Keyed in `Realm::pending_calls` by the invocation id sent in the
/// INVOCATION, not by `call_id`; `calls_by_request` maps the other way so a
/// CANCEL (which only carries the caller's own request id) can find it.
pub struct PendingCall {
    pub call_id: ID,
    pub caller: Arc<Mutex<ConnectionInfo>>,
    pub provider_id: ID,
    /// A progressive YIELD (`options.progress == true`) only keeps this entry
    /// alive if the caller asked for progressive results in the first place.
    receive_progress: bool,
}

impl PendingCall {
    pub fn caller_id(&self) -> ID {
        self.caller.lock().unwrap().id
    }
}

fn answer_pseudo_procedure(
    kind: PseudoProcedure,
    connections: &[Arc<Mutex<ConnectionInfo>>],
) -> (Option<List>, Option<Dict>) {
    match kind {
        PseudoProcedure::SessionCount => (
            Some(vec![Value::UnsignedInteger(connections.len() as u64)]),
            None,
        ),
        PseudoProcedure::SessionList => {
            let ids = connections
                .iter()
                .map(|c| Value::UnsignedInteger(c.lock().unwrap().id))
                .collect();
            (Some(vec![Value::List(ids)]), None)
        }
    }
}

impl ConnectionHandler {
    pub fn handle_register(
        &mut self,
        request_id: ID,
        _options: RegisterOptions,
        procedure: URI,
    ) -> WampResult<()> {
        debug!(
            "Responding to register message (id: {}, procedure: {})",
            request_id, procedure.uri
        );
        if !procedure.is_valid() {
            return Err(Error::new(ErrorKind::ErrorReason(
                ErrorType::Register,
                request_id,
                Reason::InvalidURI,
            )));
        }
        match self.realm {
            Some(ref realm) => {
                let mut realm = realm.lock().unwrap();
                if !realm
                    .roles
                    .authorize(ACTION_REGISTER, &self.info.lock().unwrap().principal())
                {
                    return Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Register,
                        request_id,
                        Reason::NotAuthorized,
                    )));
                }
                match realm
                    .registry
                    .register(&procedure.uri, Arc::clone(&self.info))
                {
                    Ok(registration_id) => {
                        self.registered_procedures.push(registration_id);
                        send_message(&self.info, &Message::Registered(request_id, registration_id))
                    }
                    Err(NameConflict::ProcedureExists(_)) => Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Register,
                        request_id,
                        Reason::ProcedureAlreadyExists,
                    ))),
                    Err(NameConflict::TopicExists) => Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Register,
                        request_id,
                        Reason::NoSuchSubscription,
                    ))),
                    Err(NameConflict::ErrorUriReserved) => Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Register,
                        request_id,
                        Reason::ProcedureAlreadyExists,
                    ))),
                }
            }
            None => Err(Error::new(ErrorKind::InvalidState(
                "Received a message while not attached to a realm",
            ))),
        }
    }

    pub fn handle_unregister(&mut self, request_id: ID, registration_id: ID) -> WampResult<()> {
        match self.realm {
            Some(ref realm) => {
                let mut realm = realm.lock().unwrap();
                let my_id = self.info.lock().unwrap().id;
                let owns = realm
                    .registry
                    .procedure(registration_id)
                    .map(|p| p.provider_session_id() == Some(my_id))
                    .unwrap_or(false);
                if !owns {
                    return Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Unregister,
                        request_id,
                        Reason::NoSuchRegistration,
                    )));
                }
                realm.registry.unregister(registration_id);
                self.registered_procedures
                    .retain(|id| *id != registration_id);
                send_message(&self.info, &Message::Unregistered(request_id))
            }
            None => Err(Error::new(ErrorKind::InvalidState(
                "Received a message while not attached to a realm",
            ))),
        }
    }

    pub fn handle_call(
        &mut self,
        request_id: ID,
        options: CallOptions,
        procedure: URI,
        args: Option<List>,
        kwargs: Option<Dict>,
    ) -> WampResult<()> {
        debug!(
            "Responding to call message (id: {}, procedure: {})",
            request_id, procedure.uri
        );
        if !procedure.is_valid() {
            return Err(Error::new(ErrorKind::ErrorReason(
                ErrorType::Call,
                request_id,
                Reason::InvalidURI,
            )));
        }
        match self.realm {
            Some(ref realm) => {
                let mut realm = realm.lock().unwrap();
                if !realm
                    .roles
                    .authorize(ACTION_CALL, &self.info.lock().unwrap().principal())
                {
                    return Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Call,
                        request_id,
                        Reason::NotAuthorized,
                    )));
                }
                let registration_id = match realm.registry.procedure_id_for_uri(&procedure.uri) {
                    Some(id) => id,
                    None => {
                        return Err(Error::new(ErrorKind::ErrorReason(
                            ErrorType::Call,
                            request_id,
                            Reason::NoSuchProcedure,
                        )))
                    }
                };

                enum Routing {
                    Local(PseudoProcedure),
                    Remote(Arc<Mutex<ConnectionInfo>>),
                }
                let routing = match realm.registry.procedure(registration_id) {
                    Some(p) => match &p.provider {
                        Provider::Local(kind) => Routing::Local(*kind),
                        Provider::Remote(callee) => Routing::Remote(Arc::clone(callee)),
                    },
                    None => {
                        return Err(Error::new(ErrorKind::ErrorReason(
                            ErrorType::Call,
                            request_id,
                            Reason::NoSuchProcedure,
                        )))
                    }
                };

                match routing {
                    Routing::Local(kind) => {
                        let (args, kwargs) = answer_pseudo_procedure(kind, &realm.connections);
                        send_message(
                            &self.info,
                            &Message::Result(request_id, ResultDetails::new(), args, kwargs),
                        )
                    }
                    Routing::Remote(callee) => {
                        let invocation_id = next_id();
                        let mut details = InvocationDetails::new();
                        details.receive_progress = options.receive_progress;
                        if options.disclose_me {
                            let caller_info = self.info.lock().unwrap();
                            details.caller = Some(caller_info.id);
                            details.caller_authid = caller_info.principal().auth_id.map(str::to_string);
                        }
                        let provider_id = callee.lock().unwrap().id;
                        realm.pending_calls.insert(
                            invocation_id,
                            PendingCall {
                                call_id: request_id,
                                caller: Arc::clone(&self.info),
                                provider_id,
                                receive_progress: options.receive_progress,
                            },
                        );
                        realm.calls_by_request.insert(request_id, invocation_id);
                        send_message(
                            &callee,
                            &Message::Invocation(
                                invocation_id,
                                registration_id,
                                details,
                                args,
                                kwargs,
                            ),
                        )
                    }
                }
            }
            None => Err(Error::new(ErrorKind::InvalidState(
                "Received a message while not attached to a realm",
            ))),
        }
    }

    pub fn handle_cancel(&mut self, request_id: ID, options: CallCancelOptions) -> WampResult<()> {
        debug!("Responding to cancel message (id: {})", request_id);
        match self.realm {
            Some(ref realm) => {
                let mut realm = realm.lock().unwrap();
                let invocation_id = match realm.calls_by_request.remove(&request_id) {
                    Some(id) => id,
                    None => return Ok(()),
                };
                let pending = match realm.pending_calls.remove(&invocation_id) {
                    Some(p) => p,
                    None => return Ok(()),
                };
                // "skip" never reaches the callee: the dealer just forgets
                // about the call and answers the caller directly. Any other
                // mode (or none, which behaves like "killnowait") sends an
                // INTERRUPT and marks the invocation orphaned, so a YIELD
                // that still arrives later gets an INTERRUPT echoed back
                // instead of a stale RESULT.
                if options.mode.as_deref() != Some("skip") {
                    let provider = realm
                        .connections
                        .iter()
                        .find(|c| c.lock().unwrap().id == pending.provider_id)
                        .map(Arc::clone);
                    if let Some(provider) = provider {
                        send_message(
                            &provider,
                            &Message::Interrupt(
                                invocation_id,
                                InterruptOptions::new(options.mode.clone()),
                            ),
                        )
                        .ok();
                    }
                    realm.orphaned_calls.insert(invocation_id);
                }
                send_message(
                    &self.info,
                    &Message::Error(
                        ErrorType::Call,
                        request_id,
                        HashMap::new(),
                        Reason::Canceled,
                        None,
                        None,
                    ),
                )
            }
            None => Err(Error::new(ErrorKind::InvalidState(
                "Received a message while not attached to a realm",
            ))),
        }
    }

    pub fn handle_yield(
        &mut self,
        invocation_id: ID,
        options: YieldOptions,
        args: Option<List>,
        kwargs: Option<Dict>,
    ) -> WampResult<()> {
        debug!("Responding to yield message (id: {})", invocation_id);
        match self.realm {
            Some(ref realm) => {
                let mut realm = realm.lock().unwrap();
                if !realm
                    .roles
                    .authorize(ACTION_YIELD, &self.info.lock().unwrap().principal())
                {
                    return Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Yield,
                        invocation_id,
                        Reason::NotAuthorized,
                    )));
                }
                let pending_info = realm
                    .pending_calls
                    .get(&invocation_id)
                    .map(|p| (p.call_id, Arc::clone(&p.caller), p.receive_progress));
                match pending_info {
                    Some((call_id, caller, receive_progress)) => {
                        let mut details = ResultDetails::new();
                        details.progress = options.progress;
                        if !(options.progress && receive_progress) {
                            realm.pending_calls.remove(&invocation_id);
                            realm.calls_by_request.remove(&call_id);
                        }
                        send_message(&caller, &Message::Result(call_id, details, args, kwargs))
                    }
                    None if realm.orphaned_calls.remove(&invocation_id) => send_message(
                        &self.info,
                        &Message::Interrupt(
                            invocation_id,
                            InterruptOptions::new(Some("killnowait".to_string())),
                        ),
                    ),
                    None => Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Yield,
                        invocation_id,
                        Reason::NotPending,
                    ))),
                }
            }
            None => Err(Error::new(ErrorKind::InvalidState(
                "Received a message while not attached to a realm",
            ))),
        }
    }
}
