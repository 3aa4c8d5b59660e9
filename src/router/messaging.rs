use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use log::{debug, error, info, trace, warn};
use rmp_serde::Deserializer as RMPDeserializer;
use rmp_serde::Serializer;
use serde::{Deserialize, Serialize};
use serde_json;
use ws::{
    CloseCode, Error as WSError, ErrorKind as WSErrorKind, Handler, Message as WSMessage, Request,
    Response, Result as WSResult,
};

use crate::messages::{ErrorDetails, ErrorType, Message, Reason};
use crate::utils::StructMapWriter;
use crate::{Dict, Error, ErrorKind, List, Value, WampResult, ID};

use super::{ConnectionHandler, ConnectionInfo, ConnectionState, PeerSink, WAMP_JSON};

pub fn send_message(info: &Arc<Mutex<ConnectionInfo>>, message: &Message) -> WampResult<()> {
    let info = info.lock().unwrap();

    debug!("Sending message {:?} via {}", message, info.protocol);
    if info.protocol == WAMP_JSON {
        send_message_json(&info.sender, message)
    } else {
        send_message_msgpack(&info.sender, message)
    }
}

fn send_message_json(sender: &PeerSink, message: &Message) -> WampResult<()> {
    sender.send_text(&serde_json::to_string(message).unwrap())
}

fn send_message_msgpack(sender: &PeerSink, message: &Message) -> WampResult<()> {
    let mut buf: Vec<u8> = Vec::new();
    message
        .serialize(&mut Serializer::with(&mut buf, StructMapWriter))
        .unwrap();
    sender.send_binary(buf)
}

impl ConnectionHandler {
    pub(super) fn handle_message(&mut self, message: Message) -> WampResult<()> {
        debug!("Received message {:?}", message);
        match message {
            Message::Hello(realm, details) => self.handle_hello(realm, details),
            Message::Subscribe(request_id, options, topic) => {
                self.handle_subscribe(request_id, options, topic)
            }
            Message::Publish(request_id, options, topic, args, kwargs) => {
                self.handle_publish(request_id, options, topic, args, kwargs)
            }
            Message::Unsubscribe(request_id, topic_id) => {
                self.handle_unsubscribe(request_id, topic_id)
            }
            Message::Goodbye(details, reason) => self.handle_goodbye(details, reason),
            Message::Register(request_id, options, procedure) => {
                self.handle_register(request_id, options, procedure)
            }
            Message::Unregister(request_id, procedure_id) => {
                self.handle_unregister(request_id, procedure_id)
            }
            Message::Call(request_id, options, procedure, args, kwargs) => {
                self.handle_call(request_id, options, procedure, args, kwargs)
            }
            Message::Cancel(request_id, options) => self.handle_cancel(request_id, options),
            Message::Yield(invocation_id, options, args, kwargs) => {
                self.handle_yield(invocation_id, options, args, kwargs)
            }
            Message::Error(e_type, request_id, details, reason, args, kwargs) => {
                self.handle_error(e_type, request_id, details, reason, args, kwargs)
            }
            Message::Abort(_details, reason) => self.handle_abort(reason),
            Message::Unsupported(code, rest) => self.handle_unsupported(code, rest),
            t => Err(Error::new(ErrorKind::InvalidMessageType(t))),
        }
    }

    fn handle_error(
        &mut self,
        e_type: ErrorType,
        request_id: ID,
        details: Dict,
        reason: Reason,
        args: Option<List>,
        kwargs: Option<Dict>,
    ) -> WampResult<()> {
        if e_type == ErrorType::Invocation {
            debug!(
                "Responding to error message for invocation (id: {})",
                request_id
            );
            match self.realm {
                Some(ref realm) => {
                    let mut realm = realm.lock().unwrap();
                    if let Some(pending) = realm.pending_calls.remove(&request_id) {
                        realm.calls_by_request.remove(&pending.call_id);
                        let error_message = Message::Error(
                            ErrorType::Call,
                            pending.call_id,
                            details,
                            reason,
                            args,
                            kwargs,
                        );
                        send_message(&pending.caller, &error_message)
                    } else if realm.orphaned_calls.remove(&request_id) {
                        // The caller already disconnected; nobody to tell.
                        Ok(())
                    } else {
                        Err(Error::new(ErrorKind::InvalidState(
                            "Received an error message for a call that wasn't sent",
                        )))
                    }
                }
                None => Err(Error::new(ErrorKind::InvalidState(
                    "Received a message while not attached to a realm",
                ))),
            }
        } else {
            Err(Error::new(ErrorKind::InvalidState(
                "Got an error message that was not for a call message",
            )))
        }
    }

    /// A request-kind code the router doesn't recognize still gets an
    /// answer: `wamp.error.unsupported` tagged with the code itself, with a
    /// best-effort request id recovered from the leading element if it looks
    /// like one, rather than dropping the peer's connection.
    fn handle_unsupported(&mut self, code: u64, rest: Vec<Value>) -> WampResult<()> {
        warn!("Received message with unsupported kind code {}", code);
        let request_id = match rest.first() {
            Some(Value::UnsignedInteger(id)) => *id,
            Some(Value::Integer(id)) if *id >= 0 => *id as u64,
            _ => 0,
        };
        send_message(
            &self.info,
            &Message::Error(
                ErrorType::Other(code),
                request_id,
                HashMap::new(),
                Reason::Unsupported,
                None,
                None,
            ),
        )
    }

    fn parse_message(&self, msg: WSMessage) -> WampResult<Message> {
        match msg {
            WSMessage::Text(payload) => match serde_json::from_str(&payload) {
                Ok(message) => Ok(message),
                Err(e) => Err(Error::new(ErrorKind::JSONError(e))),
            },
            WSMessage::Binary(payload) => {
                let mut de = RMPDeserializer::new(Cursor::new(payload));
                match Deserialize::deserialize(&mut de) {
                    Ok(message) => Ok(message),
                    Err(e) => Err(Error::new(ErrorKind::MsgPackError(e))),
                }
            }
        }
    }

    /// Decodes one framed-TCP payload, picking JSON or MessagePack by the
    /// protocol negotiated at handshake time (raw TCP frames carry no
    /// text/binary distinction of their own, unlike WebSocket).
    pub(super) fn parse_tcp_payload(&self, payload: &[u8]) -> WampResult<Message> {
        let protocol = self.info.lock().unwrap().protocol.clone();
        if protocol == WAMP_JSON {
            match serde_json::from_slice(payload) {
                Ok(message) => Ok(message),
                Err(e) => Err(Error::new(ErrorKind::JSONError(e))),
            }
        } else {
            let mut de = RMPDeserializer::new(Cursor::new(payload));
            match Deserialize::deserialize(&mut de) {
                Ok(message) => Ok(message),
                Err(e) => Err(Error::new(ErrorKind::MsgPackError(e))),
            }
        }
    }

    fn send_error(&self, err_type: ErrorType, request_id: ID, reason: Reason) -> WampResult<()> {
        send_message(
            &self.info,
            &Message::Error(err_type, request_id, HashMap::new(), reason, None, None),
        )
    }

    fn send_abort(&self, reason: Reason) -> WampResult<()> {
        send_message(&self.info, &Message::Abort(ErrorDetails::new(), reason))
    }

    pub(super) fn on_message_error(&mut self, error: Error) -> WampResult<()> {
        match error.get_kind() {
            ErrorKind::WSError(e) => Err(Error::new(ErrorKind::WSError(e))),
            ErrorKind::IoError(e) => {
                error!("I/O error: {}", e);
                self.terminate_connection()
            }
            ErrorKind::HandshakeError(r) => {
                error!("Handshake error: {}", r);
                self.send_abort(r)?;
                self.terminate_connection()
            }
            ErrorKind::TcpHandshakeError(e) => {
                error!("TCP handshake error: {:?}", e);
                self.terminate_connection()
            }
            ErrorKind::UnexpectedMessage(msg) => {
                error!("Unexpected Message: {}", msg);
                self.terminate_connection()
            }
            ErrorKind::ConnectionLost => self.terminate_connection(),
            ErrorKind::JSONError(e) => {
                error!("Could not parse JSON: {}", e);
                self.terminate_connection()
            }
            ErrorKind::MsgPackError(e) => {
                error!("Could not parse MsgPack: {}", e);
                self.terminate_connection()
            }
            ErrorKind::MalformedData => self.terminate_connection(),
            ErrorKind::InvalidMessageType(msg) => {
                error!("Router unable to handle message {:?}", msg);
                self.terminate_connection()
            }
            ErrorKind::InvalidState(s) => {
                error!("Invalid State: {}", s);
                self.terminate_connection()
            }
            ErrorKind::Timeout => {
                error!("Connection timeout");
                self.terminate_connection()
            }
            ErrorKind::ErrorReason(err_type, id, reason) => self.send_error(err_type, id, reason),
        }
    }
}

impl Handler for ConnectionHandler {
    fn on_request(&mut self, request: &Request) -> WSResult<Response> {
        info!("New request");
        let mut response = match Response::from_request(request) {
            Ok(response) => response,
            Err(e) => {
                error!("Could not create response: {}", e);
                return Err(e);
            }
        };
        self.process_protocol(request, &mut response)?;
        debug!("Sending response");
        Ok(response)
    }

    fn on_message(&mut self, msg: WSMessage) -> WSResult<()> {
        debug!("Receveied message: {:?}", msg);
        let message = match self.parse_message(msg) {
            Err(e) => return self.on_message_error(e).map_err(to_ws_error),
            Ok(m) => m,
        };
        match self.handle_message(message) {
            Err(e) => self.on_message_error(e).map_err(to_ws_error),
            _ => Ok(()),
        }
    }

    fn on_close(&mut self, _code: CloseCode, _reason: &str) {
        let state = self.info.lock().unwrap().state.clone();
        if state != ConnectionState::Disconnected {
            trace!("Client disconnected.  Closing connection");
            self.terminate_connection().ok();
        }
    }
}

fn to_ws_error(e: Error) -> WSError {
    match e.get_kind() {
        ErrorKind::WSError(e) => e,
        kind => WSError::new(WSErrorKind::Internal, kind.description()),
    }
}
