use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use ws::{CloseCode, Error as WSError, ErrorKind as WSErrorKind, Request, Response, Result as WSResult};

use crate::messages::{
    ErrorDetails, HelloDetails, Message, Reason, RouterRoles, WelcomeDetails, URI,
};
use crate::router::messaging::send_message;
use crate::{Error, ErrorKind, WampResult};

use super::{ConnectionHandler, ConnectionState, WAMP_JSON, WAMP_MSGPACK};

impl ConnectionHandler {
    pub fn handle_hello(&mut self, realm: URI, details: HelloDetails) -> WampResult<()> {
        debug!("Responding to hello message (realm: {:?})", realm);
        let id = {
            let mut info = self.info.lock().unwrap();
            info.state = ConnectionState::Connected;
            info.auth_id = details.auth_id;
            info.auth_role = details.auth_role;
            info.id
        };

        self.set_realm(realm.uri)?;
        send_message(
            &self.info,
            &Message::Welcome(id, WelcomeDetails::new(RouterRoles::new())),
        )
    }

    pub fn handle_goodbye(&mut self, details: ErrorDetails, reason: Reason) -> WampResult<()> {
        let state = self.info.lock().unwrap().state.clone();
        let close_reason = details.message.clone().unwrap_or_default();
        match state {
            ConnectionState::Initializing => Err(Error::new(ErrorKind::InvalidState(
                "Received a goodbye message before handshake complete",
            ))),
            ConnectionState::Connected => {
                info!("Received goodbye message with reason: {:?}", reason);
                self.remove();
                send_message(
                    &self.info,
                    &Message::Goodbye(ErrorDetails::new(), Reason::GoodbyeAndOut),
                )
                .ok();
                let mut info = self.info.lock().unwrap();
                info.state = ConnectionState::Disconnected;
                info.sender.close_with_reason(CloseCode::Normal, &close_reason)
            }
            ConnectionState::ShuttingDown => {
                info!(
                    "Received goodbye message in response to our goodbye message with reason: {:?}",
                    reason
                );
                let mut info = self.info.lock().unwrap();
                info.state = ConnectionState::Disconnected;
                info.sender.close_with_reason(CloseCode::Normal, &close_reason)
            }
            ConnectionState::Disconnected => {
                warn!("Received goodbye message after closing connection");
                Ok(())
            }
        }
    }

    /// A client-sent ABORT ends the session with no reply: it is the peer
    /// telling the router it is giving up, not asking for acknowledgement.
    pub fn handle_abort(&mut self, reason: Reason) -> WampResult<()> {
        info!("Received abort from client with reason: {:?}", reason);
        self.remove();
        let mut info = self.info.lock().unwrap();
        info.state = ConnectionState::Disconnected;
        info.sender.close()
    }

    /// Realms are created lazily: the first HELLO naming a realm brings it
    /// into existence, rather than requiring it to be pre-registered via
    /// [`Router::add_realm`](super::Router::add_realm).
    fn set_realm(&mut self, realm: String) -> WampResult<()> {
        debug!("Setting realm to {}", realm);
        let realm_arc = Arc::clone(
            self.router
                .realms
                .lock()
                .unwrap()
                .entry(realm.clone())
                .or_insert_with(|| Arc::new(Mutex::new(super::Realm::new(&realm)))),
        );
        realm_arc
            .lock()
            .unwrap()
            .connections
            .push(Arc::clone(&self.info));
        self.realm = Some(realm_arc);
        Ok(())
    }

    /// Picks a serializer among the sub-protocols the client offered,
    /// preferring MessagePack over JSON regardless of the order the client
    /// listed them in.
    pub fn process_protocol(&mut self, request: &Request, response: &mut Response) -> WSResult<()> {
        debug!("Checking protocol");
        let protocols = request.protocols()?;
        let chosen = if protocols.iter().any(|p| *p == WAMP_MSGPACK) {
            Some(WAMP_MSGPACK)
        } else if protocols.iter().any(|p| *p == WAMP_JSON) {
            Some(WAMP_JSON)
        } else {
            None
        };
        match chosen {
            Some(protocol) => {
                response.set_protocol(protocol);
                let mut info = self.info.lock().unwrap();
                info.protocol = protocol.to_string();
                Ok(())
            }
            None => Err(WSError::new(
                WSErrorKind::Protocol,
                format!(
                    "Neither {} nor {} were selected as Websocket sub-protocols",
                    WAMP_JSON, WAMP_MSGPACK
                ),
            )),
        }
    }
}
