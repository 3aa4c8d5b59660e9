//! Broker: topic subscriptions and event fan-out, exact-name only.

use std::sync::Arc;

use log::debug;

use crate::messages::{ErrorType, EventDetails, Message, PublishOptions, Reason, SubscribeOptions, URI};
use crate::{Dict, Error, ErrorKind, List, WampResult};

use crate::identifier::next_id;

use super::auth::{ACTION_PUBLISH, ACTION_SUBSCRIBE};
use super::messaging::send_message;
use super::ConnectionHandler;

impl ConnectionHandler {
    pub fn handle_subscribe(
        &mut self,
        request_id: u64,
        _options: SubscribeOptions,
        topic: URI,
    ) -> WampResult<()> {
        debug!(
            "Responding to subscribe message (id: {}, topic: {})",
            request_id, topic.uri
        );
        if !topic.is_valid() {
            return Err(Error::new(ErrorKind::ErrorReason(
                ErrorType::Subscribe,
                request_id,
                Reason::InvalidURI,
            )));
        }
        match self.realm {
            Some(ref realm) => {
                let mut realm = realm.lock().unwrap();
                if !realm
                    .roles
                    .authorize(ACTION_SUBSCRIBE, &self.info.lock().unwrap().principal())
                {
                    return Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Subscribe,
                        request_id,
                        Reason::NotAuthorized,
                    )));
                }
                let my_id = self.info.lock().unwrap().id;
                match realm
                    .registry
                    .subscribe(&topic.uri, my_id, Arc::clone(&self.info))
                {
                    Ok(topic_id) => {
                        self.subscribed_topics.push(topic_id);
                        send_message(&self.info, &Message::Subscribed(request_id, topic_id))
                    }
                    Err(_conflicting_id) => Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Subscribe,
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

    pub fn handle_unsubscribe(&mut self, request_id: u64, topic_id: u64) -> WampResult<()> {
        match self.realm {
            Some(ref realm) => {
                let mut realm = realm.lock().unwrap();
                let my_id = self.info.lock().unwrap().id;
                match realm.registry.unsubscribe(topic_id, my_id) {
                    Some(()) => {
                        self.subscribed_topics.retain(|id| *id != topic_id);
                        send_message(&self.info, &Message::Unsubscribed(request_id))
                    }
                    None => Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Unsubscribe,
                        request_id,
                        Reason::NoSuchSubscription,
                    ))),
                }
            }
            None => Err(Error::new(ErrorKind::InvalidState(
                "Received a message while not attached to a realm",
            ))),
        }
    }

    pub fn handle_publish(
        &mut self,
        request_id: u64,
        options: PublishOptions,
        topic: URI,
        args: Option<List>,
        kwargs: Option<Dict>,
    ) -> WampResult<()> {
        debug!(
            "Responding to publish message (id: {}, topic: {})",
            request_id, topic.uri
        );
        if !topic.is_valid() {
            return Err(Error::new(ErrorKind::ErrorReason(
                ErrorType::Publish,
                request_id,
                Reason::InvalidURI,
            )));
        }
        match self.realm {
            Some(ref realm) => {
                let realm = realm.lock().unwrap();
                if !realm
                    .roles
                    .authorize(ACTION_PUBLISH, &self.info.lock().unwrap().principal())
                {
                    return Err(Error::new(ErrorKind::ErrorReason(
                        ErrorType::Publish,
                        request_id,
                        Reason::NotAuthorized,
                    )));
                }
                let publication_id = next_id();
                let my_id = self.info.lock().unwrap().id;
                let topic_entry_id = realm.registry.topic_id_for_uri(&topic.uri);
                match topic_entry_id.and_then(|id| realm.registry.topic(id)) {
                    Some(topic_entry) => {
                        let event_message = Message::Event(
                            topic_entry_id.unwrap(),
                            publication_id,
                            EventDetails::new_with_topic(topic.clone()),
                            args,
                            kwargs,
                        );
                        for subscriber in topic_entry.subscribers.values() {
                            if subscriber.lock().unwrap().id != my_id {
                                send_message(subscriber, &event_message)?;
                            }
                        }
                        if options.should_acknowledge() {
                            send_message(&self.info, &Message::Published(request_id, publication_id))?;
                        }
                        Ok(())
                    }
                    // No subscriber has ever asked about this topic: a silent
                    // no-op, unless the publisher wants an acknowledgement,
                    // in which case there is nothing truthful to acknowledge.
                    None => {
                        if options.should_acknowledge() {
                            Err(Error::new(ErrorKind::ErrorReason(
                                ErrorType::Publish,
                                request_id,
                                Reason::NoSuchSubscription,
                            )))
                        } else {
                            Ok(())
                        }
                    }
                }
            }
            None => Err(Error::new(ErrorKind::InvalidState(
                "Received a message while not attached to a realm",
            ))),
        }
    }
}
