// Single-slot listener registry, one slot per event kind.
//
// Registering a callback replaces whatever was in the slot. Swapping a
// callback never touches the connection.

use std::fmt;

use serde_json::Value;
use sherpa_common::protocol::ws::{EventKind, ServerEvent};
use sherpa_common::types::{ChatMessage, MessageDeleted, ReactionEvent, TypingPayload};

pub type Callback<T> = Box<dyn FnMut(T) + Send + 'static>;

#[derive(Default)]
pub struct Listeners {
    message: Option<Callback<ChatMessage>>,
    message_updated: Option<Callback<ChatMessage>>,
    message_deleted: Option<Callback<MessageDeleted>>,
    reaction: Option<Callback<ReactionEvent>>,
    typing: Option<Callback<TypingPayload>>,
    calendar_update: Option<Callback<Option<Value>>>,
    error: Option<Callback<String>>,
}

impl Listeners {
    pub fn set_message(&mut self, callback: Callback<ChatMessage>) {
        self.message = Some(callback);
    }

    pub fn set_message_updated(&mut self, callback: Callback<ChatMessage>) {
        self.message_updated = Some(callback);
    }

    pub fn set_message_deleted(&mut self, callback: Callback<MessageDeleted>) {
        self.message_deleted = Some(callback);
    }

    pub fn set_reaction(&mut self, callback: Callback<ReactionEvent>) {
        self.reaction = Some(callback);
    }

    pub fn set_typing(&mut self, callback: Callback<TypingPayload>) {
        self.typing = Some(callback);
    }

    pub fn set_calendar_update(&mut self, callback: Callback<Option<Value>>) {
        self.calendar_update = Some(callback);
    }

    pub fn set_error(&mut self, callback: Callback<String>) {
        self.error = Some(callback);
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Message => self.message.is_some(),
            EventKind::MessageUpdated => self.message_updated.is_some(),
            EventKind::MessageDeleted => self.message_deleted.is_some(),
            EventKind::Reaction => self.reaction.is_some(),
            EventKind::Typing => self.typing.is_some(),
            EventKind::CalendarUpdate => self.calendar_update.is_some(),
            EventKind::Error => self.error.is_some(),
        }
    }

    /// Hand the event to its slot. Returns false when the slot is empty.
    pub fn dispatch(&mut self, event: ServerEvent) -> bool {
        fn call<T>(slot: &mut Option<Callback<T>>, value: T) -> bool {
            match slot {
                Some(callback) => {
                    callback(value);
                    true
                }
                None => false,
            }
        }

        match event {
            ServerEvent::Message(message) => call(&mut self.message, message),
            ServerEvent::MessageUpdated(message) => call(&mut self.message_updated, message),
            ServerEvent::MessageDeleted(deleted) => call(&mut self.message_deleted, deleted),
            ServerEvent::Reaction(reaction) => call(&mut self.reaction, reaction),
            ServerEvent::Typing(typing) => call(&mut self.typing, typing),
            ServerEvent::CalendarUpdate(payload) => call(&mut self.calendar_update, payload),
            ServerEvent::Error(text) => call(&mut self.error, text),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = EventKind::ALL
            .into_iter()
            .filter(|kind| self.is_registered(*kind))
            .map(EventKind::as_str)
            .collect();
        f.debug_struct("Listeners").field("registered", &registered).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn typing(user_name: &str) -> ServerEvent {
        ServerEvent::Typing(TypingPayload { user_id: 1, user_name: user_name.into(), typing: true })
    }

    #[test]
    fn empty_slot_drops_event() {
        let mut listeners = Listeners::default();
        assert!(!listeners.dispatch(typing("a")));
    }

    #[test]
    fn registration_replaces_previous_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::default();

        let first = Arc::clone(&seen);
        listeners.set_typing(Box::new(move |p| first.lock().unwrap().push(format!("f1:{}", p.user_name))));
        let second = Arc::clone(&seen);
        listeners.set_typing(Box::new(move |p| second.lock().unwrap().push(format!("f2:{}", p.user_name))));

        assert!(listeners.dispatch(typing("aki")));
        assert_eq!(*seen.lock().unwrap(), vec!["f2:aki".to_string()]);
    }

    #[test]
    fn slots_are_independent_per_kind() {
        let mut listeners = Listeners::default();
        listeners.set_error(Box::new(|_| {}));
        assert!(listeners.is_registered(EventKind::Error));
        assert!(!listeners.is_registered(EventKind::Typing));
        assert!(!listeners.dispatch(typing("a")));
        assert!(listeners.dispatch(ServerEvent::Error("boom".into())));
    }

    #[test]
    fn clear_empties_every_slot() {
        let mut listeners = Listeners::default();
        listeners.set_calendar_update(Box::new(|_| {}));
        listeners.set_message(Box::new(|_| {}));
        listeners.clear();
        assert!(EventKind::ALL.into_iter().all(|kind| !listeners.is_registered(kind)));
        assert_eq!(format!("{listeners:?}"), "Listeners { registered: [] }");
    }
}
