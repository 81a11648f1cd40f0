//! Session event bus.
//!
//! Views never reach into each other's state. The admin view publishes an
//! event when an account's block state changes; the session context decides
//! whether that account is the one signed in here and, if so, tears the
//! session down and publishes `SessionInvalidated`, which the router turns
//! into a hard redirect.
//!
//! Delivery is queued: a subscriber may publish while handling an event and
//! the follow-up is delivered after the current event has reached every
//! subscriber.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A user signed in on this client
    SignedIn { email: String },
    /// The user signed out on this client
    SignedOut,
    /// The server confirmed a block/unblock of an account
    AccountBlockToggled { email: String, blocked: bool },
    /// The local session was torn down without the user asking for it
    SessionInvalidated { email: Option<String> },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignedIn { .. } => "signed_in",
            Self::SignedOut => "signed_out",
            Self::AccountBlockToggled { .. } => "account_block_toggled",
            Self::SessionInvalidated { .. } => "session_invalidated",
        }
    }
}

pub trait Subscriber {
    fn on_event(&self, event: &SessionEvent, bus: &EventBus);
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<Vec<Rc<dyn Subscriber>>>,
    queue: RefCell<VecDeque<SessionEvent>>,
    dispatching: Cell<bool>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        self.subscribers.borrow_mut().push(subscriber);
    }

    /// Queue an event and deliver everything pending, unless a delivery is
    /// already running further up the stack
    pub fn publish(&self, event: SessionEvent) {
        self.queue.borrow_mut().push_back(event);
        if self.dispatching.get() {
            return;
        }

        self.dispatching.set(true);
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let subscribers = self.subscribers.borrow().clone();
            for subscriber in subscribers {
                subscriber.on_event(&event, self);
            }
        }
        self.dispatching.set(false);
    }
}
