/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events emitted by the [chain engine](crate::chain) and passes them to
//! event handlers.
//!
//! When the thread receives a message containing an [event](crate::events::Event), it triggers
//! the execution of all handlers defined for the contained event type, where the handlers for
//! each event type are stored in [`EventHandlers`].
//!
//! The engine publishes events fire-and-forget; running handlers on this separate thread keeps
//! them out of the engine's writer critical section.

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread,
    thread::JoinHandle,
};

use crate::{events::*, logging::Logger};

/// Pointer to a handler closure, parametrised by the argument (for our use case, event) type.
pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Stores the two optional handlers enabled for an event type that implements the [`Logger`]
/// trait, namely one logging handler, defined in [`logging`](crate::logging), and one
/// user-defined handler.
pub(crate) struct HandlerPair<T: Logger> {
    pub(crate) user_defined_handler: Option<HandlerPtr<T>>,
    pub(crate) logging_handler: Option<HandlerPtr<T>>,
}

impl<T: Logger> HandlerPair<T> {
    // Checks if no event handlers are defined for this event.
    pub(crate) fn is_empty(&self) -> bool {
        self.user_defined_handler.is_none() && self.logging_handler.is_none()
    }

    /// Creates a new `HandlerPair` with the user-defined handler, and the default logging
    /// handler if logging is enabled.
    pub(crate) fn new(log: bool, user_defined_handler: Option<HandlerPtr<T>>) -> HandlerPair<T> {
        HandlerPair {
            user_defined_handler,
            logging_handler: if log { Some(T::get_logger()) } else { None },
        }
    }

    fn fire(&self, event: &T) {
        self.user_defined_handler
            .iter()
            .for_each(|handler| handler(event));
        self.logging_handler
            .iter()
            .for_each(|handler| handler(event));
    }
}

/// Stores the `HandlerPair` of user-defined and optional logging handlers for each pre-defined
/// event type from [events](crate::events).
pub struct EventHandlers {
    pub(crate) apply_block_handlers: HandlerPair<ApplyBlockEvent>,
    pub(crate) pending_transaction_handlers: HandlerPair<PendingTransactionEvent>,
    pub(crate) pop_block_handlers: HandlerPair<PopBlockEvent>,
    pub(crate) switch_fork_handlers: HandlerPair<SwitchForkEvent>,
    pub(crate) changed_objects_handlers: HandlerPair<ChangedObjectsEvent>,
}

impl EventHandlers {
    /// Creates the [handler pairs](HandlerPair) for all pre-defined event types from
    /// [events](crate::events) given the user-defined handlers, and information on whether
    /// logging is enabled.
    pub fn new(
        log: bool,
        apply_block_handler: Option<HandlerPtr<ApplyBlockEvent>>,
        pending_transaction_handler: Option<HandlerPtr<PendingTransactionEvent>>,
        pop_block_handler: Option<HandlerPtr<PopBlockEvent>>,
        switch_fork_handler: Option<HandlerPtr<SwitchForkEvent>>,
        changed_objects_handler: Option<HandlerPtr<ChangedObjectsEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            apply_block_handlers: HandlerPair::new(log, apply_block_handler),
            pending_transaction_handlers: HandlerPair::new(log, pending_transaction_handler),
            pop_block_handlers: HandlerPair::new(log, pop_block_handler),
            switch_fork_handlers: HandlerPair::new(log, switch_fork_handler),
            changed_objects_handlers: HandlerPair::new(log, changed_objects_handler),
        }
    }

    /// Checks if no handlers are defined, i.e., neither user-defined handlers were defined nor
    /// logging is enabled. When this holds the event bus thread need not be started.
    pub fn is_empty(&self) -> bool {
        self.apply_block_handlers.is_empty()
            && self.pending_transaction_handlers.is_empty()
            && self.pop_block_handlers.is_empty()
            && self.switch_fork_handlers.is_empty()
            && self.changed_objects_handlers.is_empty()
    }

    /// Triggers the execution of each of the two handlers - the user-defined and the logging
    /// handler, if defined - for a given event type from [events](crate::events).
    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::ApplyBlock(apply_block_event) => {
                self.apply_block_handlers.fire(&apply_block_event)
            }
            Event::PendingTransaction(pending_transaction_event) => self
                .pending_transaction_handlers
                .fire(&pending_transaction_event),
            Event::PopBlock(pop_block_event) => self.pop_block_handlers.fire(&pop_block_event),
            Event::SwitchFork(switch_fork_event) => {
                self.switch_fork_handlers.fire(&switch_fork_event)
            }
            Event::ChangedObjects(changed_objects_event) => self
                .changed_objects_handlers
                .fire(&changed_objects_event),
        }
    }
}

/// Starts the event bus thread, which runs an infinite loop until a shutdown signal is received
/// from the parent thread. In each iteration of the loop, the thread checks if it received any
/// event notifications, and if so, then triggers the execution of the handlers defined for the
/// event.
pub fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => return,
        }
    })
}
