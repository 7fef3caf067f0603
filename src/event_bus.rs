/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that dispatches published [events](crate::events) to registered handlers.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::events::Event;

pub type HandlerPtr = Box<dyn Fn(&Event) + Send>;

pub(crate) fn start_event_bus(
    handlers: Vec<HandlerPtr>,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Event bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => {
                for handler in &handlers {
                    handler(&event)
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => thread::yield_now(),
        }
    })
}
