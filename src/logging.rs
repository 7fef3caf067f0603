/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The default event handler, which logs out events.
//!
//! The replica logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event; hashes are printed as the first
//! seven characters of their Base64 encoding. For example, the following snippet is how a
//! [CommitBlock](crate::events::CommitBlockEvent) is printed:
//!
//! ```text
//! CommitBlock, 1701329264, 42, fNGCJyk
//! ```

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::Event;

// Names of each event in PascalCase for printing:
pub const PRODUCE_BLOCK: &str = "ProduceBlock";
pub const COMMIT_BLOCK: &str = "CommitBlock";
pub const PERSIST_HEADERS: &str = "PersistHeaders";
pub const REWIND: &str = "Rewind";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const VOTE: &str = "Vote";

pub const START_FETCH: &str = "StartFetch";
pub const DELIVER_BLOCK: &str = "DeliverBlock";

/// The default logging handler, installed on the event bus when
/// [`Configuration::log_events`](crate::config::Configuration::log_events) is set.
pub(crate) fn log_event(event: &Event) {
    match event {
        Event::ProduceBlock(e) => log::info!(
            "{}, {}, {}, {}",
            PRODUCE_BLOCK,
            secs_since_unix_epoch(e.timestamp),
            e.number,
            first_seven_base64_chars(&e.hash.bytes())
        ),
        Event::CommitBlock(e) => log::info!(
            "{}, {}, {}, {}",
            COMMIT_BLOCK,
            secs_since_unix_epoch(e.timestamp),
            e.number,
            first_seven_base64_chars(&e.hash.bytes())
        ),
        Event::PersistHeaders(e) => log::info!(
            "{}, {}, {}",
            PERSIST_HEADERS,
            secs_since_unix_epoch(e.timestamp),
            e.round
        ),
        Event::Rewind(e) => log::info!(
            "{}, {}, {}",
            REWIND,
            secs_since_unix_epoch(e.timestamp),
            e.committed_round
        ),
        Event::ReceiveProposal(e) => log::info!(
            "{}, {}, {}, {}, {}",
            RECEIVE_PROPOSAL,
            secs_since_unix_epoch(e.timestamp),
            e.origin,
            e.number,
            first_seven_base64_chars(&e.hash.bytes())
        ),
        Event::Vote(e) => log::info!(
            "{}, {}, {}, {}",
            VOTE,
            secs_since_unix_epoch(e.timestamp),
            e.number,
            first_seven_base64_chars(&e.hash.bytes())
        ),
        Event::StartFetch(e) => log::info!(
            "{}, {}, {}, {}",
            START_FETCH,
            secs_since_unix_epoch(e.timestamp),
            first_seven_base64_chars(&e.hash.bytes()),
            e.target
        ),
        Event::DeliverBlock(e) => log::info!(
            "{}, {}, {}, {}",
            DELIVER_BLOCK,
            secs_since_unix_epoch(e.timestamp),
            first_seven_base64_chars(&e.hash.bytes()),
            e.released_events
        ),
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first
// 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
