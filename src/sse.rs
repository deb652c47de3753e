//! Server-Sent Events decoding for the feature update stream.
//!
//! # Events
//!
//! - `features.updated` - map of flag key to full definition; each replaces the previous one
//! - `features.deleted` - array of flag keys to remove
//! - anything else (e.g. heartbeats) is ignored
use std::io;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{executor::block_on_stream, stream};

use crate::{flag::FlagSet, Error, Result};

/// A decoded update from the streaming channel.
#[derive(Debug)]
pub enum StreamEvent {
    /// Definitions to add or replace.
    Updated(FlagSet),
    /// Keys of flags to remove.
    Deleted(Vec<String>),
    /// Keep-alive or unrecognized event.
    Heartbeat,
}

impl StreamEvent {
    fn decode(event: &Event) -> Result<StreamEvent> {
        Ok(match event.event.as_str() {
            "features.updated" => StreamEvent::Updated(serde_json::from_str(&event.data)?),
            "features.deleted" => StreamEvent::Deleted(serde_json::from_str(&event.data)?),
            _ => StreamEvent::Heartbeat,
        })
    }
}

type Frame = std::result::Result<Event, EventStreamError<io::Error>>;

/// Iterator over [`StreamEvent`]s decoded from the chunks of an SSE body.
///
/// Ends when the chunks run out.
pub struct EventStream {
    frames: Box<dyn Iterator<Item = Frame> + Send>,
}

impl EventStream {
    /// Decode events from a blocking iterator of body chunks.
    pub fn new<I, B>(chunks: I) -> EventStream
    where
        I: Iterator<Item = io::Result<B>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        let frames = Box::pin(stream::iter(chunks).eventsource());
        EventStream {
            frames: Box::new(block_on_stream(frames)),
        }
    }
}

impl Iterator for EventStream {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(match self.frames.next()? {
            Ok(event) => StreamEvent::decode(&event),
            Err(EventStreamError::Transport(err)) => Err(Error::from(err)),
            Err(err) => Err(Error::from(io::Error::new(
                io::ErrorKind::InvalidData,
                err.to_string(),
            ))),
        })
    }
}
