//! Core types: calendar events, the event index, reminder messages, logging

pub mod event;
pub mod message;
pub mod tracing;

pub use event::{
    CalendarEvent, ChannelCalendarPairing, ChannelEvents, EventGroup, EventIndex, ReminderBatch,
};
pub use message::{AUTHORIZED_TEXT, INITIALIZING_TEXT, ReminderMessage, authorization_prompt};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
