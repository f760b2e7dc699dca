// src/reliability/mod.rs
//! The reliability engine: sequence assignment, in-flight tracking, ack
//! consumption, retransmission scheduling, and terminal-outcome reporting.

mod engine;

pub use engine::{
    AckResendEngine, InFlightDgram, QueuedFrame, TerminalCallback, TerminalOutcome,
};
