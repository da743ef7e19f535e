//! Core domain types
//!
//! These types are independent of the wire format: the client crate
//! converts protocol messages into them, and the node only ever sees these.

pub mod announcement;
pub mod capability;
pub mod job;
