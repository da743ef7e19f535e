//! Pylon Core
//!
//! Core types shared by the pool client and the worker node.
//!
//! This crate contains:
//! - Jobs as offered by the pool
//! - Capability pairs and the allow-list that gates them
//! - Announcement payloads (node identity and event templates)

pub mod domain;
