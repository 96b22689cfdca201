//! Conductor implementation of the workflow engine port.

mod client;

pub use client::ConductorClient;
