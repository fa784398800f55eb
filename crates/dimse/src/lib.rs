//! DIMSE (DICOM Message Service Element) implementation
//!
//! This crate provides the protocol side of a DICOM Service Class Provider
//! for the normalized (N-) services.
//!
//! # Features
//! - Association negotiation with a bounded number of concurrent associations
//! - Command dispatch: built-in C-ECHO, inert C-CANCEL, N-services routed to a
//!   [`ServiceProvider`]
//! - DIMSE audit log flushed at association teardown
//! - In-memory channel for running sessions without a network

pub mod association;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod log;
pub mod message;
pub mod scp;
pub mod service;
pub mod types;
pub mod ul;

// Re-export commonly used types
pub use association::{Association, AssociationLimiter, Negotiation, Negotiator, RefusalReason};
pub use channel::{DimseChannel, MemoryChannel, MemoryPeer, PeerEvent, Received};
pub use config::DimseConfig;
pub use dispatcher::{Dispatcher, SessionEnd};
pub use error::{DimseError, Result};
pub use log::{DimseLog, FileLogSink, LogSink, NullLogSink};
pub use message::{DimseRequest, DimseResponse};
pub use scp::DimseScp;
pub use service::{ProviderFactory, ServiceOutcome, ServiceProvider};
pub use types::{BlockingMode, DimseCommand, DimseStatus};

/// Default DICOM port
pub const DEFAULT_DIMSE_PORT: u16 = 11112;
