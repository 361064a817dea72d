//! Interoperability gateway HTTP surface.
//!
//! Wires the protocol libraries (X12 EDI, C-CDA, FHIR federation, Direct
//! messaging, cross-network queries) behind one axum router and a shared
//! transaction ledger.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
