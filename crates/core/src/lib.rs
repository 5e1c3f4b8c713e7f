//! RBL Sourcing Core - Shared domain types.
//!
//! This crate provides the types shared by every RBL Sourcing component:
//! - `admin` - Back-office web service and reminder scheduler
//! - `cli` - Operator tooling (identifier preview, one-off reminder passes)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. Anything that needs "now" takes it as a parameter.
//!
//! # Modules
//!
//! - [`types`] - Business identifiers, inquiry numbers, statuses, emails,
//!   prices and timestamp parsing

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
