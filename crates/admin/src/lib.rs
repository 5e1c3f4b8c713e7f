//! RBL Sourcing back-office library.
//!
//! This crate provides the back office as a library so the binary, the CLI
//! and the integration tests share one implementation.
//!
//! # Security
//!
//! The process holds record store admin credentials and can read and write
//! every collection. Staff sessions only gate the HTTP surface.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
