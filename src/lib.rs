//! # eventhub
//!
//! Client for a college event hub backed by a hosted auth + database
//! service. Users sign in, browse events, and register; admins create
//! events and inspect registrants.
//!
//! The crate is organized the way the app is: a [`backend`] boundary, the
//! process-wide auth [`state`], a route [`routes::guard`], page controllers
//! in [`pages`], and the [`app::App`] root tying them together. Row types
//! live in the `records` crate.

pub mod app;
pub mod backend;
pub mod config;
pub mod pages;
pub mod routes;
pub mod state;

pub use records;
