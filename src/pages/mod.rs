//! Page controllers.
//!
//! Each page owns its transient state and talks to the backend directly;
//! rendering is plain text so the binary can print it.

pub mod auth;
pub mod dashboard;
