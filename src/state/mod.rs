//! Shared client-side state.
//!
//! DESIGN
//! ======
//! Only authentication is process-wide. Page state lives on the page
//! controllers in `crate::pages` and is rebuilt from the backend on mount.

pub mod auth;
