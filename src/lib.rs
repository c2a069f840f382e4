//! Passenger/admin session handling for the cruise booking client.
//!
//! SYSTEM CONTEXT
//! ==============
//! Views call [`state::SessionStore`] actions to log in and to re-check the
//! session, read its role predicates, and call the [`net::ApiClient`]
//! helpers directly for page data. The client owns the cross-cutting
//! request concerns (bearer token, diagnostics, 401 redirect).

pub mod config;
pub mod net;
pub mod state;
