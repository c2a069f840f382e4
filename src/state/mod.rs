//! Client-side application state.

pub mod session;

pub use session::{Session, SessionStore};
