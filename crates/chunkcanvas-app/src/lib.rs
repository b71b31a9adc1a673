//! ChunkCanvas Application
//!
//! The map client shell: a platform-independent [`MapSession`] tying the
//! cache, patch engine, tools and renderer together, and the browser entry
//! point driving it.

mod session;

pub use session::{MapSession, SessionError};

#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use web::run_wasm;
