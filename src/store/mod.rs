//! Durable persistence over the rusqlite connection owned by
//! [`crate::db::Db`]. Organized one submodule per concern, following a
//! per-concern `routes/`-style layout.
//!
//! Every public function here takes a `&Connection` so callers hold the
//! single `Mutex<Connection>` guard for exactly as long as one logical
//! operation, never across a StateStore or file-IO call.

pub mod audit;
pub mod files;
pub mod messages;
pub mod pins;
pub mod polls;
pub mod reactions;
pub mod rooms;
pub mod scan_jobs;
pub mod sso;
pub mod users;
