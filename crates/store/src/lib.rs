//! `store` crate — persistence layer behind an injected interface.
//!
//! The engine never touches a concrete database handle; it receives a
//! [`Store`] trait object whose lifecycle is owned by process bootstrap.
//! Row types here carry no domain behaviour — flow/agent documents are
//! opaque `definition` JSON, and the domain types live in the `engine`
//! crate.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::Store;
