//! Transport adapters implementing [`crate::core::AccountTransport`]

pub mod memory;

pub use memory::InMemoryLedger;
