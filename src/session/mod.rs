//! Session registry and inbound routing

mod manager;

pub use manager::SessionManager;
