//! Warehouse access: connection, introspection, snapshots and ledger tables

pub mod init;
pub mod introspect;
pub mod ledger_tables;
pub mod snapshot;

pub use init::*;
pub use introspect::*;
pub use ledger_tables::*;
pub use snapshot::*;
