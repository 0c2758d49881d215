//! Wire-facing packet protocol, versioned so future revisions can be added
//! alongside without breaking existing clients.

pub mod v1;
