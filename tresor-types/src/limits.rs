//! Fixed numeric limits. All of these are baked into the wire encoding as
//! `u8` count prefixes — raising any of them is a wire-breaking change, not
//! a config knob.

/// Max members (owners or registry members) in a single userset.
pub const MAX_MEMBERS: u8 = u8::MAX;
/// Max usersets a single user may own.
pub const MAX_USERSETS: u8 = u8::MAX;
/// Max usersets named in a single `GetMembers`-style lookup.
pub const MAX_LOOKUP: u8 = u8::MAX;
/// Max operations pending decryption-part collection at once, per userset.
pub const MAX_PENDING: u8 = u8::MAX;
/// Max finished operations queued between a client's `Update` drains.
pub const MAX_RESULTS: u8 = u8::MAX;
