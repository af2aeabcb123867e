//! Image reference handling: list encoding, storage-key derivation, remote
//! deletion, and the lifecycle rules tying them to product mutations.

pub mod codec;
pub mod extract;
pub mod gateway;
pub mod lifecycle;
