//! Types shared between the chat client crates: id newtypes and the HTTP and
//! real-time wire payloads.

pub mod domain;
pub mod error;
pub mod protocol;
