//! Parrot core library — bot dispatcher, channel endpoints, and config
//! used by the `parrot` CLI and by anyone embedding a bot in their own
//! binary.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
