pub mod client;

pub use client::{IrcClientErr, irc_runner};
