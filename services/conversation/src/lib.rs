//! Colloquy Conversation Service
//!
//! Wires a listener, the dialogue engine and a talker into one spoken
//! conversation. The `colloquy` binary is a thin wrapper around this library.

pub mod config;
pub mod prompts;
pub mod session;
