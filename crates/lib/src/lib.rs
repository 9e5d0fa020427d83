//! OptiMonkey core library: backend connection, message classification, conversation log,
//! and REST client, shared by the CLI and desktop applications.

pub mod api;
pub mod classify;
pub mod compose;
pub mod config;
pub mod connection;
pub mod conversation;
pub mod dashboard;
pub mod message;
pub mod prompts;
pub mod settings;
