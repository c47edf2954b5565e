//! Intercom message bus agent: a line-oriented wire protocol, hosted modules
//! with typed commands and events, persistent option fields, and a
//! cooperative scheduler driving them.

pub mod bot;
pub mod config;
pub mod logging;
pub mod modules;
pub mod opts;
pub mod transport;
pub mod wire;
