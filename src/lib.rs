#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod formats;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod portal;
pub mod progress;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod wait;
pub mod webhook;
