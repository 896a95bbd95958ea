//! Status bar core for the aerospace window manager: polls workspace, media,
//! power and network state from command line tools and keeps one bar surface
//! per display up to date.

pub mod alerts;
pub mod app;
pub mod clients;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod exec;
pub mod fanout;
pub mod ipc;
pub mod logging;
pub mod scheduler;
pub mod surface;
pub mod utils;
