//! devkit: a development server for web projects plus a dependency
//! pre-bundler that turns installed CommonJS packages into browser-ready
//! ES modules.

pub mod cli;
pub mod core;
pub mod dev_server;
pub mod infrastructure;
pub mod plugins;
pub mod utils;
