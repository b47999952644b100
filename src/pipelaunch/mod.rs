pub mod aspects;
pub mod cli;
pub mod config;
pub mod containermanager;
pub mod dirs;
pub mod docker;
pub mod error;
pub mod logging;
