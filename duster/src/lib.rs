pub mod config;
pub mod manifest;
pub mod runner;
pub mod sync;
