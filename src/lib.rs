pub mod api;
pub mod cli;
pub mod cluster;
pub mod error;
pub mod global;
pub mod limiters;
pub mod settings;
