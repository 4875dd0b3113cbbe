pub mod bench;
pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod log;
pub mod package;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod reconcile;
pub mod reply;
pub mod ux;
pub mod wire;
