pub mod api;
pub mod channel;
pub mod config;
pub mod errors;
pub mod fleet;
pub mod logging;
pub mod session;
pub mod simulator;
pub mod ui;
