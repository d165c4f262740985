//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `watch`    | `Watch`          |
//! | `run`      | `Run`            |
//! | `hosts`    | `Hosts`          |
//! | `config`   | `Config`         |
//! | `simulate` | `Simulate`       |

pub mod config;
pub mod hosts;
pub mod run;
pub mod simulate;
pub mod watch;

pub use config::cmd_config;
pub use hosts::cmd_hosts;
pub use run::cmd_run;
pub use simulate::cmd_simulate;
pub use watch::cmd_watch;
