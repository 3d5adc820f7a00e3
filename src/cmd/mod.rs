//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                 |
//! |------------|----------------------------------|
//! | `serve`    | `Serve`                          |
//! | `work`     | `Work`, `Stages`                 |
//! | `extract`  | `Extract`                        |
//! | `config`   | `Config`                         |

pub mod config;
pub mod extract;
pub mod serve;
pub mod work;

pub use config::cmd_config;
pub use extract::cmd_extract;
pub use serve::cmd_serve;
pub use work::{cmd_stages, cmd_work};
