pub mod annotate;
pub mod config;
pub mod errors;
pub mod extract;
pub mod run;
pub mod sections;
pub mod server;
pub mod stage;
pub mod store;
pub mod util;
