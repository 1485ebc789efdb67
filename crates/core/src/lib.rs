pub mod config;
pub mod event;
pub mod fingerprint;

pub use config::Config;
pub use event::*;
pub use fingerprint::fingerprint;
