pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::config::env::{EnvSource, ProcessEnv, Settings};
pub use crate::config::toml_config::FileConfig;
pub use crate::config::CliConfig;
pub use crate::core::dispatch::{Builtin, Dispatcher, Invocation};
pub use crate::core::engine::Entrypoint;
pub use crate::core::waiter::ReadinessWaiter;
pub use crate::utils::error::{EntrypointError, Result};
