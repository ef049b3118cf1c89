pub mod dispatch;
pub mod engine;
pub mod waiter;

pub use crate::domain::model::{Plan, Service, ServiceEndpoint, Step};
pub use crate::domain::ports::{ProcessRunner, Probe, Sleeper};
pub use crate::utils::error::Result;
