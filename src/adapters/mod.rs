// Adapters layer: the real network, clock, process and signal implementations
// behind the domain ports.

pub mod process;
pub mod signals;
pub mod tcp;

pub use process::TeeRunner;
pub use tcp::{TcpProbe, TokioSleeper};
