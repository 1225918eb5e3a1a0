pub mod converter;
pub mod docker;
pub mod engine;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod port;
pub mod waiter;

pub use converter::*;
pub use docker::*;
pub use engine::*;
pub use error::*;
pub use graph::*;
pub use orchestrator::*;
pub use port::*;
pub use waiter::*;
