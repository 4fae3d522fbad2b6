pub mod commands;
pub mod config;
pub mod http;
pub mod logging;
pub mod math;
pub mod runtime;
pub mod stats;
pub mod time;

pub use config::Config;
pub use http::{RequestDescriptor, RequestError, RequestExecutor, RetryPolicy};
pub use runtime::{RealRuntime, Runtime};
