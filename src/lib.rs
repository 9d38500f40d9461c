pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod types;

pub use config::Config;
pub use error::{RelayError, ValidationError};
pub use router::{RelayState, relay_router};
