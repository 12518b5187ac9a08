pub mod config;
pub mod error;
pub mod types;

pub use config::CarCareConfig;
pub use error::{CarCareError, Result};
pub use types::*;
