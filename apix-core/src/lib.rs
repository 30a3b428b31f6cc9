pub mod config;
pub mod error;

pub use config::ApixConfig;
pub use error::ApixError;
