pub mod loader;
pub mod schema;

pub use crate::indexer::path_grammar::{PathFormat, PathToken};
pub use loader::{load_config, load_config_from_str, validate_config};
pub use schema::{Config, SmtpConfig};
