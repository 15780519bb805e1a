pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{EnvOverrides, load_config};
pub use models::*;
pub use validation::{ServerConfigValidator, ValidationError, ValidationResult};
