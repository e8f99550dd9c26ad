//! Domain-driven configuration for loadcheck
//!
//! Configuration is split by functional domain (target, HTTP, run, logging,
//! users). Every domain has serde defaults, a validation pass, and
//! `LOADCHECK_*` environment overrides applied by [`ConfigLoader`].

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    http::HttpConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    run::RunConfig,
    target::TargetConfig,
    users::UsersConfig,
    LoadcheckConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
