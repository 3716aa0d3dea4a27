pub use self::parser::{Config, LogFormat, LoggingConfig, sample_config};
pub use self::validator::ConfigError;

mod parser;
mod validator;
