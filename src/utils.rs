pub mod error;
pub mod formatting;
pub mod logging;
