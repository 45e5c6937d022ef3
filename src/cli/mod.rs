mod app;
mod env;
mod runtime;

pub use app::run;

/// Exit status for unusable configuration or arguments.
pub const EXIT_USAGE: u8 = 64;
