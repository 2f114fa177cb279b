pub mod common;
mod refresh_failures;
