//! Token providers: the host-implemented trait and a ready-made HTTP provider.

pub mod http;
pub mod provider;

pub use http::HttpTokenProvider;
pub use provider::AuthTokenProvider;
