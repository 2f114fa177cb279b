pub mod loader;
pub mod provider;
pub mod settings;
pub mod validator;
