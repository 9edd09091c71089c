pub mod bootstrap;
pub mod controller;

pub use bootstrap::{resolve_config, Overrides};
pub use controller::AppController;
