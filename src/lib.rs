pub mod app_config;
pub mod hue;
pub mod measurement;
pub mod normalize;
pub mod poll;
pub mod store;
