mod client;
mod sensor_kind;
mod transport;

pub use client::*;
pub use sensor_kind::*;
pub use transport::*;
