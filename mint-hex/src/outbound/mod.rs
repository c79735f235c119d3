//! Outbound adapters: the Lightning gateway and the RGB distributor.

pub mod lightning;
pub mod rgb;

pub use lightning::{LndGateway, MockGateway};
pub use rgb::{MockDistributor, RgbCliConfig, RgbCliDistributor};
