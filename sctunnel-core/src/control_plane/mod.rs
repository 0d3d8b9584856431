//! Sauce Labs control plane access

pub mod mock;
pub mod rest;
pub mod traits;

pub use mock::MockControlPlane;
pub use rest::{SauceRestClient, account_url};
pub use traits::{ControlPlane, TunnelResource};
