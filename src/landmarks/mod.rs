//! Landmark providers.
//!
//! Hand and pose estimation is delegated to pretrained models outside this crate. Providers
//! adapt them to [`LandmarkProvider`]; the [`ProviderRegistry`] picks one per capability.

mod provider;
mod providers;
mod registry;

pub use provider::{LandmarkCapability, LandmarkProvider};
pub use providers::replay::parse_records;
pub use providers::{ReplayProvider, ScriptedProvider};
pub use registry::ProviderRegistry;
