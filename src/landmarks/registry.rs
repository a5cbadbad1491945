use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::keypoint::{Hand, Pose};

use super::provider::{LandmarkCapability, LandmarkProvider};

type SharedProvider = Arc<Mutex<dyn LandmarkProvider>>;

/// Registry of landmark providers.
///
/// Providers are wrapped in `Mutex` because the estimators take `&mut self`.
pub struct ProviderRegistry {
    providers: HashMap<String, SharedProvider>,
    default_name: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a provider. The first registered provider becomes the default.
    pub fn register<P: LandmarkProvider + 'static>(&mut self, provider: P) {
        let name = provider.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.providers.insert(name, Arc::new(Mutex::new(provider)));
    }

    /// Set default provider by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.providers.contains_key(name) {
            return Err(anyhow!("landmark provider '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedProvider> {
        self.providers.get(name).cloned()
    }

    pub fn default_provider(&self) -> Option<SharedProvider> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a provider that supports the requested capability.
    ///
    /// Prefers the default provider; otherwise the first match in name order.
    pub fn provider_for(&self, capability: LandmarkCapability) -> Result<Option<SharedProvider>> {
        if let Some(default_provider) = self.default_provider() {
            if supports(&default_provider, capability)? {
                return Ok(Some(default_provider));
            }
        }
        for name in self.list() {
            let Some(provider) = self.get(&name) else {
                continue;
            };
            if supports(&provider, capability)? {
                return Ok(Some(provider));
            }
        }
        Ok(None)
    }

    /// Run hand and pose estimation on `frame`.
    ///
    /// A missing hand provider is an error; a missing pose provider yields no poses.
    pub fn estimate(&self, frame: &Frame, max_hands: usize) -> Result<(Vec<Hand>, Vec<Pose>)> {
        let hand_provider = self.provider_for(LandmarkCapability::Hands)?.ok_or_else(|| {
            anyhow!(
                "no registered landmark provider supports capability {:?}",
                LandmarkCapability::Hands
            )
        })?;
        let hands = {
            let mut guard = hand_provider
                .lock()
                .map_err(|_| anyhow!("landmark provider lock poisoned"))?;
            guard.estimate_hands(frame, max_hands)?
        };

        let poses = match self.provider_for(LandmarkCapability::Pose)? {
            Some(pose_provider) => {
                let mut guard = pose_provider
                    .lock()
                    .map_err(|_| anyhow!("landmark provider lock poisoned"))?;
                guard.estimate_poses(frame)?
            }
            None => Vec::new(),
        };
        Ok((hands, poses))
    }

    /// Warm up every registered provider.
    pub fn warm_up(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            let mut guard = provider
                .lock()
                .map_err(|_| anyhow!("landmark provider '{}' lock poisoned", name))?;
            guard.warm_up()?;
        }
        Ok(())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn supports(provider: &SharedProvider, capability: LandmarkCapability) -> Result<bool> {
    let guard = provider
        .lock()
        .map_err(|_| anyhow!("landmark provider lock poisoned"))?;
    Ok(guard.supports(capability))
}
