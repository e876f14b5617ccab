//! Language registry - immutable id → profile lookup built at startup

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::profile::LanguageProfile;
use crate::config::{builtin_languages, LanguageConfig};
use crate::error::{Error, Result};

/// Registry of runnable languages
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: HashMap<String, Arc<LanguageProfile>>,
}

impl LanguageRegistry {
    /// Build a registry from configured languages.
    ///
    /// Every `next_stage` must name a registered language, and stage chains
    /// must terminate.
    pub fn from_config(languages: &BTreeMap<String, LanguageConfig>) -> Result<Self> {
        let profiles: HashMap<String, Arc<LanguageProfile>> = languages
            .iter()
            .map(|(id, config)| (id.clone(), Arc::new(LanguageProfile::from_config(id, config))))
            .collect();

        let registry = LanguageRegistry { profiles };
        for id in registry.profiles.keys() {
            registry.check_stages(id)?;
        }

        Ok(registry)
    }

    /// The registry of built-in languages
    pub fn builtin() -> Self {
        // Built-ins never chain stages, so this cannot fail
        let profiles = builtin_languages()
            .iter()
            .map(|(id, config)| (id.clone(), Arc::new(LanguageProfile::from_config(id, config))))
            .collect();
        LanguageRegistry { profiles }
    }

    fn check_stages(&self, id: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let mut current = Some(id);

        while let Some(stage) = current {
            if !seen.insert(stage) {
                return Err(Error::Config(format!(
                    "Language {} has a stage chain that loops back to {}",
                    id, stage
                )));
            }
            let profile = self.profiles.get(stage).ok_or_else(|| {
                Error::Config(format!("Language {} names unknown next stage {}", id, stage))
            })?;
            current = profile.next_stage.as_deref();
        }

        Ok(())
    }

    /// Resolve a language id
    pub fn lookup(&self, id: &str) -> Result<Arc<LanguageProfile>> {
        match self.profiles.get(id) {
            Some(profile) if !profile.is_empty() => Ok(Arc::clone(profile)),
            _ => Err(Error::UnknownLanguage(id.to_string())),
        }
    }

    /// The profile followed by every stage it chains to, in run order
    pub fn stages(&self, profile: &Arc<LanguageProfile>) -> Result<Vec<Arc<LanguageProfile>>> {
        let mut stages = vec![Arc::clone(profile)];
        let mut next = profile.next_stage.clone();

        while let Some(id) = next {
            let stage = self.lookup(&id)?;
            next = stage.next_stage.clone();
            stages.push(stage);
        }

        Ok(stages)
    }

    /// Sorted language ids
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.profiles.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered languages
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
