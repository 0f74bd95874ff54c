//! Name -> adapter lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::GenerationProvider;
use crate::http::HttpProvider;

/// Env var prefix for HTTP providers: `PROVIDER_<NAME>_URL`.
const ENV_PREFIX: &str = "PROVIDER_";
const URL_SUFFIX: &str = "_URL";
const API_KEY_SUFFIX: &str = "_API_KEY";

/// Registered provider adapters, keyed by lowercase name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an adapter under `name`.
    pub fn register(&mut self, name: &str, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(name.to_lowercase(), provider);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: &str, provider: Arc<dyn GenerationProvider>) -> Self {
        self.register(name, provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build HTTP adapters from environment variables.
    ///
    /// Every `PROVIDER_<NAME>_URL` registers a provider named `<name>`
    /// (lowercased), authenticated with `PROVIDER_<NAME>_API_KEY` if set.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let client = reqwest::Client::new();
        let mut registry = Self::new();

        for (key, url) in &vars {
            let Some(name) = key
                .strip_prefix(ENV_PREFIX)
                .and_then(|rest| rest.strip_suffix(URL_SUFFIX))
                .filter(|name| !name.is_empty())
            else {
                continue;
            };

            let api_key = vars.get(&format!("{ENV_PREFIX}{name}{API_KEY_SUFFIX}")).cloned();
            registry.register(
                name,
                Arc::new(HttpProvider::with_client(client.clone(), url.clone(), api_key)),
            );
            tracing::info!(provider = %name.to_lowercase(), %url, "Registered HTTP provider");
        }

        registry
    }
}
