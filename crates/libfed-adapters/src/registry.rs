//! The adapter registry (spec §4.8): builds one `Arc<dyn CatalogAdapter>`
//! per `AdapterConfig` across every enabled [`LibrarySystem`], keyed by
//! `SystemId`. A single adapter failing to construct (most commonly: a
//! credential env var named in the config isn't actually set) drops only
//! that adapter, per spec §3's adapter-configuration invariant — it never
//! fails the whole registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use libfed_domain::{AdapterConfig, LibrarySystem, Protocol, SystemId};
use reqwest::Client;
use tracing::warn;

use crate::base::CatalogAdapter;
use crate::error::AdapterError;
use crate::patterns::hmac_rest::HmacRestAdapter;
use crate::patterns::html_scrape::{HtmlScrapeAdapter, HtmlScrapeConfig};
use crate::patterns::oauth2_rest::Oauth2RestAdapter;
use crate::patterns::oclc_worldcat::OclcWorldcatAdapter;
use crate::patterns::spa_scrape::SpaScrapeAdapter;
use crate::patterns::sru::SruAdapter;
use crate::patterns::two_phase_rest::TwoPhaseRestAdapter;

/// `HashMap<SystemId, Vec<Arc<dyn CatalogAdapter>>>`, plus the system
/// metadata (name) the coordinator needs for `SystemError.systemName`
/// without a second lookup.
pub struct AdapterRegistry {
    adapters: HashMap<SystemId, Vec<Arc<dyn CatalogAdapter>>>,
    system_names: HashMap<SystemId, String>,
}

impl AdapterRegistry {
    /// Build the registry from the loaded library systems. Disabled
    /// systems are skipped entirely (spec §6: `enabled: false` systems are
    /// loaded for validation but never fanned out to).
    pub fn build(client: &Client, systems: &[LibrarySystem]) -> Self {
        let mut adapters = HashMap::new();
        let mut system_names = HashMap::new();

        for system in systems {
            if !system.enabled {
                continue;
            }
            system_names.insert(system.id.clone(), system.name.clone());

            let mut built = Vec::new();
            for config in &system.adapters {
                match construct(client.clone(), system, config) {
                    Ok(adapter) => built.push(adapter),
                    Err(e) => {
                        warn!(
                            system = %system.id,
                            protocol = %config.protocol,
                            error = %libfed_redaction::redact_user_string(&e.to_string()),
                            "skipping adapter: construction failed"
                        );
                    }
                }
            }
            adapters.insert(system.id.clone(), built);
        }

        Self { adapters, system_names }
    }

    pub fn systems(&self) -> impl Iterator<Item = &SystemId> {
        self.adapters.keys()
    }

    pub fn system_name(&self, system_id: &SystemId) -> Option<&str> {
        self.system_names.get(system_id).map(String::as_str)
    }

    pub fn adapters_for(&self, system_id: &SystemId) -> &[Arc<dyn CatalogAdapter>] {
        self.adapters.get(system_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first configured adapter for a system, i.e. the one the
    /// coordinator's main fan-out drives (spec §4.8 `getPrimaryAdapter`).
    /// Later entries exist for manual health-comparison tooling, not the
    /// hot search path.
    pub fn primary_adapter(&self, system_id: &SystemId) -> Option<Arc<dyn CatalogAdapter>> {
        self.adapters_for(system_id).first().cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AdapterRegistry {
    /// Build a registry directly from pre-constructed adapters, bypassing
    /// config-driven [`construct`]. Test-only: production registries are
    /// always built via [`AdapterRegistry::build`].
    pub fn from_adapters(
        adapters: HashMap<SystemId, Vec<Arc<dyn CatalogAdapter>>>,
        system_names: HashMap<SystemId, String>,
    ) -> Self {
        Self { adapters, system_names }
    }
}

fn construct(client: Client, system: &LibrarySystem, config: &AdapterConfig) -> Result<Arc<dyn CatalogAdapter>, AdapterError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let system_id = system.id.clone();
    let system_name = system.name.clone();

    match config.protocol {
        Protocol::KohaSru | Protocol::Sru => Ok(Arc::new(SruAdapter::new(
            client,
            config.base_url.clone(),
            timeout,
            system_id,
            system_name,
            config.protocol,
        ))),

        Protocol::OclcWorldcat => {
            let wskey_env = config
                .client_key_env_var
                .clone()
                .ok_or_else(|| AdapterError::Adapter("oclc_worldcat adapter requires 'client_key_env_var'".to_string()))?;
            Ok(Arc::new(OclcWorldcatAdapter::new(client, config.base_url.clone(), wskey_env, timeout, system_id, system_name)?))
        }

        Protocol::SierraRest | Protocol::TlcApi => Ok(Arc::new(TwoPhaseRestAdapter::new(
            client,
            config.base_url.clone(),
            config.client_key_env_var.clone(),
            timeout,
            system_id,
            system_name,
            config.protocol,
        ))),

        Protocol::PolarisPapi => {
            let key_env = config
                .client_key_env_var
                .clone()
                .ok_or_else(|| AdapterError::Adapter("polaris_papi adapter requires 'client_key_env_var'".to_string()))?;
            let secret_env = config
                .client_secret_env_var
                .clone()
                .ok_or_else(|| AdapterError::Adapter("polaris_papi adapter requires 'client_secret_env_var'".to_string()))?;
            Ok(Arc::new(HmacRestAdapter::new(client, config.base_url.clone(), &key_env, &secret_env, timeout, system_id, system_name)?))
        }

        Protocol::AspenDiscoveryApi | Protocol::ApolloApi => {
            let key_env = config
                .client_key_env_var
                .clone()
                .ok_or_else(|| AdapterError::Adapter(format!("{} adapter requires 'client_key_env_var'", config.protocol)))?;
            let secret_env = config
                .client_secret_env_var
                .clone()
                .ok_or_else(|| AdapterError::Adapter(format!("{} adapter requires 'client_secret_env_var'", config.protocol)))?;
            let client_key = libfed_config::resolve_credential(&key_env).map_err(|e| AdapterError::Auth(e.to_string()))?;
            let client_secret = libfed_config::resolve_credential(&secret_env).map_err(|e| AdapterError::Auth(e.to_string()))?;
            let token_url = config
                .extra
                .get("token_url")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AdapterError::Adapter(format!("{} adapter requires 'token_url' in 'extra'", config.protocol)))?;
            let scope = config.extra.get("scope").and_then(serde_json::Value::as_str).map(str::to_string);

            Ok(Arc::new(Oauth2RestAdapter::new(
                client,
                config.base_url.clone(),
                token_url,
                client_key,
                client_secret,
                scope,
                timeout,
                system_id,
                system_name,
                config.protocol,
            )))
        }

        Protocol::SirsiEnterpriseScrape | Protocol::BibliocommonsScrape => {
            let search_path_template = config
                .extra
                .get("search_path_template")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AdapterError::Parse(format!("{} adapter requires 'search_path_template' in 'extra'", config.protocol)))?;
            let lookup_path = config
                .extra
                .get("lookup_path")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AdapterError::Parse(format!("{} adapter requires 'lookup_path' in 'extra'", config.protocol)))?;

            Ok(Arc::new(SpaScrapeAdapter::new(
                client,
                config.base_url.clone(),
                search_path_template,
                lookup_path,
                timeout,
                system_id,
                system_name,
                config.protocol,
            )))
        }

        Protocol::WebScrape | Protocol::AtriuumScrape | Protocol::SpydusScrape => {
            let scrape_config = HtmlScrapeConfig::from_extra(&config.extra)?;
            Ok(Arc::new(HtmlScrapeAdapter::new(client, scrape_config, timeout, system_id, system_name, config.protocol)))
        }

        Protocol::PlaywrightScrape => Err(AdapterError::Adapter(
            "playwright_scrape requires an external browser-pool service; construct via BrowserScrapeAdapter::new directly with a BrowserPool implementation".to_string(),
        )),
    }
}
