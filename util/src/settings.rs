use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};

use iothub_data_formats::constants::CONNECTION_STRING_ENV;
use iothub_http_wrapper::{ClientConfig, ServiceClient};

/// Settings for a component talking to a hub.
///
/// The connection string carries the shared access key, so this type does
/// not implement `Debug`.
#[derive(Default, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default)]
    pub connection_string: Option<String>,

    #[serde(flatten)]
    pub client: ClientConfig,
}

impl ClientSettings {
    /// Picks the connection string: explicit override, then settings, then
    /// the `CONNECTION_STRING` environment variable.
    pub fn resolve_connection_string(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(String::from)
            .or_else(|| self.connection_string.clone())
            .or_else(|| env::var(CONNECTION_STRING_ENV).ok())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No connection string configured and no {} in environment",
                    CONNECTION_STRING_ENV
                )
            })
    }
}

/// Layers the settings for `component`: packaged defaults, the main config
/// file, drop-in files, then `<COMPONENT>_*` environment variables.
pub fn settings_for(component: &str) -> Result<config::Config> {
    let conf_file = conf_dir_from_env(&format_conf_env(component))
        .unwrap_or_else(|| format!("/etc/iothub/{}.yml", component));
    let conf_dir = conf_dir_from_env(&format_conf_dir_env(component))
        .unwrap_or_else(|| format!("/etc/iothub/{}.conf.d", component));

    let dropins = glob(&format!("{}/*.yml", conf_dir))
        .context("Invalid configuration directory pattern")?
        .collect::<Result<Vec<PathBuf>, _>>()
        .context("Listing configuration files from conf.d")?
        .into_iter()
        .map(config::File::from)
        .collect::<Vec<_>>();
    log::trace!("Found {} drop-in configuration files", dropins.len());

    config::Config::builder()
        .add_source(
            config::File::from(Path::new(&format!("/usr/share/iothub/{}.yml", component)))
                .required(false),
        )
        .add_source(config::File::from(Path::new(&conf_file)).required(false))
        .add_source(dropins)
        .add_source(
            config::Environment::with_prefix(&component_env_prefix(component)).try_parsing(true),
        )
        .build()
        .with_context(|| format!("Loading configuration for {}", component))
}

pub fn client_settings_for(component: &str) -> Result<ClientSettings> {
    settings_for(component)?
        .try_deserialize()
        .context("Parsing client settings")
}

/// Builds the client for `component`, failing on any configuration error
/// before a request is ever sent.
pub fn client_for(component: &str, connection_string: Option<&str>) -> Result<ServiceClient> {
    let settings = client_settings_for(component)?;
    let connection_string = settings.resolve_connection_string(connection_string)?;

    ServiceClient::from_connection_string(&connection_string, settings.client)
        .context("Creating hub client")
}

pub fn format_conf_env(component: &str) -> String {
    format!("{}_CONF", component_env_prefix(component))
}

pub fn format_conf_dir_env(component: &str) -> String {
    format!("{}_CONF_DIR", component_env_prefix(component))
}

fn component_env_prefix(component: &str) -> String {
    component.to_string().replace('-', "_").to_uppercase()
}

fn conf_dir_from_env(key: &str) -> Option<String> {
    env::var_os(key).and_then(|v| v.into_string().ok())
}
