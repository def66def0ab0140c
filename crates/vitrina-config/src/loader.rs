// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `/etc/vitrina/vitrina.toml`, then the XDG user config, then
//! `./vitrina.toml`, then `VITRINA_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::VitrinaConfig;

/// Config sections reachable from the environment, in match order.
const ENV_SECTIONS: &[&str] = &[
    "bot", "store", "vendor", "whatsapp", "anthropic", "timers", "tokens", "payment", "storage",
    "gateway",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/vitrina/vitrina.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "vitrina.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("vitrina/vitrina.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<VitrinaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string, without files or env vars.
pub fn load_config_from_str(toml_content: &str) -> Result<VitrinaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VitrinaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<VitrinaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VitrinaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(VitrinaConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Maps `VITRINA_WHATSAPP_ACCESS_TOKEN` to `whatsapp.access_token`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys that contain underscores survive intact. `store.faq.*` and
/// `store.sinpe.*` are nested one level deeper.
fn env_provider() -> Env {
    Env::prefixed("VITRINA_").map(|key| env_key_to_path(key.as_str()).into())
}

pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            continue;
        };
        if *section == "store" {
            for nested in ["faq", "sinpe"] {
                if let Some(leaf) = rest
                    .strip_prefix(nested)
                    .and_then(|leaf| leaf.strip_prefix('_'))
                {
                    return format!("store.{nested}.{leaf}");
                }
            }
        }
        return format!("{section}.{rest}");
    }
    key.to_string()
}
