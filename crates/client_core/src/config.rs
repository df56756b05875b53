use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::Deserialize;
use shared::domain::QuestionId;
use url::Url;

use crate::workspace::DEFAULT_PAGE_SIZE;

pub const SETTINGS_FILE: &str = "qlog.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub site_url: String,
    pub page_size: u32,
    pub credential_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".into(),
            site_url: "http://localhost:5173".into(),
            page_size: DEFAULT_PAGE_SIZE,
            credential_path: PathBuf::from("./data/session.token"),
        }
    }
}

impl Settings {
    pub fn api_base(&self) -> anyhow::Result<Url> {
        normalize_base_url(&self.api_base_url)
            .with_context(|| format!("invalid api_base_url '{}'", self.api_base_url))
    }

    pub fn site_base(&self) -> anyhow::Result<Url> {
        normalize_base_url(&self.site_url)
            .with_context(|| format!("invalid site_url '{}'", self.site_url))
    }

    /// Public page of a question on the web front end.
    pub fn share_link(&self, id: &QuestionId) -> anyhow::Result<Url> {
        let mut url = self.site_base()?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("site_url '{}' cannot carry paths", self.site_url))?
            .pop_if_empty()
            .extend(["questions", id.as_str()]);
        Ok(url)
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file (if present), then environment overrides.
/// Plain variable names apply first and `APP__` names win over them.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    };

    if let Some(v) = env("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("SITE_URL") {
        settings.site_url = v;
    }
    if let Some(v) = env("APP__SITE_URL") {
        settings.site_url = v;
    }

    if let Some(v) = env("APP__PAGE_SIZE") {
        settings.page_size = v
            .trim()
            .parse()
            .with_context(|| format!("APP__PAGE_SIZE must be a positive integer, got '{v}'"))?;
    }

    if let Some(v) = env("QLOG_CREDENTIAL_PATH") {
        settings.credential_path = PathBuf::from(v);
    }
    if let Some(v) = env("APP__CREDENTIAL_PATH") {
        settings.credential_path = PathBuf::from(v);
    }

    if settings.page_size == 0 {
        bail!("page_size must be at least 1");
    }

    Ok(settings)
}

/// Accepts `host:port` shorthands and guarantees a trailing slash so that
/// relative joins keep any path prefix.
pub fn normalize_base_url(raw: &str) -> anyhow::Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("base url is empty");
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let mut url = Url::parse(&with_scheme)?;
    if url.cannot_be_a_base() {
        bail!("'{raw}' cannot be used as a base url");
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
