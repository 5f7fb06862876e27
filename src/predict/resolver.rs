use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::predict::element_set::{element_set_id, parse_epoch, ElementSet};
use crate::predict::error::ResolveError;
use crate::predict::types::TleSource;

pub const FALLBACK_NAME: &str = "ISS (ZARYA)";
pub const FALLBACK_LINE1: &str =
    "1 25544U 98067A   26280.50000000  .00012345  00000-0  22154-3 0  9995";
pub const FALLBACK_LINE2: &str =
    "2 25544  51.6316 120.4021 0004012  89.6521 270.4765 15.49812345530272";
/// Beyond this age the fallback set is reported as stale.
pub const FALLBACK_STALE_DAYS: i64 = 7;

const PROXY_PLACEHOLDER: &str = "{url}";

/// Plain-text GET used by the resolver.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, ResolveError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` bounds each request end to end.
    pub fn new(timeout: StdDuration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TextFetcher for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String, ResolveError> {
        let unavailable = |reason: String| ResolveError::SourceUnavailable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }

        response.text().await.map_err(|e| unavailable(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TleSources {
    pub primary_url: String,
    pub backup_url: String,
    /// URL template containing `{url}`, replaced with the encoded target.
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for TleSources {
    fn default() -> Self {
        Self {
            primary_url: "https://celestrak.org/NORAD/elements/gp.php?CATNR=25544&FORMAT=TLE"
                .to_string(),
            backup_url: "https://tle.ivanstanojevic.me/api/tle/25544/raw".to_string(),
            proxy_url: Some("https://api.allorigins.win/raw?url={url}".to_string()),
        }
    }
}

impl TleSources {
    fn attempts(&self) -> Vec<(TleSource, String)> {
        let mut attempts = Vec::with_capacity(4);
        for (source, url) in [
            (TleSource::Primary, &self.primary_url),
            (TleSource::Backup, &self.backup_url),
        ] {
            attempts.push((source, url.clone()));
            if let Some(proxied) = self.proxied(url) {
                attempts.push((source, proxied));
            }
        }
        attempts
    }

    fn proxied(&self, url: &str) -> Option<String> {
        self.proxy_url
            .as_ref()
            .filter(|template| template.contains(PROXY_PLACEHOLDER))
            .map(|template| template.replace(PROXY_PLACEHOLDER, &urlencoding::encode(url)))
    }
}

pub struct ElementSetResolver {
    fetcher: Arc<dyn TextFetcher>,
    sources: TleSources,
}

impl ElementSetResolver {
    pub fn new(fetcher: Arc<dyn TextFetcher>, sources: TleSources) -> Self {
        Self { fetcher, sources }
    }

    /// Walk primary, backup (each direct then proxied) and finally the
    /// built-in set. Never fails.
    pub async fn fetch_element_set(&self) -> ElementSet {
        for (source, url) in self.sources.attempts() {
            match self.try_fetch(source, &url).await {
                Ok(set) => {
                    log::info!(
                        "Element set for catalog #{} fetched from {} source (epoch {})",
                        set.norad_id().unwrap_or_default(),
                        source,
                        set.epoch
                    );
                    return set;
                }
                Err(e) => log::warn!("Element set attempt via {} failed: {}", url, e),
            }
        }

        let set = fallback_element_set(Utc::now());
        log::warn!("All element set sources failed, using built-in fallback");
        set
    }

    async fn try_fetch(&self, source: TleSource, url: &str) -> Result<ElementSet, ResolveError> {
        let body = self.fetcher.get_text(url).await?;
        ElementSet::parse(&body, source, Utc::now())
    }
}

/// The built-in element set, with a staleness warning when its epoch is old.
pub fn fallback_element_set(now: DateTime<Utc>) -> ElementSet {
    let set = ElementSet {
        id: element_set_id(now),
        name: Some(FALLBACK_NAME.to_string()),
        line1: FALLBACK_LINE1.to_string(),
        line2: FALLBACK_LINE2.to_string(),
        epoch: parse_epoch(FALLBACK_LINE1).unwrap_or(now),
        fetched_at: now,
        source: TleSource::Fallback,
    };

    let age = set.age(now);
    if age > Duration::days(FALLBACK_STALE_DAYS) {
        log::warn!(
            "Fallback element set is {} days old; predictions will be inaccurate",
            age.num_days()
        );
    }
    set
}
