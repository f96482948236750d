//! Concrete acquisition sources.
//!
//! These are thin: fetch a list, turn each line or record into a
//! `ProxyId`, insert. Candidates that do not parse are dropped silently.

use super::Collector;
use crate::proxy::{Protocol, ProxyId};
use crate::retry::RetryPolicy;
use crate::store::{ScoredStore, INITIAL_SCORE};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "proxy-pool collector";

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

async fn insert_all(store: &dyn ScoredStore, candidates: Vec<ProxyId>) -> anyhow::Result<usize> {
    let mut inserted = 0;
    for id in candidates {
        if store.insert_if_absent(&id, INITIAL_SCORE).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Collector for plain-text lists of `ip:port` lines (the shape served by
/// ProxyScrape-style APIs and most free list mirrors).
pub struct PlainTextCollector {
    name: String,
    urls: Vec<String>,
    /// Protocol assumed for bare `ip:port` lines.
    default_protocol: Protocol,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl PlainTextCollector {
    pub fn new(
        name: impl Into<String>,
        urls: Vec<impl Into<String>>,
        default_protocol: Protocol,
    ) -> Self {
        Self {
            name: name.into(),
            urls: urls.into_iter().map(Into::into).collect(),
            default_protocol,
            client: http_client(),
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Collector for PlainTextCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self, store: &dyn ScoredStore) -> anyhow::Result<usize> {
        let mut candidates = Vec::new();
        for url in &self.urls {
            let body = self.retry.fetch_text(&self.client, url).await?;
            candidates.extend(parse_proxy_list(&body, self.default_protocol));
        }
        insert_all(store, candidates).await
    }
}

/// Parse a text body into identifiers, one per line.
///
/// Lines already carrying a `protocol://` prefix are validated as-is; bare
/// `ip:port` lines get `default_protocol`. Anything else is skipped.
pub(crate) fn parse_proxy_list(content: &str, default_protocol: Protocol) -> Vec<ProxyId> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let raw = if line.contains("://") {
                line.to_string()
            } else {
                format!("{}{}", default_protocol.prefix(), line)
            };
            match ProxyId::parse(&raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    debug!("dropping malformed candidate {line:?}");
                    None
                }
            }
        })
        .collect()
}

/// Collector for the GeoNode proxy-list JSON API.
pub struct GeonodeCollector {
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GeonodeCollector {
    pub fn new() -> Self {
        Self {
            url: "https://proxylist.geonode.com/api/proxy-list?limit=100&page=1&sort_by=lastChecked&sort_type=desc"
                .to_string(),
            client: http_client(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for GeonodeCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for GeonodeCollector {
    fn name(&self) -> &str {
        "geonode"
    }

    async fn acquire(&self, store: &dyn ScoredStore) -> anyhow::Result<usize> {
        let body = self.retry.fetch_text(&self.client, &self.url).await?;
        let candidates = parse_geonode(&body);
        insert_all(store, candidates).await
    }
}

/// Pull `protocol://ip:port` identifiers out of a GeoNode API response.
pub(crate) fn parse_geonode(body: &str) -> Vec<ProxyId> {
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let Some(entries) = doc.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let ip = entry.get("ip")?.as_str()?;
            let port = entry.get("port")?.as_str()?;
            let protocol = entry.get("protocols")?.as_array()?.first()?.as_str()?;
            ProxyId::parse(&format!("{protocol}://{ip}:{port}")).ok()
        })
        .collect()
}

/// The static registry of acquisition sources assembled at startup.
pub fn default_collectors() -> Vec<Arc<dyn Collector>> {
    vec![
        Arc::new(PlainTextCollector::new(
            "proxyscrape-http",
            vec![
                "https://api.proxyscrape.com/v2/?request=getproxies&protocol=http&timeout=10000&country=all&ssl=all&anonymity=all",
            ],
            Protocol::Http,
        )),
        Arc::new(PlainTextCollector::new(
            "proxyscrape-socks5",
            vec![
                "https://api.proxyscrape.com/v2/?request=getproxies&protocol=socks5&timeout=10000&country=all",
            ],
            Protocol::Socks5,
        )),
        Arc::new(GeonodeCollector::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_lines_get_the_default_protocol() {
        let parsed = parse_proxy_list("1.2.3.4:8080\n5.6.7.8:3128\n", Protocol::Http);
        let raw: Vec<&str> = parsed.iter().map(|id| id.as_str()).collect();
        assert_eq!(raw, vec!["http://1.2.3.4:8080", "http://5.6.7.8:3128"]);
    }

    #[test]
    fn prefixed_lines_keep_their_protocol() {
        let parsed = parse_proxy_list("socks5://1.2.3.4:1080\n", Protocol::Http);
        assert_eq!(parsed[0].protocol(), Protocol::Socks5);
    }

    #[test]
    fn malformed_lines_are_dropped_silently() {
        let parsed = parse_proxy_list(
            "# comment\n\nnot-a-proxy\n1.2.3.4:99999\nftp://1.2.3.4:21\n1.2.3.4:8080\n",
            Protocol::Http,
        );
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].as_str(), "http://1.2.3.4:8080");
    }

    #[test]
    fn geonode_payload_parses_into_identifiers() {
        let body = r#"{"data":[
            {"ip":"1.2.3.4","port":"8080","protocols":["http"]},
            {"ip":"5.6.7.8","port":"1080","protocols":["socks5"]},
            {"ip":"bad host","port":"1080","protocols":["socks5"]}
        ]}"#;
        let parsed = parse_geonode(body);
        let raw: Vec<&str> = parsed.iter().map(|id| id.as_str()).collect();
        assert_eq!(raw, vec!["http://1.2.3.4:8080", "socks5://5.6.7.8:1080"]);
    }

    #[test]
    fn geonode_garbage_yields_nothing() {
        assert!(parse_geonode("not json").is_empty());
        assert!(parse_geonode(r#"{"data": 42}"#).is_empty());
    }
}
