//! Player UUID to name resolution against Mojang-compatible profile services.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_HTTP_URL: &str = "https://api.minecraftservices.com/minecraft/profile/lookup/{uuid}";
pub const DEFAULT_SESSION_BASE: &str = "https://sessionserver.mojang.com";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no profile for {0}")]
    NotFound(String),
    #[error("unexpected status {status} for {uuid}")]
    Status { uuid: String, status: StatusCode },
    #[error("profile response for {uuid} is malformed: {reason}")]
    Malformed { uuid: String, reason: String },
}

/// Resolves a player UUID to its current display name.
#[async_trait]
pub trait NameResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, uuid: &str) -> Result<String, LookupError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverKind {
    #[default]
    Http,
    Mojang,
}

#[derive(Debug, Clone)]
pub struct LookupOptions {
    pub timeout: Duration,
    /// Template for [`HttpResolver`]; `{uuid}` is replaced by the dashed UUID.
    pub http_url: String,
    pub session_base: String,
    pub user_agent: String,
}

impl Default for LookupOptions {
    fn default() -> Self {
        LookupOptions {
            timeout: Duration::from_secs(10),
            http_url: DEFAULT_HTTP_URL.into(),
            session_base: DEFAULT_SESSION_BASE.into(),
            user_agent: format!("novacolumn/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub fn build_resolver(kind: ResolverKind, opts: &LookupOptions) -> anyhow::Result<Box<dyn NameResolver>> {
    let client = Client::builder()
        .timeout(opts.timeout)
        .user_agent(opts.user_agent.clone())
        .build()?;
    Ok(match kind {
        ResolverKind::Http => Box::new(HttpResolver { client, url_template: opts.http_url.clone() }),
        ResolverKind::Mojang => Box::new(MojangResolver { client, base: opts.session_base.trim_end_matches('/').to_string() }),
    })
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Generic JSON endpoint: any 2xx body with a string `name` counts as resolved.
pub struct HttpResolver {
    client: Client,
    url_template: String,
}

#[async_trait]
impl NameResolver for HttpResolver {
    fn name(&self) -> &'static str { "http" }

    async fn resolve(&self, uuid: &str) -> Result<String, LookupError> {
        let url = self.url_template.replace("{uuid}", uuid);
        tracing::debug!(%url, "profile lookup");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Err(LookupError::NotFound(uuid.to_string()));
        }
        if !status.is_success() {
            return Err(LookupError::Status { uuid: uuid.to_string(), status });
        }
        let profile: Profile = resp.json().await?;
        profile
            .name
            .ok_or_else(|| LookupError::Malformed { uuid: uuid.to_string(), reason: "missing name".into() })
    }
}

/// Mojang session server profile endpoint, addressed by undashed UUID.
pub struct MojangResolver {
    client: Client,
    base: String,
}

#[async_trait]
impl NameResolver for MojangResolver {
    fn name(&self) -> &'static str { "mojang" }

    async fn resolve(&self, uuid: &str) -> Result<String, LookupError> {
        let compact = compact_uuid(uuid);
        let url = format!("{}/session/minecraft/profile/{}", self.base, compact);
        tracing::debug!(%url, "session profile lookup");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            if status.is_success() || status == StatusCode::NOT_FOUND {
                return Err(LookupError::NotFound(uuid.to_string()));
            }
            return Err(LookupError::Status { uuid: uuid.to_string(), status });
        }
        let profile: Profile = resp.json().await?;
        match (profile.id, profile.name) {
            (Some(id), Some(name)) if compact_uuid(&id) == compact => Ok(name),
            (Some(id), Some(_)) => Err(LookupError::Malformed { uuid: uuid.to_string(), reason: format!("profile id {id} does not match") }),
            _ => Err(LookupError::Malformed { uuid: uuid.to_string(), reason: "missing id or name".into() }),
        }
    }
}

fn compact_uuid(uuid: &str) -> String {
    uuid.chars().filter(|c| *c != '-').map(|c| c.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection; returns the base URL.
    async fn canned(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let resp = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn opts(base: &str) -> LookupOptions {
        LookupOptions {
            timeout: Duration::from_secs(5),
            http_url: format!("{base}/lookup/{{uuid}}"),
            session_base: base.to_string(),
            ..LookupOptions::default()
        }
    }

    const UUID: &str = "069a79f4-44e9-4726-a5be-fca90e38aaf5";

    #[tokio::test]
    async fn http_resolver_reads_name() {
        let base = canned("200 OK", r#"{"id":"069a79f444e94726a5befca90e38aaf5","name":"Notch"}"#).await;
        let r = build_resolver(ResolverKind::Http, &opts(&base)).unwrap();
        assert_eq!(r.name(), "http");
        assert_eq!(r.resolve(UUID).await.unwrap(), "Notch");
    }

    #[tokio::test]
    async fn http_resolver_missing_name_fails() {
        let base = canned("200 OK", r#"{"id":"x"}"#).await;
        let r = build_resolver(ResolverKind::Http, &opts(&base)).unwrap();
        assert!(matches!(r.resolve(UUID).await, Err(LookupError::Malformed { .. })));
    }

    #[tokio::test]
    async fn http_resolver_not_found() {
        let base = canned("404 Not Found", r#"{"error":"not found"}"#).await;
        let r = build_resolver(ResolverKind::Http, &opts(&base)).unwrap();
        assert!(matches!(r.resolve(UUID).await, Err(LookupError::NotFound(_))));
    }

    #[tokio::test]
    async fn mojang_resolver_checks_id() {
        let base = canned("200 OK", r#"{"id":"069a79f444e94726a5befca90e38aaf5","name":"Notch"}"#).await;
        let r = build_resolver(ResolverKind::Mojang, &opts(&base)).unwrap();
        assert_eq!(r.resolve(UUID).await.unwrap(), "Notch");
        assert!(matches!(
            r.resolve("00000000-0000-0000-0000-000000000000").await,
            Err(LookupError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn mojang_resolver_no_content_is_not_found() {
        let base = canned("204 No Content", "").await;
        let r = build_resolver(ResolverKind::Mojang, &opts(&base)).unwrap();
        assert!(matches!(r.resolve(UUID).await, Err(LookupError::NotFound(_))));
    }

    #[test]
    fn compact_uuid_strips_dashes_and_case() {
        assert_eq!(compact_uuid("069A79F4-44e9-4726-a5be-fca90e38aaf5"), "069a79f444e94726a5befca90e38aaf5");
    }
}
