use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::comments::CommentId;
use crate::data::{CommentDto, CommentPage, NewComment};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1/";

/// `updateType` for counting a view; reaction codes live on `ReactionAction`.
pub const INCREASE_VIEW: u8 = 5;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    token: Option<String>,
    base_url: Url,
}

/// `{status, message, data}` wrapper every successful response uses.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub message: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging<T> {
    pub current: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub total_pages: u32,
    pub total_records: usize,
    #[serde(default = "Vec::new")]
    pub dataset: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExceptionBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    request_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord<'a> {
    video_id: &'a str,
    pause_position: u64,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("backend client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&normalize_base(&base))
            .with_context(|| format!("backend: invalid base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            token: config.token.filter(|token| !token.trim().is_empty()),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn comments(
        &self,
        video_id: &str,
        parent_id: Option<CommentId>,
        page: u32,
        size: u32,
    ) -> Result<CommentPage> {
        let mut params = vec![
            ("page".to_string(), page.to_string()),
            ("size".to_string(), size.to_string()),
        ];
        if let Some(parent) = parent_id {
            params.push(("parentId".to_string(), parent.to_string()));
        }
        let path = format!("videos/{}/comments", video_id);
        let paging: Paging<CommentDto> = self.fetch(Method::GET, &path, &params, None)?;
        Ok(CommentPage {
            items: paging.dataset,
            total: paging.total_records,
            page: paging.current,
        })
    }

    pub fn create_comment(&self, comment: &NewComment) -> Result<CommentDto> {
        if comment.content.trim().is_empty() {
            bail!("backend: comment content is required");
        }
        let body = serde_json::to_value(comment).context("backend: encode comment")?;
        self.fetch(Method::POST, "comments", &[], Some(body))
    }

    pub fn delete_comment(&self, id: CommentId) -> Result<()> {
        self.request(Method::DELETE, &format!("comments/{}", id), &[], None)?;
        Ok(())
    }

    pub fn update_video(&self, video_id: &str, update_type: u8) -> Result<()> {
        let body = json!({ "updateType": update_type });
        self.request(Method::PATCH, &format!("videos/{}", video_id), &[], Some(body))?;
        Ok(())
    }

    pub fn log_watch_history(&self, video_id: &str, position: u64) -> Result<()> {
        let body = serde_json::to_value(HistoryRecord {
            video_id,
            pause_position: position,
        })
        .context("backend: encode history record")?;
        self.request(Method::PUT, "watch-history", &[], Some(body))?;
        Ok(())
    }

    fn fetch<T>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let resp = self.request(method, path, params, body)?;
        let envelope: Envelope<T> = resp.json().context("backend: decode response")?;
        Ok(envelope.data)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let raw = resp.text().unwrap_or_default();
        Err(status_error(status.as_u16(), &raw))
    }
}

fn normalize_base(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

fn status_error(status: u16, raw: &str) -> anyhow::Error {
    let body: ExceptionBody = serde_json::from_str(raw).unwrap_or_default();
    let detail = if body.message.is_empty() {
        raw.trim().to_string()
    } else if body.request_id.is_empty() {
        body.message
    } else {
        format!("{} (request {})", body.message, body.request_id)
    };
    match status {
        401 => anyhow!("backend: unauthorized"),
        403 => anyhow!("backend: forbidden: {}", detail),
        404 => anyhow!("backend: not found: {}", detail),
        _ if !body.error_code.is_empty() => {
            anyhow!("backend: api error {} [{}]: {}", status, body.error_code, detail)
        }
        _ => anyhow!("backend: api error {}: {}", status, detail),
    }
}
