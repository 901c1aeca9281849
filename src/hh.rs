use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::FetchError;

/// One page of search results. Items stay raw so a bad item only costs itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    /// Total page count hint.
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub found: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub keyword: &'a str,
    /// 0-based.
    pub page: u32,
    pub area: u32,
    pub per_page: u32,
}

impl PageRequest<'_> {
    pub fn query(&self) -> [(&'static str, String); 4] {
        [
            ("text", format!("NAME:{}", self.keyword)),
            ("area", self.area.to_string()),
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ]
    }
}

/// Anything that can produce a page of results. `None` is the failure marker:
/// the implementation has already reported why.
#[async_trait]
pub trait PageSource {
    async fn fetch_page(&self, req: &PageRequest<'_>) -> Option<Page>;
}

pub struct HhClient {
    http: reqwest::Client,
    api_url: String,
}

impl HhClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            http,
            api_url: settings.api_url.clone(),
        })
    }

    async fn try_fetch(&self, req: &PageRequest<'_>) -> Result<Page, FetchError> {
        let resp = self.http.get(&self.api_url).query(&req.query()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl PageSource for HhClient {
    async fn fetch_page(&self, req: &PageRequest<'_>) -> Option<Page> {
        match self.try_fetch(req).await {
            Ok(page) => {
                debug!(
                    keyword = req.keyword,
                    page = req.page,
                    items = page.items.len(),
                    pages = ?page.pages,
                    found = ?page.found,
                    "Fetched page"
                );
                Some(page)
            }
            Err(e) => {
                warn!(keyword = req.keyword, page = req.page, "Request failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Answer exactly one request with `status` and `body`. The handle yields
    /// the request head as received.
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            sock.write_all(response.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{}/vacancies", addr), handle)
    }

    fn client(api_url: String) -> HhClient {
        HhClient::new(&Settings { api_url, timeout_secs: 5, ..Settings::default() }).unwrap()
    }

    fn intern_req() -> PageRequest<'static> {
        PageRequest { keyword: "Intern", page: 0, area: 40, per_page: 100 }
    }

    #[tokio::test]
    async fn ok_body_yields_page() {
        let (url, server) = serve_once("200 OK", r#"{"items":[{"id":"1"}],"pages":1,"found":1}"#).await;
        let page = client(url).fetch_page(&intern_req()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.pages, Some(1));

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /vacancies?"));
        assert!(head.contains("text=NAME%3AIntern"));
        assert!(head.contains("area=40"));
        assert!(head.contains("per_page=100"));
    }

    #[tokio::test]
    async fn error_status_is_failure() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"items":[]}"#).await;
        assert!(client(url).fetch_page(&intern_req()).await.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_body_is_failure() {
        let (url, server) = serve_once("200 OK", "<html>captcha</html>").await;
        assert!(client(url).fetch_page(&intern_req()).await.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_failure() {
        // Grab a free port, then close it so nothing is listening
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let c = client(format!("http://{}/vacancies", addr));
        assert!(c.fetch_page(&intern_req()).await.is_none());
    }

    #[test]
    fn query_params() {
        let req = PageRequest { keyword: "Data Analyst", page: 2, area: 40, per_page: 100 };
        let q = req.query();
        assert_eq!(q[0], ("text", "NAME:Data Analyst".to_string()));
        assert_eq!(q[1], ("area", "40".to_string()));
        assert_eq!(q[2], ("page", "2".to_string()));
        assert_eq!(q[3], ("per_page", "100".to_string()));
    }

    #[test]
    fn page_body_decodes() {
        let body = r#"{"items":[{"id":"1"},{"id":"2"}],"pages":7,"found":650,"per_page":100}"#;
        let page: Page = serde_json::from_str(body).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pages, Some(7));
        assert_eq!(page.found, Some(650));
    }

    #[test]
    fn page_body_without_hint() {
        let page: Page = serde_json::from_str(r#"{"items":[]}"#).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.pages, None);
    }
}
