use async_trait::async_trait;
use reqwest::{Method, Request, Response, Url};

/// Transport seam for feed retrieval. Implementations may decorate the
/// request (headers, query parameters) before handing it to an inner client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;

    /// Issues a plain GET for `url`.
    async fn get(&self, url: Url) -> reqwest::Result<Response> {
        self.execute(Request::new(Method::GET, url)).await
    }
}
