use async_trait::async_trait;
use reqwest::{Request, Response};

/// Anything that can execute a prepared request. Auth layers wrap another
/// `HttpClient` and edit the request on the way through.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
