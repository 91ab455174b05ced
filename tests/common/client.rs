//! HTTP client used by the suites. Redirects are never followed so that
//! `301` responses can be inspected.

use std::time::Duration;

use reqwest::{redirect, Client, Method, RequestBuilder, Response};

pub struct TestClient {
    pub client: Client,
}

impl TestClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        TestClient { client }
    }

    /// Client for HTTPS servers using throwaway certificates
    pub fn insecure() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()
            .expect("Failed to create HTTPS client");

        TestClient { client }
    }

    pub async fn get(&self, url: &str) -> Result<Response, Box<dyn std::error::Error>> {
        Ok(self.client.get(url).send().await?)
    }

    pub async fn head(&self, url: &str) -> Result<Response, Box<dyn std::error::Error>> {
        Ok(self.client.head(url).send().await?)
    }

    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        Ok(request.send().await?)
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        Ok(self.client.request(method, url).send().await?)
    }

    /// Escape hatch for requests the helpers above do not cover
    pub fn builder(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}
