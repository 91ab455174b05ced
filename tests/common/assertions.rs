//! Chainable checks on `reqwest::Response`

use reqwest::{Response, StatusCode};

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).map(|value| {
        value
            .to_str()
            .unwrap_or_else(|_| panic!("{} header is not visible ASCII", name))
    })
}

pub trait ResponseAssertions {
    fn assert_status(&self, expected: StatusCode) -> &Self;

    /// Exact header value
    fn assert_header(&self, name: &str, expected: &str) -> &Self;

    fn assert_no_header(&self, name: &str) -> &Self;

    fn assert_content_type(&self, expected: &str) -> &Self;

    /// Consume the body as text
    async fn text_for_assertions(self) -> Result<String, Box<dyn std::error::Error>>;

    /// Consume the body as raw bytes, without any decoding
    async fn bytes_for_assertions(self) -> Result<Vec<u8>, Box<dyn std::error::Error>>;
}

impl ResponseAssertions for Response {
    fn assert_status(&self, expected: StatusCode) -> &Self {
        let actual = self.status();
        assert!(
            actual == expected,
            "{}: expected status {}, got {}",
            self.url(),
            expected,
            actual
        );
        self
    }

    fn assert_header(&self, name: &str, expected: &str) -> &Self {
        match header_str(self, name) {
            Some(actual) => assert_eq!(actual, expected, "{} header of {}", name, self.url()),
            None => panic!("{} header missing from {}", name, self.url()),
        }
        self
    }

    fn assert_no_header(&self, name: &str) -> &Self {
        if let Some(actual) = header_str(self, name) {
            panic!("{} header should be absent from {}, got {:?}", name, self.url(), actual);
        }
        self
    }

    fn assert_content_type(&self, expected: &str) -> &Self {
        self.assert_header("content-type", expected)
    }

    async fn text_for_assertions(self) -> Result<String, Box<dyn std::error::Error>> {
        Ok(self.text().await?)
    }

    async fn bytes_for_assertions(self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.bytes().await?.to_vec())
    }
}
