//! Ports for spawned servers and bursts of parallel requests

use std::net::SocketAddr;

use futures_util::future::join_all;
use port_scanner::scan_port_addr;
use reqwest::Response;

use super::client::TestClient;

pub struct NetworkTestHelper;

impl NetworkTestHelper {
    /// Nothing accepts connections on `127.0.0.1:port`
    pub async fn is_port_available(port: u16) -> bool {
        !scan_port_addr(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// First free loopback port at or above `start_port`
    pub async fn get_available_port_from(
        start_port: u16,
    ) -> Result<u16, Box<dyn std::error::Error>> {
        let mut port = start_port;
        loop {
            if Self::is_port_available(port).await {
                return Ok(port);
            }
            port = port
                .checked_add(1)
                .ok_or_else(|| format!("no free port at or above {}", start_port))?;
        }
    }

    /// `count` GET requests in flight at the same time, results in order
    pub async fn concurrent_gets(
        url: &str,
        count: usize,
    ) -> Result<Vec<Result<Response, reqwest::Error>>, Box<dyn std::error::Error>> {
        let client = TestClient::new().client;
        let requests = (0..count).map(|_| client.get(url).send());
        Ok(join_all(requests).await)
    }
}
