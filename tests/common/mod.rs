//! Common test utilities for dirserve integration tests
//!
//! Every suite spawns the compiled binary on a free port and talks to it
//! over real sockets.

#![allow(dead_code)] // Each suite uses a different subset of the helpers
#![allow(unused_imports)]

pub mod assertions;
pub mod client;
pub mod filesystem;
pub mod network;
pub mod server;
pub mod ssl;

pub use client::TestClient;
pub use filesystem::{FileSystemHelper, TestStructure};
pub use network::NetworkTestHelper;
pub use server::{TestServer, TestServerBuilder};
pub use ssl::SslTestHelper;

pub use serde_json::json;

/// Everything a suite usually needs in one import.
pub mod prelude {
    pub use super::assertions::ResponseAssertions;
    pub use super::client::TestClient;
    pub use super::filesystem::{FileSystemHelper, TestStructure};
    pub use super::network::NetworkTestHelper;
    pub use super::server::{TestServer, TestServerBuilder};
    pub use super::ssl::SslTestHelper;
    pub use reqwest::StatusCode;
    pub use serde_json::json;
}
