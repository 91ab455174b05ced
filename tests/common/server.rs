//! Test server lifecycle: spawn the dirserve binary, wait until it answers,
//! kill it on drop.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use reqwest::Client;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use super::filesystem::{FileSystemHelper, TestStructure};
use super::network::NetworkTestHelper;

/// Global port counter to avoid port conflicts in parallel tests
static PORT_COUNTER: AtomicU16 = AtomicU16::new(18100);

pub struct TestServer {
    pub process: Child,
    pub port: u16,
    pub base_url: String,
    pub https_port: Option<u16>,
    pub https_url: Option<String>,
    /// Working directory of the process, holds `www/` and any config files
    pub temp_dir: TempDir,
    pub server_dir: PathBuf,
}

impl TestServer {
    /// Serve an empty directory with default settings
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        TestServerBuilder::new()?.start().await
    }

    /// Serve [`TestStructure::standard`] with extra command-line arguments
    pub async fn standard(args: &[&str]) -> Result<Self, Box<dyn std::error::Error>> {
        TestServerBuilder::new()?
            .structure(&TestStructure::standard())?
            .args(args)
            .start()
            .await
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        format!("{}{}", self.base_url, path)
    }

    pub fn https_url_for(&self, path: &str) -> String {
        let base = self.https_url.as_deref().unwrap_or(&self.base_url);
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    pub fn stop(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.process.kill()?;
        self.process.wait()?;
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

pub struct TestServerBuilder {
    temp_dir: TempDir,
    server_dir: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    https: bool,
}

impl TestServerBuilder {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let server_dir = temp_dir.path().join("www");
        std::fs::create_dir_all(&server_dir)?;

        Ok(Self {
            temp_dir,
            server_dir,
            args: Vec::new(),
            env: Vec::new(),
            https: false,
        })
    }

    pub fn server_dir(&self) -> &Path {
        &self.server_dir
    }

    pub fn work_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn structure(self, structure: &TestStructure) -> Result<Self, Box<dyn std::error::Error>> {
        FileSystemHelper::create_test_structure(&self.server_dir, structure)?;
        Ok(self)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Also listen for HTTPS on a second free port
    pub fn https(mut self) -> Self {
        self.https = true;
        self
    }

    fn command(&self, port: u16, https_port: Option<u16>) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_dirserve"));
        command
            .current_dir(self.temp_dir.path())
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .args(["--no-request-logging", "--no-timestamps"]);
        if let Some(https_port) = https_port {
            command.args(["--enable-https", "--https-port", &https_port.to_string()]);
        }
        command.args(&self.args);
        command.arg(&self.server_dir);

        // Settings must come from the test, not from the developer's shell
        for (key, _) in std::env::vars() {
            if key.starts_with("DIRSERVE_") {
                command.env_remove(key);
            }
        }
        command.env("DIRSERVE_MODE", "test");
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }

    pub async fn start(self) -> Result<TestServer, Box<dyn std::error::Error>> {
        let port = get_available_port().await?;
        let https_port = if self.https {
            Some(get_available_port().await?)
        } else {
            None
        };

        let process = self
            .command(port, https_port)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let base_url = format!("http://127.0.0.1:{}", port);
        let https_url = https_port.map(|p| format!("https://127.0.0.1:{}", p));

        let mut server = TestServer {
            process,
            port,
            base_url,
            https_port,
            https_url,
            temp_dir: self.temp_dir,
            server_dir: self.server_dir,
        };

        if let Err(e) = wait_for_server_ready(&server.base_url).await {
            let _ = server.stop();
            return Err(e);
        }
        if let Some(url) = server.https_url.clone() {
            if let Err(e) = wait_for_server_ready(&url).await {
                let _ = server.stop();
                return Err(e);
            }
        }
        Ok(server)
    }

    /// Run a server that is expected to refuse to start
    pub async fn expect_exit(self) -> Result<Output, Box<dyn std::error::Error>> {
        let port = get_available_port().await?;
        let mut command = tokio::process::Command::from(self.command(port, None));
        command.kill_on_drop(true);

        let output = timeout(Duration::from_secs(15), command.output())
            .await
            .map_err(|_| "server kept running")??;
        Ok(output)
    }
}

async fn get_available_port() -> Result<u16, Box<dyn std::error::Error>> {
    let start_port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    let port = NetworkTestHelper::get_available_port_from(start_port).await?;
    // Never hand the same port out twice
    PORT_COUNTER.fetch_max(port.saturating_add(1), Ordering::SeqCst);
    Ok(port)
}

/// Poll until the server answers at all; auth or error statuses count as up.
async fn wait_for_server_ready(base_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(5))
        .build()?;
    let max_attempts = 100;
    let delay = Duration::from_millis(100);

    for _ in 0..max_attempts {
        match timeout(Duration::from_secs(5), client.get(base_url).send()).await {
            Ok(Ok(_)) => return Ok(()),
            _ => sleep(delay).await,
        }
    }

    Err(format!("Server at {} did not become ready in time", base_url).into())
}
