// src/network.rs
// Listener port selection and the addresses shown to the operator

use local_ip_address::local_ip;
use port_check::is_port_reachable;
use std::net::IpAddr;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// How many ports above the default are tried before giving up.
const PORT_SEARCH_SPAN: u16 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddresses {
    pub local: String,
    pub network: Option<String>,
}

pub struct NetworkUtils;

impl NetworkUtils {
    /// A port nobody answers on is considered free
    pub fn is_port_available(host: &str, port: u16) -> bool {
        !is_port_reachable(format!("{}:{}", probe_host(host), port))
    }

    pub fn find_available_port(host: &str, start_port: u16) -> Option<u16> {
        let end = start_port.saturating_add(PORT_SEARCH_SPAN);
        (start_port..end).find(|&port| Self::is_port_available(host, port))
    }

    pub fn get_network_address() -> Option<IpAddr> {
        local_ip().ok()
    }

    pub fn create_server_addresses(host: &str, port: u16, use_https: bool) -> ServerAddresses {
        let protocol = if use_https { "https" } else { "http" };

        let local = format!("{}://{}:{}", protocol, display_host(host), port);

        // Only a wildcard bind is reachable through the LAN address
        let network = if is_wildcard(host) {
            Self::get_network_address().map(|ip| {
                let formatted_ip = match ip {
                    IpAddr::V6(v6) => format!("[{}]", v6),
                    IpAddr::V4(v4) => v4.to_string(),
                };
                format!("{}://{}:{}", protocol, formatted_ip, port)
            })
        } else {
            None
        };

        ServerAddresses { local, network }
    }

    /// An explicit port must be free; an empty one means the first free port
    /// from `default_start`.
    pub fn resolve_port(host: &str, requested: &str, default_start: u16) -> Result<u16, String> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Self::find_available_port(host, default_start).ok_or_else(|| {
                format!(
                    "No free port found in the range {}-{}.",
                    default_start,
                    default_start.saturating_add(PORT_SEARCH_SPAN - 1)
                )
            });
        }

        let port: u16 = requested
            .parse()
            .map_err(|_| format!("Invalid port {:?}.", requested))?;
        if port != 0 && !Self::is_port_available(host, port) {
            return Err(format!("Port {} is already in use.", port));
        }
        Ok(port)
    }
}

fn is_wildcard(host: &str) -> bool {
    matches!(host, "" | "0.0.0.0" | "::")
}

fn display_host(host: &str) -> &str {
    if is_wildcard(host) {
        "localhost"
    } else {
        host
    }
}

fn probe_host(host: &str) -> &str {
    match host {
        "" | "0.0.0.0" => "127.0.0.1",
        "::" => "[::1]",
        _ => host,
    }
}
