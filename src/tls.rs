// src/tls.rs
// Certificate acquisition for the HTTPS listener: PEM files or a generated self-signed pair

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub enum TlsError {
    IoError(io::Error),
    InvalidCertificate(String),
    InvalidPrivateKey(String),
    MissingPrivateKey,
    ConfigError(String),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::IoError(e) => write!(f, "IO error: {}", e),
            TlsError::InvalidCertificate(msg) => write!(f, "Invalid certificate: {}", msg),
            TlsError::InvalidPrivateKey(msg) => write!(f, "Invalid private key: {}", msg),
            TlsError::MissingPrivateKey => {
                write!(f, "Both httpscertfile and httpskeyfile are required")
            }
            TlsError::ConfigError(msg) => write!(f, "TLS configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<io::Error> for TlsError {
    fn from(err: io::Error) -> Self {
        TlsError::IoError(err)
    }
}

impl From<rustls::Error> for TlsError {
    fn from(err: rustls::Error) -> Self {
        TlsError::ConfigError(format!("Rustls error: {}", err))
    }
}

/// Where the listener's certificate comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertSource {
    Pem { cert_path: PathBuf, key_path: PathBuf },
    /// Generated at startup for these subject names
    SelfSigned { names: Vec<String> },
}

impl CertSource {
    /// PEM files when both are given, a self-signed certificate when neither is.
    pub fn from_settings(cert_file: &str, key_file: &str, host: &str) -> Result<Self, TlsError> {
        match (cert_file.is_empty(), key_file.is_empty()) {
            (false, false) => Ok(CertSource::Pem {
                cert_path: PathBuf::from(cert_file),
                key_path: PathBuf::from(key_file),
            }),
            (true, true) => {
                let mut names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
                let host = host.trim();
                if !host.is_empty() && host != "0.0.0.0" && !names.iter().any(|n| n == host) {
                    names.push(host.to_string());
                }
                Ok(CertSource::SelfSigned { names })
            }
            _ => Err(TlsError::MissingPrivateKey),
        }
    }

    pub fn is_self_signed(&self) -> bool {
        matches!(self, CertSource::SelfSigned { .. })
    }

    pub fn load_server_config(&self) -> Result<ServerConfig, TlsError> {
        let (chain, key) = match self {
            CertSource::Pem {
                cert_path,
                key_path,
            } => (load_certs(cert_path)?, load_private_key(key_path)?),
            CertSource::SelfSigned { names } => self_signed(names)?,
        };
        server_config(chain, key)
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    let chain = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::InvalidCertificate(format!("Failed to parse certificates: {}", e)))?;

    if chain.is_empty() {
        return Err(TlsError::InvalidCertificate(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(chain)
}

/// First PKCS#8, PKCS#1 or SEC1 key in the file.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::InvalidPrivateKey(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| {
            TlsError::InvalidPrivateKey(format!("No private key found in {}", path.display()))
        })
}

fn self_signed(
    names: &[String],
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let cert = rcgen::generate_simple_self_signed(names.to_vec())
        .map_err(|e| TlsError::ConfigError(format!("Failed to generate certificate: {}", e)))?;
    let der = cert
        .serialize_der()
        .map_err(|e| TlsError::InvalidCertificate(e.to_string()))?;
    let key = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());

    Ok((vec![CertificateDer::from(der)], PrivateKeyDer::Pkcs8(key)))
}

fn server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_source_from_settings() {
        let pem = CertSource::from_settings("cert.pem", "key.pem", "").unwrap();
        assert_eq!(
            pem,
            CertSource::Pem {
                cert_path: PathBuf::from("cert.pem"),
                key_path: PathBuf::from("key.pem"),
            }
        );
        assert!(!pem.is_self_signed());

        let generated = CertSource::from_settings("", "", "files.lan").unwrap();
        assert_eq!(
            generated,
            CertSource::SelfSigned {
                names: vec![
                    "localhost".to_string(),
                    "127.0.0.1".to_string(),
                    "files.lan".to_string()
                ]
            }
        );

        let wildcard = CertSource::from_settings("", "", "0.0.0.0").unwrap();
        assert_eq!(
            wildcard,
            CertSource::SelfSigned {
                names: vec!["localhost".to_string(), "127.0.0.1".to_string()]
            }
        );
    }

    #[test]
    fn test_half_configured_pair_is_rejected() {
        assert!(matches!(
            CertSource::from_settings("cert.pem", "", ""),
            Err(TlsError::MissingPrivateKey)
        ));
        assert!(matches!(
            CertSource::from_settings("", "key.pem", ""),
            Err(TlsError::MissingPrivateKey)
        ));
    }

    #[test]
    fn test_self_signed_config() {
        let source = CertSource::from_settings("", "", "").unwrap();
        assert!(source.load_server_config().is_ok());
    }

    #[test]
    fn test_pem_files_round_trip() {
        let dir = TempDir::new().unwrap();
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        fs::write(&cert_path, cert.serialize_pem().unwrap()).unwrap();
        fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();

        let source = CertSource::Pem {
            cert_path,
            key_path,
        };
        assert!(source.load_server_config().is_ok());
    }

    #[test]
    fn test_garbage_files_are_reported() {
        let dir = TempDir::new().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        fs::write(&cert_path, "not a certificate").unwrap();
        fs::write(&key_path, "not a key").unwrap();

        let source = CertSource::Pem {
            cert_path: cert_path.clone(),
            key_path: key_path.clone(),
        };
        assert!(matches!(
            source.load_server_config(),
            Err(TlsError::InvalidCertificate(_))
        ));

        let missing = CertSource::Pem {
            cert_path: dir.path().join("absent.pem"),
            key_path,
        };
        assert!(matches!(missing.load_server_config(), Err(TlsError::IoError(_))));
    }
}
