//! Throwaway certificates for the HTTPS suites

use std::io::Write;

use rcgen::{Certificate, CertificateParams, PKCS_ECDSA_P256_SHA256};
use tempfile::NamedTempFile;

pub struct SslTestHelper;

impl SslTestHelper {
    /// PEM `(certificate, PKCS#8 key)` valid for localhost and 127.0.0.1
    pub fn generate_test_certificate() -> Result<(String, String), Box<dyn std::error::Error>> {
        let mut params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]);
        params.alg = &PKCS_ECDSA_P256_SHA256;

        let certificate = Certificate::from_params(params)?;
        Ok((
            certificate.serialize_pem()?,
            certificate.serialize_private_key_pem(),
        ))
    }

    /// The pair from [`Self::generate_test_certificate`] as files that
    /// disappear with the returned handles.
    pub fn create_temp_cert_files(
    ) -> Result<(NamedTempFile, NamedTempFile), Box<dyn std::error::Error>> {
        let (cert_pem, key_pem) = Self::generate_test_certificate()?;
        Ok((pem_file(&cert_pem)?, pem_file(&key_pem)?))
    }
}

fn pem_file(contents: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".pem").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}
