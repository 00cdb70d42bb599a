//! TLS credentials for exporter transports.
//!
//! Credentials arrive base64-encoded (they usually come from environment
//! variables or secret mounts). Each artifact is decoded and parsed on its
//! own so that errors name the one that is broken.

use crate::config::ExporterConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Certificate, ClientBuilder, Identity};
use std::fmt;
use thiserror::Error;

/// A piece of TLS material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialArtifact {
    Certificate,
    Key,
    Ca,
    KeyPair,
}

impl fmt::Display for CredentialArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Certificate => "client certificate",
            Self::Key => "client key",
            Self::Ca => "CA certificate",
            Self::KeyPair => "certificate/key pair",
        })
    }
}

/// Malformed TLS material.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Not valid base64.
    #[error("failed to decode TLS {artifact}: {source}")]
    Decode {
        artifact: CredentialArtifact,
        #[source]
        source: base64::DecodeError,
    },

    /// Decoded, but not usable PEM.
    #[error("failed to parse TLS {artifact}: {reason}")]
    Parse {
        artifact: CredentialArtifact,
        reason: String,
    },

    /// Half of a client identity is configured.
    #[error("TLS {missing} is required when a {present} is configured")]
    Missing {
        missing: CredentialArtifact,
        present: CredentialArtifact,
    },

    /// Certificate and key could not be combined into an identity.
    #[error("failed to load TLS certificate/key pair: {0}")]
    KeyPair(String),
}

impl CredentialError {
    /// The artifact at fault.
    pub fn artifact(&self) -> CredentialArtifact {
        match self {
            Self::Decode { artifact, .. } | Self::Parse { artifact, .. } => *artifact,
            Self::Missing { missing, .. } => *missing,
            Self::KeyPair(_) => CredentialArtifact::KeyPair,
        }
    }
}

/// Parsed TLS material ready to be applied to an HTTP client.
#[derive(Clone)]
pub struct TlsMaterial {
    /// Client certificate chain followed by its private key, PEM-encoded.
    identity_pem: Option<Vec<u8>>,
    /// DER-encoded CA certificates.
    roots: Vec<Vec<u8>>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("identity", &self.identity_pem.is_some())
            .field("roots", &self.roots.len())
            .finish()
    }
}

impl TlsMaterial {
    /// Decode and parse the TLS material of a config.
    ///
    /// Returns `None` when no material is configured (system roots apply).
    /// A CA on its own is valid: server authentication without a client
    /// identity. Half an identity (a certificate without its key, or a key
    /// without its certificate) is rejected with [`CredentialError::Missing`]
    /// rather than silently dropped. A key that does not belong to the
    /// certificate is rejected with [`CredentialError::KeyPair`].
    pub fn from_config(config: &ExporterConfig) -> Result<Option<Self>, CredentialError> {
        if !config.has_tls_material() {
            return Ok(None);
        }

        let cert = config
            .tls_cert()
            .map(|v| decode(CredentialArtifact::Certificate, v))
            .transpose()?;
        let key = config
            .tls_key()
            .map(|v| decode(CredentialArtifact::Key, v))
            .transpose()?;
        let ca = config
            .tls_ca()
            .map(|v| decode(CredentialArtifact::Ca, v))
            .transpose()?;

        let identity_pem = match (cert, key) {
            (Some(cert), Some(key)) => Some(identity_pem(&cert, &key)?),
            (Some(_), None) => {
                return Err(CredentialError::Missing {
                    missing: CredentialArtifact::Key,
                    present: CredentialArtifact::Certificate,
                })
            }
            (None, Some(_)) => {
                return Err(CredentialError::Missing {
                    missing: CredentialArtifact::Certificate,
                    present: CredentialArtifact::Key,
                })
            }
            (None, None) => None,
        };

        let roots = match ca {
            Some(ca) => parse_certs(CredentialArtifact::Ca, &ca)?,
            None => Vec::new(),
        };

        Ok(Some(Self {
            identity_pem,
            roots,
        }))
    }

    /// Whether a client identity (mTLS) is configured.
    pub fn has_identity(&self) -> bool {
        self.identity_pem.is_some()
    }

    /// Number of CA certificates.
    pub fn ca_count(&self) -> usize {
        self.roots.len()
    }

    /// Apply the material to an HTTP client builder.
    ///
    /// A configured CA replaces the built-in roots.
    pub fn apply(&self, mut builder: ClientBuilder) -> Result<ClientBuilder, CredentialError> {
        if let Some(pem) = &self.identity_pem {
            let identity =
                Identity::from_pem(pem).map_err(|e| CredentialError::KeyPair(e.to_string()))?;
            builder = builder.identity(identity);
        }

        if !self.roots.is_empty() {
            builder = builder.tls_built_in_root_certs(false);
            for der in &self.roots {
                let cert = Certificate::from_der(der).map_err(|e| CredentialError::Parse {
                    artifact: CredentialArtifact::Ca,
                    reason: e.to_string(),
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(builder)
    }
}

fn decode(artifact: CredentialArtifact, value: &str) -> Result<Vec<u8>, CredentialError> {
    // Secrets are often wrapped or indented when mounted.
    let compact: String = value.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .map_err(|source| CredentialError::Decode { artifact, source })
}

fn parse_certs(artifact: CredentialArtifact, pem: &[u8]) -> Result<Vec<Vec<u8>>, CredentialError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .map(|cert| cert.map(|der| der.as_ref().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CredentialError::Parse {
            artifact,
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(CredentialError::Parse {
            artifact,
            reason: "no PEM certificate found".to_string(),
        });
    }
    Ok(certs)
}

fn identity_pem(cert: &[u8], key: &[u8]) -> Result<Vec<u8>, CredentialError> {
    parse_certs(CredentialArtifact::Certificate, cert)?;

    match rustls_pemfile::private_key(&mut &key[..]) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(CredentialError::Parse {
                artifact: CredentialArtifact::Key,
                reason: "no PEM private key found".to_string(),
            })
        }
        Err(e) => {
            return Err(CredentialError::Parse {
                artifact: CredentialArtifact::Key,
                reason: e.to_string(),
            })
        }
    }

    let mut pem = cert.to_vec();
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend_from_slice(key);
    verify_pair(&pem)?;
    Ok(pem)
}

/// `Identity::from_pem` only parses; rustls checks that the key matches
/// the leaf certificate when a client config is built from it.
fn verify_pair(pem: &[u8]) -> Result<(), CredentialError> {
    let identity =
        Identity::from_pem(pem).map_err(|e| CredentialError::KeyPair(e.to_string()))?;
    reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .identity(identity)
        .build()
        .map(drop)
        .map_err(|e| CredentialError::KeyPair(error_chain(&e)))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pem {
        cert: String,
        key: String,
    }

    fn self_signed() -> Pem {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["collector.local".to_string()]).unwrap();
        Pem {
            cert: STANDARD.encode(cert.pem()),
            key: STANDARD.encode(key_pair.serialize_pem()),
        }
    }

    fn config() -> ExporterConfig {
        ExporterConfig::new("orders").with_endpoint("collector.local:4318")
    }

    #[test]
    fn test_no_material_is_none() {
        assert!(TlsMaterial::from_config(&config()).unwrap().is_none());
    }

    #[test]
    fn test_client_identity_and_ca() {
        let pem = self_signed();
        let config = config()
            .with_client_identity(pem.cert.clone(), pem.key)
            .with_ca(pem.cert);

        let material = TlsMaterial::from_config(&config).unwrap().unwrap();
        assert!(material.has_identity());
        assert_eq!(material.ca_count(), 1);
        assert!(material.apply(reqwest::Client::builder()).is_ok());
    }

    #[test]
    fn test_ca_only_is_valid() {
        let pem = self_signed();
        let material = TlsMaterial::from_config(&config().with_ca(pem.cert))
            .unwrap()
            .unwrap();
        assert!(!material.has_identity());
        assert_eq!(material.ca_count(), 1);
    }

    #[test]
    fn test_wrapped_base64_is_accepted() {
        let pem = self_signed();
        let wrapped: String = pem
            .cert
            .as_bytes()
            .chunks(64)
            .map(|chunk| format!("{}\n", String::from_utf8_lossy(chunk)))
            .collect();
        assert!(TlsMaterial::from_config(&config().with_ca(wrapped)).is_ok());
    }

    #[test]
    fn test_invalid_base64_certificate_names_the_certificate() {
        let pem = self_signed();
        let err = TlsMaterial::from_config(&config().with_client_identity("not base64!", pem.key))
            .unwrap_err();

        assert_eq!(err.artifact(), CredentialArtifact::Certificate);
        let msg = err.to_string();
        assert!(msg.contains("certificate"), "{msg}");
        assert!(!msg.contains("key"), "{msg}");
        assert!(!msg.contains("CA"), "{msg}");
    }

    #[test]
    fn test_invalid_base64_key_names_the_key() {
        let pem = self_signed();
        let err = TlsMaterial::from_config(&config().with_client_identity(pem.cert, "%%%"))
            .unwrap_err();

        assert_eq!(err.artifact(), CredentialArtifact::Key);
        let msg = err.to_string();
        assert!(msg.contains("key"), "{msg}");
        assert!(!msg.contains("certificate"), "{msg}");
    }

    #[test]
    fn test_invalid_base64_ca_names_the_ca() {
        let err = TlsMaterial::from_config(&config().with_ca("***")).unwrap_err();

        assert_eq!(err.artifact(), CredentialArtifact::Ca);
        let msg = err.to_string();
        assert!(msg.contains("CA"), "{msg}");
        assert!(!msg.contains("key"), "{msg}");
    }

    #[test]
    fn test_base64_that_is_not_pem_fails_to_parse() {
        let garbage = STANDARD.encode("definitely not a certificate");
        let err = TlsMaterial::from_config(&config().with_ca(garbage)).unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Parse {
                artifact: CredentialArtifact::Ca,
                ..
            }
        ));
    }

    #[test]
    fn test_certificate_in_key_slot_fails_to_parse_key() {
        let pem = self_signed();
        let err = TlsMaterial::from_config(&config().with_client_identity(pem.cert.clone(), pem.cert))
            .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Parse {
                artifact: CredentialArtifact::Key,
                ..
            }
        ));
    }

    #[test]
    fn test_mismatched_certificate_and_key_name_the_pair() {
        let a = self_signed();
        let b = self_signed();
        let err = TlsMaterial::from_config(&config().with_client_identity(a.cert, b.key))
            .unwrap_err();

        assert_eq!(err.artifact(), CredentialArtifact::KeyPair);
        assert!(matches!(err, CredentialError::KeyPair(_)));
        assert!(err.to_string().contains("certificate/key pair"), "{err}");
    }

    #[test]
    fn test_half_an_identity_is_rejected() {
        let pem = self_signed();

        let mut cert_only = config();
        cert_only.tls_cert = Some(pem.cert);
        let err = TlsMaterial::from_config(&cert_only).unwrap_err();
        assert_eq!(err.artifact(), CredentialArtifact::Key);

        let mut key_only = config();
        key_only.tls_key = Some(pem.key);
        let err = TlsMaterial::from_config(&key_only).unwrap_err();
        assert_eq!(err.artifact(), CredentialArtifact::Certificate);
    }
}
