//! Signing identity derived from a PKCS#12 container.
use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::{X509, X509Ref};
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors emitted while deriving an identity from a PKCS#12 container.
///
/// Callers that do not require signing should not treat these as fatal:
/// [`IdentitySource::resolve`] degrades them to an absent identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read PKCS#12 container at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed PKCS#12 container or wrong password")]
    Container(#[source] ErrorStack),
    #[error("PKCS#12 container holds no private key")]
    MissingKey,
    #[error("PKCS#12 container holds no certificate")]
    MissingCertificate,
}

/// A resolved signing identity: an X.509 certificate and its private key.
pub struct Identity {
    certificate: X509,
    key: PKey<Private>,
}

impl Identity {
    /// Parse a DER-encoded PKCS#12 container with the given password.
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Identity, IdentityError> {
        let container = Pkcs12::from_der(der).map_err(IdentityError::Container)?;
        let parsed = container
            .parse2(password)
            .map_err(IdentityError::Container)?;
        let key = parsed.pkey.ok_or(IdentityError::MissingKey)?;
        let certificate = parsed.cert.ok_or(IdentityError::MissingCertificate)?;
        Ok(Identity { certificate, key })
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn key(&self) -> &PKeyRef<Private> {
        &self.key
    }

    /// Certificate body as one base64 line: the PEM encoding with the
    /// BEGIN/END armor and all newlines stripped, as embedded in
    /// `KeyInfo/X509Data/X509Certificate`.
    pub fn certificate_base64(&self) -> Result<String, ErrorStack> {
        let pem = self.certificate.to_pem()?;
        let pem = String::from_utf8_lossy(&pem);
        Ok(pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.certificate.subject_name())
            .finish_non_exhaustive()
    }
}

/// Raw PKCS#12 material plus its password, resolved at most once.
///
/// Resolution failure (bad password, malformed container, unreadable file)
/// yields an absent identity rather than an error, so operations that do not
/// sign are unaffected. Signing-mandatory operations must check the resolved
/// value and fail loudly when it is absent.
pub struct IdentitySource {
    der: Option<Vec<u8>>,
    path: Option<PathBuf>,
    password: String,
    resolved: OnceLock<Option<Identity>>,
}

impl IdentitySource {
    /// Identity material held in memory.
    pub fn from_der(der: impl Into<Vec<u8>>, password: impl Into<String>) -> Self {
        IdentitySource {
            der: Some(der.into()),
            path: None,
            password: password.into(),
            resolved: OnceLock::new(),
        }
    }

    /// Identity material read lazily from a file.
    pub fn from_file(path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        IdentitySource {
            der: None,
            path: Some(path.into()),
            password: password.into(),
            resolved: OnceLock::new(),
        }
    }

    /// Resolve the identity, computing it on first access and caching the
    /// outcome for the lifetime of this source.
    pub fn resolve(&self) -> Option<&Identity> {
        self.resolved
            .get_or_init(|| match self.derive() {
                Ok(identity) => Some(identity),
                Err(err) => {
                    tracing::warn!(error = %err, "identity resolution failed");
                    None
                }
            })
            .as_ref()
    }

    fn derive(&self) -> Result<Identity, IdentityError> {
        let der = match (&self.der, &self.path) {
            (Some(der), _) => der.clone(),
            (None, Some(path)) => std::fs::read(path).map_err(|source| IdentityError::Io {
                path: path.clone(),
                source,
            })?,
            (None, None) => return Err(IdentityError::MissingKey),
        };
        Identity::from_pkcs12(&der, &self.password)
    }
}

impl std::fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySource")
            .field("path", &self.path)
            .field("resolved", &self.resolved.get().map(Option::is_some))
            .finish_non_exhaustive()
    }
}
