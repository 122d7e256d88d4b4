//! Core toolkit for issuing and consulting Brazilian municipal electronic
//! service invoices (NFS-e): XML-DSig signing, SOAP envelope assembly, and
//! normalization of the incompatible response dialects municipal web
//! services speak.
//!
//! # Examples
//! ```rust
//! use nfse_core::municipality::{ApiVersion, MunicipalityDescriptor, Operation, OperationConfig};
//! use nfse_core::config::Environment;
//! use nfse_core::paths::abrasf_v1;
//!
//! let descriptor = MunicipalityDescriptor::builder("Gaspar", "4205902", ApiVersion::V1)
//!     .operation(
//!         Operation::SubmitBatch,
//!         OperationConfig::new("recepcionarLoteRps", "servico_enviar_lote_rps_envio")
//!             .endpoint(Environment::Production, "https://nfse.gaspar.sc.gov.br/nfse/services/NFSEremessa")
//!             .requires_signature(true)
//!             .paths(abrasf_v1::submit_batch()),
//!     )
//!     .build()?;
//! # let _ = descriptor;
//! # Ok::<(), nfse_core::config::ConfigError>(())
//! ```
pub mod config;
pub mod identity;
pub mod municipality;
pub mod paths;
pub mod response;
pub mod service;
pub mod sign;
pub mod soap;
pub mod template;

use thiserror::Error;

/// Top-level error wrapper for core operations.
///
/// The variants are the four error categories callers are expected to match
/// on: configuration problems (fatal before any network activity), identity
/// and signing preconditions, transport faults (surfaced verbatim, retry is
/// the caller's decision), and normalization failures. A business-level
/// failure response is *not* an error; it arrives as a
/// [`response::ResponseResult`] with failure status.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Identity(#[from] identity::IdentityError),
    #[error(transparent)]
    Signing(#[from] sign::SigningError),
    #[error(transparent)]
    Transport(#[from] soap::TransportError),
    #[error(transparent)]
    Normalize(#[from] response::NormalizeError),
}
