//! The generic request orchestrator and the caller-owned request entities.
use crate::config::Environment;
use crate::identity::IdentitySource;
use crate::municipality::{MunicipalityDescriptor, Operation};
use crate::response::{self, ResponseResult};
use crate::sign::{embed_signature, SigningError, XmlSigner};
use crate::soap::{build_envelope, EnvelopeSpec, SoapTransport};
use crate::template::{RawTemplate, RenderContext, TemplateEngine, TemplateResolver};
use crate::Error;
use chrono::NaiveDate;
use std::sync::Arc;

/// One provisional receipt of services, drafted by the caller and batched
/// for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Rps {
    pub number: u64,
    pub series: String,
    pub rps_type: u8,
    pub issue_date: Option<NaiveDate>,
    pub service_description: Option<String>,
    pub amount: Option<f64>,
}

impl Rps {
    pub fn new(number: u64, series: impl Into<String>) -> Self {
        Rps {
            number,
            series: series.into(),
            rps_type: 1,
            issue_date: None,
            service_description: None,
            amount: None,
        }
    }
}

/// A numbered batch of RPS drafts. Owned and mutated by the caller before
/// submission; read-only during signing and transmission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpsBatch {
    pub number: u64,
    pub rps: Vec<Rps>,
}

impl RpsBatch {
    pub fn new(number: u64) -> Self {
        RpsBatch {
            number,
            rps: Vec::new(),
        }
    }

    pub fn push(&mut self, rps: Rps) {
        self.rps.push(rps);
    }
}

/// One submission/query request against one municipality.
///
/// Owns its identity cache and mutable state exclusively; independent
/// requests are safe to run from separate threads. The transport call is the
/// only blocking point, and no retry logic lives here.
pub struct ServiceRequest {
    descriptor: Arc<MunicipalityDescriptor>,
    environment: Environment,
    batch: RpsBatch,
    identity: Option<IdentitySource>,
    transport: Box<dyn SoapTransport>,
    templates: TemplateResolver,
    engine: Box<dyn TemplateEngine>,
    reference_uri: String,
}

impl ServiceRequest {
    pub fn new(
        descriptor: Arc<MunicipalityDescriptor>,
        environment: Environment,
        batch: RpsBatch,
        transport: Box<dyn SoapTransport>,
    ) -> Self {
        ServiceRequest {
            descriptor,
            environment,
            batch,
            identity: None,
            transport,
            templates: TemplateResolver::default(),
            engine: Box::new(RawTemplate),
            reference_uri: String::new(),
        }
    }

    pub fn with_identity(mut self, identity: IdentitySource) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_templates(mut self, templates: TemplateResolver) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_engine(mut self, engine: Box<dyn TemplateEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Reference URI of the signature (empty means "whole document").
    pub fn with_reference_uri(mut self, uri: impl Into<String>) -> Self {
        self.reference_uri = uri.into();
        self
    }

    pub fn batch(&self) -> &RpsBatch {
        &self.batch
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Run one operation end to end: render the payload, sign it when the
    /// operation requires a signature, wrap it in the SOAP envelope, hand it
    /// to the transport, and normalize whatever comes back.
    ///
    /// Transport faults are returned as-is; the normalizer only ever sees a
    /// transport-level success body.
    pub fn dispatch(&self, operation: Operation) -> Result<ResponseResult, Error> {
        let config = self.descriptor.operation(operation)?;
        let endpoint = self.descriptor.endpoint(operation, self.environment)?;

        let template = self.templates.load(config.template_name())?;
        let context = RenderContext {
            batch: &self.batch,
            environment: self.environment,
            descriptor: &self.descriptor,
        };
        let mut payload = self.engine.render(&template, &context)?;

        if config.signature_required() {
            let identity = self
                .identity
                .as_ref()
                .and_then(IdentitySource::resolve)
                .ok_or(SigningError::IdentityRequired)?;
            let signer = XmlSigner::new(identity);
            let signing_input = match config.preformat() {
                Some(formatter) => formatter(&payload),
                None => payload.clone(),
            };
            let signature = signer.signature_element(&signing_input, &self.reference_uri)?;
            payload = embed_signature(&payload, &signature)?;
        }

        let envelope = build_envelope(&EnvelopeSpec {
            payload: &payload,
            body_root_tag: config.body_root(),
            namespace_identifier: self.descriptor.namespace_identifier(),
            message_namespaces: config.namespaces(),
            cdata: config.uses_cdata(),
        });

        tracing::debug!(
            municipality = self.descriptor.name(),
            operation = operation.as_str(),
            endpoint,
            "dispatching SOAP request"
        );
        let raw = self
            .transport
            .call(endpoint, config.soap_action_name(), &envelope)?;

        let result = response::normalize(&raw, config.path_spec())?;
        if !result.is_success() {
            tracing::debug!(
                municipality = self.descriptor.name(),
                operation = operation.as_str(),
                errors = result.error_entries().len(),
                "municipality reported failure"
            );
        }
        Ok(result)
    }

    /// Submit the RPS batch ([`Operation::SubmitBatch`]).
    pub fn submit_batch(&self) -> Result<ResponseResult, Error> {
        self.dispatch(Operation::SubmitBatch)
    }

    /// Fetch issued invoices for the batch ([`Operation::QueryBatch`]).
    pub fn query_batch(&self) -> Result<ResponseResult, Error> {
        self.dispatch(Operation::QueryBatch)
    }

    /// Fetch batch processing situation ([`Operation::QueryBatchSituation`]).
    pub fn query_batch_situation(&self) -> Result<ResponseResult, Error> {
        self.dispatch(Operation::QueryBatchSituation)
    }

    /// Fetch the invoice issued for one RPS ([`Operation::QueryNfseByRps`]).
    pub fn query_nfse_by_rps(&self) -> Result<ResponseResult, Error> {
        self.dispatch(Operation::QueryNfseByRps)
    }

    /// Cancel an issued invoice ([`Operation::CancelNfse`]).
    pub fn cancel_nfse(&self) -> Result<ResponseResult, Error> {
        self.dispatch(Operation::CancelNfse)
    }
}

impl std::fmt::Debug for ServiceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRequest")
            .field("municipality", &self.descriptor.name())
            .field("environment", &self.environment)
            .field("batch", &self.batch.number)
            .finish_non_exhaustive()
    }
}
