//! Municipality descriptors: the configuration-driven replacement for
//! per-city service hierarchies.
//!
//! A municipality is described by data — endpoints, SOAP action names,
//! namespaces, templates, and path tables — and one generic orchestrator
//! ([`crate::service::ServiceRequest`]) is parameterized by it. Adding a
//! municipality means registering a descriptor, not writing code.
use crate::config::{ConfigError, Environment};
use crate::paths::PathSpec;
use std::collections::HashMap;
use std::sync::Arc;

/// The generic operations a municipal NFS-e service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Submit a batch of RPS drafts for processing.
    SubmitBatch,
    /// Fetch the invoices issued for a previously submitted batch.
    QueryBatch,
    /// Fetch the processing situation of a batch.
    QueryBatchSituation,
    /// Fetch the invoice issued for one RPS.
    QueryNfseByRps,
    /// Cancel an issued invoice.
    CancelNfse,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SubmitBatch => "submit_batch",
            Operation::QueryBatch => "query_batch",
            Operation::QueryBatchSituation => "query_batch_situation",
            Operation::QueryNfseByRps => "query_nfse_by_rps",
            Operation::CancelNfse => "cancel_nfse",
        }
    }
}

/// Municipal API version. Cities migrate between versions independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    V1,
    V2,
}

/// Hook applied to the rendered payload before it is digested, for the few
/// providers that sign a reshaped document.
pub type PayloadFormatter = fn(&str) -> String;

/// Per-operation wire configuration.
#[derive(Clone)]
pub struct OperationConfig {
    soap_action: String,
    template: String,
    endpoints: HashMap<Environment, String>,
    body_root_tag: Option<String>,
    message_namespaces: Vec<(String, String)>,
    requires_signature: bool,
    cdata_payload: bool,
    signature_preformat: Option<PayloadFormatter>,
    paths: PathSpec,
}

impl OperationConfig {
    pub fn new(soap_action: impl Into<String>, template: impl Into<String>) -> Self {
        OperationConfig {
            soap_action: soap_action.into(),
            template: template.into(),
            endpoints: HashMap::new(),
            body_root_tag: None,
            message_namespaces: Vec::new(),
            requires_signature: false,
            cdata_payload: false,
            signature_preformat: None,
            paths: PathSpec::default(),
        }
    }

    pub fn endpoint(mut self, environment: Environment, url: impl Into<String>) -> Self {
        self.endpoints.insert(environment, url.into());
        self
    }

    /// Namespace-qualified root tag wrapped around the payload inside the
    /// SOAP body (e.g. `recepcionarLoteRps`). Without it the payload goes
    /// into the body bare.
    pub fn body_root_tag(mut self, tag: impl Into<String>) -> Self {
        self.body_root_tag = Some(tag.into());
        self
    }

    pub fn message_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.message_namespaces.push((prefix.into(), uri.into()));
        self
    }

    pub fn requires_signature(mut self, required: bool) -> Self {
        self.requires_signature = required;
        self
    }

    /// Wrap the payload in a CDATA section inside the SOAP body.
    pub fn cdata_payload(mut self, cdata: bool) -> Self {
        self.cdata_payload = cdata;
        self
    }

    pub fn signature_preformat(mut self, formatter: PayloadFormatter) -> Self {
        self.signature_preformat = Some(formatter);
        self
    }

    pub fn paths(mut self, paths: PathSpec) -> Self {
        self.paths = paths;
        self
    }
}

// Read accessors, used by the orchestrator.
impl OperationConfig {
    pub fn soap_action_name(&self) -> &str {
        &self.soap_action
    }

    pub fn template_name(&self) -> &str {
        &self.template
    }

    pub fn endpoint_for(&self, environment: Environment) -> Option<&str> {
        self.endpoints.get(&environment).map(String::as_str)
    }

    pub fn body_root(&self) -> Option<&str> {
        self.body_root_tag.as_deref()
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.message_namespaces
    }

    pub fn signature_required(&self) -> bool {
        self.requires_signature
    }

    pub fn uses_cdata(&self) -> bool {
        self.cdata_payload
    }

    pub fn preformat(&self) -> Option<PayloadFormatter> {
        self.signature_preformat
    }

    pub fn path_spec(&self) -> &PathSpec {
        &self.paths
    }
}

impl std::fmt::Debug for OperationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationConfig")
            .field("soap_action", &self.soap_action)
            .field("template", &self.template)
            .field("endpoints", &self.endpoints)
            .field("requires_signature", &self.requires_signature)
            .finish_non_exhaustive()
    }
}

/// Everything the orchestrator needs to know about one municipality.
#[derive(Debug, Clone)]
pub struct MunicipalityDescriptor {
    name: String,
    ibge_code: String,
    version: ApiVersion,
    namespace_identifier: Option<String>,
    operations: HashMap<Operation, OperationConfig>,
}

impl MunicipalityDescriptor {
    pub fn builder(
        name: impl Into<String>,
        ibge_code: impl Into<String>,
        version: ApiVersion,
    ) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            ibge_code: ibge_code.into(),
            version,
            namespace_identifier: None,
            operations: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ibge_code(&self) -> &str {
        &self.ibge_code
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    /// Prefix applied to the body root tag, matching one of the message
    /// namespace prefixes.
    pub fn namespace_identifier(&self) -> Option<&str> {
        self.namespace_identifier.as_deref()
    }

    pub fn operation(&self, operation: Operation) -> Result<&OperationConfig, ConfigError> {
        self.operations
            .get(&operation)
            .ok_or_else(|| ConfigError::UnknownOperation {
                municipality: self.name.clone(),
                operation: operation.as_str(),
            })
    }

    pub fn endpoint(
        &self,
        operation: Operation,
        environment: Environment,
    ) -> Result<&str, ConfigError> {
        self.operation(operation)?
            .endpoint_for(environment)
            .ok_or(ConfigError::MissingEndpoint {
                environment: environment.as_str(),
                operation: operation.as_str(),
            })
    }
}

/// Builder with construction-time validation: a registered operation missing
/// its SOAP action, an endpoint, or a template is a configuration error
/// here, not a dispatch failure later.
pub struct DescriptorBuilder {
    name: String,
    ibge_code: String,
    version: ApiVersion,
    namespace_identifier: Option<String>,
    operations: HashMap<Operation, OperationConfig>,
}

impl DescriptorBuilder {
    pub fn namespace_identifier(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_identifier = Some(prefix.into());
        self
    }

    pub fn operation(mut self, operation: Operation, config: OperationConfig) -> Self {
        self.operations.insert(operation, config);
        self
    }

    pub fn build(self) -> Result<MunicipalityDescriptor, ConfigError> {
        for (operation, config) in &self.operations {
            if config.soap_action.trim().is_empty() {
                return Err(ConfigError::MissingOperationName {
                    operation: operation.as_str(),
                });
            }
            if config.template.trim().is_empty() {
                return Err(ConfigError::MissingTemplate {
                    operation: operation.as_str(),
                });
            }
            if config.endpoints.is_empty() {
                return Err(ConfigError::MissingEndpoint {
                    environment: "any",
                    operation: operation.as_str(),
                });
            }
        }
        Ok(MunicipalityDescriptor {
            name: self.name,
            ibge_code: self.ibge_code,
            version: self.version,
            namespace_identifier: self.namespace_identifier,
            operations: self.operations,
        })
    }
}

/// Read-only descriptor registry keyed by IBGE code. Populated at startup,
/// never mutated afterwards, safe for concurrent reads.
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: HashMap<String, Arc<MunicipalityDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&mut self, descriptor: MunicipalityDescriptor) {
        self.descriptors
            .insert(descriptor.ibge_code.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, ibge_code: &str) -> Option<Arc<MunicipalityDescriptor>> {
        self.descriptors.get(ibge_code).cloned()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::abrasf_v1;

    fn submit_config() -> OperationConfig {
        OperationConfig::new("RecepcionarLoteRps", "servico_enviar_lote_rps_envio")
            .endpoint(Environment::Production, "https://nfse.example.gov.br/ws")
            .paths(abrasf_v1::submit_batch())
    }

    #[test]
    fn builder_accepts_complete_operation() {
        let descriptor =
            MunicipalityDescriptor::builder("Example", "4205902", ApiVersion::V1)
                .operation(Operation::SubmitBatch, submit_config())
                .build()
                .expect("valid descriptor");
        assert_eq!(descriptor.ibge_code(), "4205902");
        assert!(descriptor.operation(Operation::SubmitBatch).is_ok());
    }

    #[test]
    fn builder_rejects_missing_soap_action() {
        let result = MunicipalityDescriptor::builder("Example", "1", ApiVersion::V1)
            .operation(
                Operation::SubmitBatch,
                OperationConfig::new("", "template")
                    .endpoint(Environment::Production, "https://x"),
            )
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::MissingOperationName { .. })
        ));
    }

    #[test]
    fn builder_rejects_missing_endpoint() {
        let result = MunicipalityDescriptor::builder("Example", "1", ApiVersion::V1)
            .operation(
                Operation::SubmitBatch,
                OperationConfig::new("RecepcionarLoteRps", "template"),
            )
            .build();
        assert!(matches!(result, Err(ConfigError::MissingEndpoint { .. })));
    }

    #[test]
    fn builder_rejects_missing_template() {
        let result = MunicipalityDescriptor::builder("Example", "1", ApiVersion::V1)
            .operation(
                Operation::SubmitBatch,
                OperationConfig::new("RecepcionarLoteRps", " ")
                    .endpoint(Environment::Production, "https://x"),
            )
            .build();
        assert!(matches!(result, Err(ConfigError::MissingTemplate { .. })));
    }

    #[test]
    fn unregistered_operation_is_a_config_error() {
        let descriptor =
            MunicipalityDescriptor::builder("Example", "4205902", ApiVersion::V1)
                .operation(Operation::SubmitBatch, submit_config())
                .build()
                .expect("valid descriptor");
        assert!(matches!(
            descriptor.operation(Operation::CancelNfse),
            Err(ConfigError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn endpoint_selection_respects_environment() {
        let descriptor = MunicipalityDescriptor::builder("Example", "1", ApiVersion::V1)
            .operation(
                Operation::SubmitBatch,
                submit_config().endpoint(Environment::Sandbox, "https://hml.example.gov.br/ws"),
            )
            .build()
            .expect("valid descriptor");
        assert_eq!(
            descriptor
                .endpoint(Operation::SubmitBatch, Environment::Sandbox)
                .expect("sandbox endpoint"),
            "https://hml.example.gov.br/ws"
        );
    }

    #[test]
    fn registry_lookup_by_ibge_code() {
        let mut registry = Registry::new();
        registry.register(
            MunicipalityDescriptor::builder("Example", "4205902", ApiVersion::V1)
                .operation(Operation::SubmitBatch, submit_config())
                .build()
                .expect("valid descriptor"),
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get("4205902").is_some());
        assert!(registry.get("0000000").is_none());
    }
}
