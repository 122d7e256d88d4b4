//! Declarative field-to-XML-path mappings for municipal responses.
//!
//! Municipalities agree on roughly the same data but not on where it lives in
//! the response tree. A [`PathSpec`] maps each logical field to the descent
//! path used by one (municipality, version, operation) triple; the normalizer
//! walks the raw XML with it. Path tables are declared once and are read-only
//! afterwards.
use std::collections::HashMap;

/// Logical fields a normalized response can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseField {
    /// Protocol number assigned by the municipality on batch receipt.
    Protocol,
    /// Timestamp at which the batch was received.
    ReceiptTime,
    /// Echoed RPS batch number.
    BatchNumber,
    /// Numeric processing situation of a batch (query-situation operations).
    Situation,
    /// Timestamp of a confirmed cancellation.
    CancellationTime,
    /// Repeated invoice records.
    Invoices,
    /// Repeated error entries.
    ErrorEntries,
}

impl ResponseField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseField::Protocol => "protocol",
            ResponseField::ReceiptTime => "receipt_time",
            ResponseField::BatchNumber => "batch_number",
            ResponseField::Situation => "situation",
            ResponseField::CancellationTime => "cancellation_time",
            ResponseField::Invoices => "invoices",
            ResponseField::ErrorEntries => "error_entries",
        }
    }
}

/// Paths into one repeated invoice record.
///
/// `list` descends to the repeating parent, `item` names the repeated child
/// element, and the remaining paths are relative to each item.
#[derive(Debug, Clone)]
pub struct InvoicePaths {
    pub list: Vec<String>,
    pub item: String,
    pub number: Vec<String>,
    pub verification_code: Vec<String>,
    pub issue_time: Vec<String>,
    pub other_info: Vec<String>,
}

/// Paths into one repeated error entry, relative to each `item`.
#[derive(Debug, Clone)]
pub struct ErrorPaths {
    pub list: Vec<String>,
    pub item: String,
    pub code: Vec<String>,
    pub message: Vec<String>,
    pub solution: Vec<String>,
}

/// Field-to-path table for one (municipality, version, operation) triple.
#[derive(Debug, Clone, Default)]
pub struct PathSpec {
    scalars: HashMap<ResponseField, Vec<String>>,
    invoices: Option<InvoicePaths>,
    errors: Option<ErrorPaths>,
    mandatory_success: Vec<ResponseField>,
}

impl PathSpec {
    pub fn builder() -> PathSpecBuilder {
        PathSpecBuilder {
            spec: PathSpec::default(),
        }
    }

    /// Resolve a scalar field to its descent path. Undeclared fields resolve
    /// to `None`; that is "not applicable", never an error.
    pub fn resolve(&self, field: ResponseField) -> Option<&[String]> {
        self.scalars.get(&field).map(Vec::as_slice)
    }

    pub fn invoices(&self) -> Option<&InvoicePaths> {
        self.invoices.as_ref()
    }

    pub fn errors(&self) -> Option<&ErrorPaths> {
        self.errors.as_ref()
    }

    /// Fields that must be present for the response to classify as success.
    pub fn mandatory_success_fields(&self) -> &[ResponseField] {
        &self.mandatory_success
    }
}

pub struct PathSpecBuilder {
    spec: PathSpec,
}

impl PathSpecBuilder {
    pub fn scalar(mut self, field: ResponseField, path: &[&str]) -> Self {
        self.spec.scalars.insert(field, owned(path));
        self
    }

    pub fn invoices(mut self, paths: InvoicePaths) -> Self {
        self.spec.invoices = Some(paths);
        self
    }

    pub fn errors(mut self, paths: ErrorPaths) -> Self {
        self.spec.errors = Some(paths);
        self
    }

    pub fn mandatory_success(mut self, fields: &[ResponseField]) -> Self {
        self.spec.mandatory_success = fields.to_vec();
        self
    }

    pub fn build(self) -> PathSpec {
        self.spec
    }
}

fn owned(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

/// Path tables for the ABRASF v1 response shapes, which most municipal
/// providers follow with minor deviations. Providers that deviate register
/// their own tables instead.
pub mod abrasf_v1 {
    use super::*;

    fn error_paths(root: &str) -> ErrorPaths {
        ErrorPaths {
            list: owned(&[root, "ListaMensagemRetorno"]),
            item: "MensagemRetorno".to_string(),
            code: owned(&["Codigo"]),
            message: owned(&["Mensagem"]),
            solution: owned(&["Correcao"]),
        }
    }

    /// `EnviarLoteRpsResposta`: batch submission receipt.
    pub fn submit_batch() -> PathSpec {
        PathSpec::builder()
            .scalar(
                ResponseField::Protocol,
                &["EnviarLoteRpsResposta", "Protocolo"],
            )
            .scalar(
                ResponseField::ReceiptTime,
                &["EnviarLoteRpsResposta", "DataRecebimento"],
            )
            .scalar(
                ResponseField::BatchNumber,
                &["EnviarLoteRpsResposta", "NumeroLote"],
            )
            .errors(error_paths("EnviarLoteRpsResposta"))
            .mandatory_success(&[ResponseField::Protocol, ResponseField::ReceiptTime])
            .build()
    }

    /// `ConsultarLoteRpsResposta`: invoices issued for a submitted batch.
    pub fn query_batch() -> PathSpec {
        PathSpec::builder()
            .invoices(InvoicePaths {
                list: owned(&["ConsultarLoteRpsResposta", "ListaNfse"]),
                item: "CompNfse".to_string(),
                number: owned(&["Nfse", "InfNfse", "Numero"]),
                verification_code: owned(&["Nfse", "InfNfse", "CodigoVerificacao"]),
                issue_time: owned(&["Nfse", "InfNfse", "DataEmissao"]),
                other_info: owned(&["Nfse", "InfNfse", "OutrasInformacoes"]),
            })
            .errors(error_paths("ConsultarLoteRpsResposta"))
            .mandatory_success(&[ResponseField::Invoices])
            .build()
    }

    /// `ConsultarSituacaoLoteRpsResposta`: batch processing situation.
    pub fn query_batch_situation() -> PathSpec {
        PathSpec::builder()
            .scalar(
                ResponseField::BatchNumber,
                &["ConsultarSituacaoLoteRpsResposta", "NumeroLote"],
            )
            .scalar(
                ResponseField::Situation,
                &["ConsultarSituacaoLoteRpsResposta", "Situacao"],
            )
            .errors(error_paths("ConsultarSituacaoLoteRpsResposta"))
            .mandatory_success(&[ResponseField::Situation])
            .build()
    }

    /// `ConsultarNfseRpsResposta`: the invoice issued for a single RPS.
    pub fn query_nfse_by_rps() -> PathSpec {
        PathSpec::builder()
            .invoices(InvoicePaths {
                list: owned(&["ConsultarNfseRpsResposta"]),
                item: "CompNfse".to_string(),
                number: owned(&["Nfse", "InfNfse", "Numero"]),
                verification_code: owned(&["Nfse", "InfNfse", "CodigoVerificacao"]),
                issue_time: owned(&["Nfse", "InfNfse", "DataEmissao"]),
                other_info: owned(&["Nfse", "InfNfse", "OutrasInformacoes"]),
            })
            .errors(error_paths("ConsultarNfseRpsResposta"))
            .mandatory_success(&[ResponseField::Invoices])
            .build()
    }

    /// `CancelarNfseResposta`: cancellation confirmation.
    pub fn cancel_nfse() -> PathSpec {
        PathSpec::builder()
            .scalar(
                ResponseField::CancellationTime,
                &[
                    "CancelarNfseResposta",
                    "RetCancelamento",
                    "NfseCancelamento",
                    "Confirmacao",
                    "DataHora",
                ],
            )
            .errors(error_paths("CancelarNfseResposta"))
            .mandatory_success(&[ResponseField::CancellationTime])
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_field_resolves_absent() {
        let spec = abrasf_v1::submit_batch();
        assert!(spec.resolve(ResponseField::Situation).is_none());
        assert!(spec.resolve(ResponseField::CancellationTime).is_none());
        // repeated fields are not scalars either
        assert!(spec.resolve(ResponseField::Invoices).is_none());
    }

    #[test]
    fn declared_scalars_resolve_in_order() {
        let spec = abrasf_v1::submit_batch();
        let path = spec.resolve(ResponseField::Protocol).expect("protocol");
        assert_eq!(path, ["EnviarLoteRpsResposta", "Protocolo"]);
    }

    #[test]
    fn submit_batch_mandates_protocol_and_receipt() {
        let spec = abrasf_v1::submit_batch();
        assert_eq!(
            spec.mandatory_success_fields(),
            [ResponseField::Protocol, ResponseField::ReceiptTime]
        );
    }

    #[test]
    fn empty_spec_resolves_nothing() {
        let spec = PathSpec::builder().build();
        for field in [
            ResponseField::Protocol,
            ResponseField::ReceiptTime,
            ResponseField::BatchNumber,
            ResponseField::Situation,
            ResponseField::CancellationTime,
        ] {
            assert!(spec.resolve(field).is_none(), "{field:?} should be absent");
        }
        assert!(spec.invoices().is_none());
        assert!(spec.errors().is_none());
    }
}
