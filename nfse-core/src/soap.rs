//! SOAP envelope assembly and the transport seam.
use crate::sign::XMLDSIG_NS;
use thiserror::Error;

pub const SOAPENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Errors raised by the transport layer. Surfaced verbatim to the caller;
/// no retry happens inside the core.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SOAP fault from {operation}: {message}")]
    Fault { operation: String, message: String },
    #[error("unexpected status {status} from {operation}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("TLS client identity error: {0}")]
    Tls(String),
}

/// Inputs for one SOAP envelope.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeSpec<'a> {
    /// Payload XML placed inside the body.
    pub payload: &'a str,
    /// Optional root tag wrapped around the payload.
    pub body_root_tag: Option<&'a str>,
    /// Prefix qualifying the root tag; must match a declared namespace.
    pub namespace_identifier: Option<&'a str>,
    /// Operation-specific namespaces declared on the envelope.
    pub message_namespaces: &'a [(String, String)],
    /// Wrap the payload in a CDATA section.
    pub cdata: bool,
}

/// Build the full SOAP envelope: explicit UTF-8 XML declaration, the fixed
/// namespace set (`soapenv`, XML-DSig, XSD, XSI), any message namespaces,
/// and the payload inside the body.
pub fn build_envelope(spec: &EnvelopeSpec<'_>) -> String {
    let mut namespaces = format!(
        "xmlns:soapenv=\"{SOAPENV_NS}\" xmlns:ins0=\"{XMLDSIG_NS}\" \
         xmlns:xsd=\"{XSD_NS}\" xmlns:xsi=\"{XSI_NS}\""
    );
    for (prefix, uri) in spec.message_namespaces {
        namespaces.push_str(&format!(" xmlns:{prefix}=\"{uri}\""));
    }

    let content = if spec.cdata {
        format!("<![CDATA[{}]]>", spec.payload)
    } else {
        spec.payload.to_string()
    };
    let body = match spec.body_root_tag {
        Some(tag) => {
            let qualified = match spec.namespace_identifier {
                Some(prefix) => format!("{prefix}:{tag}"),
                None => tag.to_string(),
            };
            format!("<{qualified}>{content}</{qualified}>")
        }
        None => content,
    };

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope {namespaces}>\
         <soapenv:Header/>\
         <soapenv:Body>{body}</soapenv:Body>\
         </soapenv:Envelope>"
    )
}

/// TLS parameters for the HTTP transport. The client identity comes from
/// the same PKCS#12 container used for signing.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub danger_accept_invalid_certs: bool,
    pub client_pkcs12_der: Option<Vec<u8>>,
    pub client_pkcs12_password: Option<String>,
}

/// Pluggable SOAP transport: send an envelope, get raw response text back.
///
/// Implementations impose no retry policy; timeout and cancellation belong
/// to the caller at this boundary.
pub trait SoapTransport: Send + Sync {
    fn call(
        &self,
        endpoint: &str,
        operation: &str,
        envelope: &str,
    ) -> Result<String, TransportError>;
}

/// Blocking HTTP transport over reqwest.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(tls: &TlsOptions) -> Result<Self, TransportError> {
        let mut builder = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(tls.danger_accept_invalid_certs);
        if let Some(der) = &tls.client_pkcs12_der {
            let password = tls.client_pkcs12_password.as_deref().unwrap_or("");
            let identity = reqwest::Identity::from_pkcs12_der(der, password)
                .map_err(|e| TransportError::Tls(e.to_string()))?;
            builder = builder.identity(identity);
        }
        Ok(HttpTransport {
            client: builder.build()?,
        })
    }
}

impl SoapTransport for HttpTransport {
    fn call(
        &self,
        endpoint: &str,
        operation: &str,
        envelope: &str,
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", operation)
            .body(envelope.to_string())
            .send()?;
        let status = response.status();
        let body = response.text()?;

        if status.is_success() {
            return Ok(body);
        }
        if body.contains(":Fault>") || body.contains("<Fault>") {
            return Err(TransportError::Fault {
                operation: operation.to_string(),
                message: body,
            });
        }
        Err(TransportError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespaces() -> Vec<(String, String)> {
        vec![("ns1".to_string(), "http://server.example.gov.br".to_string())]
    }

    #[test]
    fn envelope_declares_fixed_namespaces() {
        let spec = EnvelopeSpec {
            payload: "<EnviarLoteRpsEnvio/>",
            ..Default::default()
        };
        let envelope = build_envelope(&spec);
        assert!(envelope.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(envelope.contains(&format!("xmlns:soapenv=\"{SOAPENV_NS}\"")));
        assert!(envelope.contains(&format!("xmlns:ins0=\"{XMLDSIG_NS}\"")));
        assert!(envelope.contains(&format!("xmlns:xsd=\"{XSD_NS}\"")));
        assert!(envelope.contains(&format!("xmlns:xsi=\"{XSI_NS}\"")));
        assert!(envelope.contains("<soapenv:Body><EnviarLoteRpsEnvio/></soapenv:Body>"));
    }

    #[test]
    fn body_root_tag_is_namespace_qualified() {
        let message_namespaces = namespaces();
        let spec = EnvelopeSpec {
            payload: "<EnviarLoteRpsEnvio/>",
            body_root_tag: Some("recepcionarLoteRps"),
            namespace_identifier: Some("ns1"),
            message_namespaces: &message_namespaces,
            cdata: false,
        };
        let envelope = build_envelope(&spec);
        assert!(envelope.contains("xmlns:ns1=\"http://server.example.gov.br\""));
        assert!(envelope
            .contains("<ns1:recepcionarLoteRps><EnviarLoteRpsEnvio/></ns1:recepcionarLoteRps>"));
    }

    #[test]
    fn unqualified_root_tag_without_identifier() {
        let spec = EnvelopeSpec {
            payload: "<X/>",
            body_root_tag: Some("recepcionarLoteRps"),
            ..Default::default()
        };
        let envelope = build_envelope(&spec);
        assert!(envelope.contains("<recepcionarLoteRps><X/></recepcionarLoteRps>"));
    }

    #[test]
    fn cdata_payload_is_wrapped() {
        let spec = EnvelopeSpec {
            payload: "<EnviarLoteRpsEnvio/>",
            body_root_tag: Some("recepcionarLoteRps"),
            cdata: true,
            ..Default::default()
        };
        let envelope = build_envelope(&spec);
        assert!(envelope.contains("<![CDATA[<EnviarLoteRpsEnvio/>]]>"));
    }
}
