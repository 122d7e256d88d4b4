//! Exclusive canonicalization and XML-DSig signature assembly.
//!
//! The municipal schemas require SHA-1 / RSA-SHA1 enveloped signatures. The
//! algorithm identifiers are fixed; they are not negotiable per call.
use crate::identity::Identity;
use base64ct::{Base64, Encoding};
use libxml::parser::Parser;
use libxml::tree::{c14n, Node};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::sign::{Signer, Verifier};
use thiserror::Error;

pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const EXC_C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const RSA_SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const C14N_2001_TRANSFORM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";

/// Errors emitted while canonicalizing or signing XML.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("XML parse error: {0}")]
    XmlParse(String),
    #[error("canonicalization failed: {0}")]
    Canonicalize(String),
    #[error("payload has no root element")]
    MissingRoot,
    #[error("signing requires a resolved certificate and private key")]
    IdentityRequired,
    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] ErrorStack),
}

/// Canonicalize an XML fragment to its W3C exclusive C14N 1.0 form.
///
/// Comments are dropped and whitespace-only text nodes are stripped before
/// canonicalization, so that an indented fixture and its compact equivalent
/// digest identically. Idempotent: canonical input comes back byte-identical.
pub fn canonicalize(xml: &str) -> Result<String, SigningError> {
    let doc = Parser::default()
        .parse_string(xml)
        .map_err(|e| SigningError::XmlParse(format!("{e:?}")))?;
    if let Some(mut root) = doc.get_root_element() {
        strip_blank_text(&mut root);
    }
    let options = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::ExclusiveCanonical1_0,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    doc.canonicalize(options, None)
        .map_err(|e| SigningError::Canonicalize(format!("{e:?}")))
}

fn strip_blank_text(node: &mut Node) {
    let children = node.get_child_nodes();
    for mut child in children {
        if child.is_text_node() {
            if child.get_content().trim().is_empty() {
                child.unlink();
            }
        } else if child.is_element_node() {
            strip_blank_text(&mut child);
        }
    }
}

/// SHA-1 digest of the canonical form of `payload_xml`, base64 without line
/// breaks. This is the `DigestValue` of the signature's single `Reference`.
pub fn digest_value(payload_xml: &str) -> Result<String, SigningError> {
    let canonical = canonicalize(payload_xml)?;
    let digest = openssl::sha::sha1(canonical.as_bytes());
    Ok(Base64::encode_string(&digest))
}

/// Render the `SignedInfo` element for a reference at `reference_uri`.
///
/// An empty URI means "the whole document". The two transforms (enveloped
/// signature, then plain C14N 2001) and the algorithm identifiers are the
/// fixed set the municipal verifiers expect.
pub fn signed_info_xml(digest_value: &str, reference_uri: &str) -> String {
    format!(
        concat!(
            "<SignedInfo xmlns=\"{ns}\">",
            "<CanonicalizationMethod Algorithm=\"{c14n}\"/>",
            "<SignatureMethod Algorithm=\"{sig}\"/>",
            "<Reference URI=\"{uri}\">",
            "<Transforms>",
            "<Transform Algorithm=\"{enveloped}\"/>",
            "<Transform Algorithm=\"{c14n2001}\"/>",
            "</Transforms>",
            "<DigestMethod Algorithm=\"{sha1}\"/>",
            "<DigestValue>{digest}</DigestValue>",
            "</Reference>",
            "</SignedInfo>"
        ),
        ns = XMLDSIG_NS,
        c14n = EXC_C14N_ALGORITHM,
        sig = RSA_SHA1_ALGORITHM,
        uri = reference_uri,
        enveloped = ENVELOPED_SIGNATURE_TRANSFORM,
        c14n2001 = C14N_2001_TRANSFORM,
        sha1 = SHA1_ALGORITHM,
        digest = digest_value,
    )
}

/// Builds XML-DSig `<Signature>` elements over canonicalized payloads.
pub struct XmlSigner<'a> {
    identity: &'a Identity,
}

impl<'a> XmlSigner<'a> {
    pub fn new(identity: &'a Identity) -> Self {
        XmlSigner { identity }
    }

    /// Assemble the complete, canonical `<Signature>` element for
    /// `payload_xml`, referenced by `reference_uri`.
    ///
    /// Fixed order: canonicalize payload, digest, build `SignedInfo`,
    /// canonicalize it, sign its canonical bytes, then assemble and
    /// canonicalize the whole `Signature` before it is embedded.
    pub fn signature_element(
        &self,
        payload_xml: &str,
        reference_uri: &str,
    ) -> Result<String, SigningError> {
        let digest = digest_value(payload_xml)?;
        let signed_info = canonicalize(&signed_info_xml(&digest, reference_uri))?;
        let signature_value = self.sign_canonical(&signed_info)?;
        let certificate = self.identity.certificate_base64()?;
        let assembled = format!(
            concat!(
                "<Signature xmlns=\"{ns}\">",
                "{signed_info}",
                "<SignatureValue>{value}</SignatureValue>",
                "<KeyInfo><X509Data><X509Certificate>{cert}</X509Certificate></X509Data></KeyInfo>",
                "</Signature>"
            ),
            ns = XMLDSIG_NS,
            signed_info = signed_info,
            value = signature_value,
            cert = certificate,
        );
        canonicalize(&assembled)
    }

    /// RSA-SHA1 signature over already-canonical bytes, base64 without line
    /// breaks.
    pub fn sign_canonical(&self, canonical: &str) -> Result<String, SigningError> {
        let mut signer = Signer::new(MessageDigest::sha1(), self.identity.key())?;
        signer.update(canonical.as_bytes())?;
        let signature = signer.sign_to_vec()?;
        Ok(Base64::encode_string(&signature))
    }

    /// Re-verify a base64 `SignatureValue` against canonical bytes.
    pub fn verify_canonical(
        &self,
        canonical: &str,
        signature_b64: &str,
    ) -> Result<bool, SigningError> {
        let signature = Base64::decode_vec(signature_b64)
            .map_err(|e| SigningError::Canonicalize(format!("invalid base64: {e}")))?;
        let mut verifier = Verifier::new(MessageDigest::sha1(), self.identity.key())?;
        verifier.update(canonical.as_bytes())?;
        Ok(verifier.verify(&signature)?)
    }
}

/// Insert a `<Signature>` element as the last child of the payload's root
/// element and return the payload serialized without an XML declaration
/// (the declaration belongs to the outer SOAP envelope).
pub fn embed_signature(payload_xml: &str, signature_xml: &str) -> Result<String, SigningError> {
    let mut doc = Parser::default()
        .parse_string(payload_xml)
        .map_err(|e| SigningError::XmlParse(format!("{e:?}")))?;
    let fragment = Parser::default()
        .parse_string(signature_xml)
        .map_err(|e| SigningError::XmlParse(format!("{e:?}")))?;
    let mut signature = fragment.get_root_element().ok_or(SigningError::MissingRoot)?;
    signature.unlink();
    let mut imported = doc
        .import_node(&mut signature)
        .map_err(|_| SigningError::XmlParse("failed to import signature".into()))?;
    let mut root = doc.get_root_element().ok_or(SigningError::MissingRoot)?;
    root.add_child(&mut imported)
        .map_err(|e| SigningError::XmlParse(e.to_string()))?;
    Ok(doc.node_to_string(&root))
}
