//! Normalization of heterogeneous municipal responses.
//!
//! A well-formed response with error entries is a normal business outcome
//! (`status = Failure`), not an error. Only malformed XML, broken field
//! values, or a response that is neither success- nor failure-shaped
//! surface as [`NormalizeError`].
use crate::paths::{ErrorPaths, InvoicePaths, PathSpec, ResponseField};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use libxml::parser::{Parser, ParserOptions};
use libxml::tree::{Document, Node};
use serde::Serialize;
use thiserror::Error;

/// Errors emitted while normalizing a raw response.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed response XML: {0}")]
    MalformedResponse(String),
    #[error("response is neither success- nor failure-shaped")]
    AmbiguousResponse,
    #[error("invalid timestamp in {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("invalid number in {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Outcome classification of a normalized response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// One error entry reported by the municipality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    code: Option<String>,
    message: Option<String>,
    solution: Option<String>,
}

impl ErrorEntry {
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn solution(&self) -> Option<&str> {
        self.solution.as_deref()
    }

    fn is_populated(&self) -> bool {
        self.code.is_some() || self.message.is_some()
    }
}

/// One issued invoice as reported back by the municipality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NfseRecord {
    number: Option<String>,
    verification_code: Option<String>,
    issue_time: Option<DateTime<Utc>>,
    other_info: Option<String>,
}

impl NfseRecord {
    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub fn verification_code(&self) -> Option<&str> {
        self.verification_code.as_deref()
    }

    pub fn issue_time(&self) -> Option<DateTime<Utc>> {
        self.issue_time
    }

    pub fn other_info(&self) -> Option<&str> {
        self.other_info.as_deref()
    }
}

/// The normalized result of one request. Constructed exactly once per
/// request and immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseResult {
    status: ResponseStatus,
    protocol: Option<String>,
    receipt_time: Option<DateTime<Utc>>,
    batch_number: Option<String>,
    situation: Option<i64>,
    cancellation_time: Option<DateTime<Utc>>,
    invoices: Vec<NfseRecord>,
    error_entries: Vec<ErrorEntry>,
    #[serde(skip)]
    raw_xml: String,
}

impl ResponseResult {
    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn receipt_time(&self) -> Option<DateTime<Utc>> {
        self.receipt_time
    }

    pub fn batch_number(&self) -> Option<&str> {
        self.batch_number.as_deref()
    }

    pub fn situation(&self) -> Option<i64> {
        self.situation
    }

    pub fn cancellation_time(&self) -> Option<DateTime<Utc>> {
        self.cancellation_time
    }

    pub fn invoices(&self) -> &[NfseRecord] {
        &self.invoices
    }

    pub fn error_entries(&self) -> &[ErrorEntry] {
        &self.error_entries
    }

    /// The raw response text this result was built from.
    pub fn raw_xml(&self) -> &str {
        &self.raw_xml
    }
}

/// Normalize a raw response using the paths declared for its operation.
pub fn normalize(raw_xml: &str, spec: &PathSpec) -> Result<ResponseResult, NormalizeError> {
    let doc = parse(raw_xml)?;
    let root = effective_root(&doc)?;
    let root = match &root {
        EffectiveRoot::Direct(node) => node.clone(),
        EffectiveRoot::Reparsed(inner) => inner
            .get_root_element()
            .ok_or_else(|| NormalizeError::MalformedResponse("empty inner document".into()))?,
    };

    let protocol = scalar_text(&root, spec, ResponseField::Protocol);
    let batch_number = scalar_text(&root, spec, ResponseField::BatchNumber);
    let receipt_time = scalar_text(&root, spec, ResponseField::ReceiptTime)
        .map(|v| parse_timestamp("receipt_time", &v))
        .transpose()?;
    let cancellation_time = scalar_text(&root, spec, ResponseField::CancellationTime)
        .map(|v| parse_timestamp("cancellation_time", &v))
        .transpose()?;
    let situation = scalar_text(&root, spec, ResponseField::Situation)
        .map(|v| {
            v.parse::<i64>().map_err(|_| NormalizeError::InvalidNumber {
                field: "situation",
                value: v,
            })
        })
        .transpose()?;

    let invoices = match spec.invoices() {
        Some(paths) => extract_invoices(&root, paths)?,
        None => Vec::new(),
    };
    let error_entries = match spec.errors() {
        Some(paths) => extract_errors(&root, paths),
        None => Vec::new(),
    };

    let result = ResponseResult {
        status: ResponseStatus::Success,
        protocol,
        receipt_time,
        batch_number,
        situation,
        cancellation_time,
        invoices,
        error_entries,
        raw_xml: raw_xml.to_string(),
    };
    classify(result, spec)
}

fn classify(
    mut result: ResponseResult,
    spec: &PathSpec,
) -> Result<ResponseResult, NormalizeError> {
    if result.error_entries.iter().any(ErrorEntry::is_populated) {
        result.status = ResponseStatus::Failure;
        return Ok(result);
    }
    let satisfied = spec.mandatory_success_fields().iter().all(|field| {
        match field {
            ResponseField::Protocol => result.protocol.is_some(),
            ResponseField::ReceiptTime => result.receipt_time.is_some(),
            ResponseField::BatchNumber => result.batch_number.is_some(),
            ResponseField::Situation => result.situation.is_some(),
            ResponseField::CancellationTime => result.cancellation_time.is_some(),
            ResponseField::Invoices => !result.invoices.is_empty(),
            ResponseField::ErrorEntries => !result.error_entries.is_empty(),
        }
    });
    if satisfied && !spec.mandatory_success_fields().is_empty() {
        result.status = ResponseStatus::Success;
        return Ok(result);
    }
    Err(NormalizeError::AmbiguousResponse)
}

fn parse(raw_xml: &str) -> Result<Document, NormalizeError> {
    // recover=false: libxml's default recovery mode would turn malformed XML
    // into a best-effort document instead of the hard error the spec requires.
    Parser::default()
        .parse_string_with_options(
            raw_xml,
            ParserOptions {
                recover: false,
                ..ParserOptions::default()
            },
        )
        .map_err(|e| NormalizeError::MalformedResponse(format!("{e:?}")))
}

enum EffectiveRoot {
    Direct(Node),
    Reparsed(Document),
}

/// Several municipal services return the business document XML-escaped
/// inside the SOAP `return` element; unwrap and re-parse it in that case.
fn effective_root(doc: &Document) -> Result<EffectiveRoot, NormalizeError> {
    let root = doc
        .get_root_element()
        .ok_or_else(|| NormalizeError::MalformedResponse("document has no root".into()))?;
    if root.get_name() == "Envelope" {
        if let Some(inner) = escaped_inner_xml(&root) {
            return Ok(EffectiveRoot::Reparsed(parse(&inner)?));
        }
    }
    Ok(EffectiveRoot::Direct(root))
}

fn escaped_inner_xml(node: &Node) -> Option<String> {
    if element_children(node).next().is_none() {
        let text = node.get_content();
        let trimmed = text.trim();
        if trimmed.starts_with('<') && trimmed.ends_with('>') {
            return Some(trimmed.to_string());
        }
        return None;
    }
    for child in element_children(node) {
        if let Some(inner) = escaped_inner_xml(&child) {
            return Some(inner);
        }
    }
    None
}

fn element_children(node: &Node) -> impl Iterator<Item = Node> {
    node.get_child_nodes()
        .into_iter()
        .filter(|child| child.is_element_node())
}

/// Descend a declared path. The first segment is located anywhere below the
/// starting node (responses wrap the business document in SOAP layers and
/// namespace prefixes vary); the remaining segments must be direct children.
fn descend(start: &Node, path: &[String]) -> Option<Node> {
    let (first, rest) = path.split_first()?;
    let mut current = find_descendant(start, first)?;
    for name in rest {
        current = find_child(&current, name)?;
    }
    Some(current)
}

fn find_descendant(node: &Node, name: &str) -> Option<Node> {
    if node.get_name() == name {
        return Some(node.clone());
    }
    for child in element_children(node) {
        if let Some(found) = find_descendant(&child, name) {
            return Some(found);
        }
    }
    None
}

fn find_child(node: &Node, name: &str) -> Option<Node> {
    element_children(node).find(|child| child.get_name() == name)
}

fn scalar_text(root: &Node, spec: &PathSpec, field: ResponseField) -> Option<String> {
    let path = spec.resolve(field)?;
    let node = descend(root, path)?;
    non_empty(node.get_content())
}

fn relative_text(item: &Node, path: &[String]) -> Option<String> {
    let mut current = item.clone();
    for name in path {
        current = find_child(&current, name)?;
    }
    non_empty(current.get_content())
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn extract_invoices(
    root: &Node,
    paths: &InvoicePaths,
) -> Result<Vec<NfseRecord>, NormalizeError> {
    let parent = match descend(root, &paths.list) {
        Some(parent) => parent,
        None => return Ok(Vec::new()),
    };
    let mut records = Vec::new();
    for item in element_children(&parent).filter(|child| child.get_name() == paths.item) {
        let issue_time = relative_text(&item, &paths.issue_time)
            .map(|v| parse_timestamp("issue_time", &v))
            .transpose()?;
        records.push(NfseRecord {
            number: relative_text(&item, &paths.number),
            verification_code: relative_text(&item, &paths.verification_code),
            issue_time,
            other_info: relative_text(&item, &paths.other_info),
        });
    }
    Ok(records)
}

fn extract_errors(root: &Node, paths: &ErrorPaths) -> Vec<ErrorEntry> {
    let parent = match descend(root, &paths.list) {
        Some(parent) => parent,
        None => return Vec::new(),
    };
    element_children(&parent)
        .filter(|child| child.get_name() == paths.item)
        .map(|item| ErrorEntry {
            code: relative_text(&item, &paths.code),
            message: relative_text(&item, &paths.message),
            solution: relative_text(&item, &paths.solution),
        })
        .collect()
}

/// Parse the datetime formats seen across municipal services: RFC 3339 with
/// zone suffix, or a naive local form assumed UTC.
fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| NormalizeError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}
