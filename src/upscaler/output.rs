// Shapes a finished prediction's `output` can take, and their reduction to
// the single artifact URL that gets downloaded.

use serde_json::Value;

use super::UpscaleError;

/// Structured output object exposing a retrievable reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutput {
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    Reference(String),
    File(FileOutput),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteJobOutput {
    File(FileOutput),
    List(Vec<OutputItem>),
    Reference(String),
    Unrecognized(Value),
}

impl From<Value> for FileOutput {
    fn from(value: Value) -> Self {
        let url = value.get("url").and_then(Value::as_str).map(str::to_string);
        FileOutput { url }
    }
}

impl From<Value> for OutputItem {
    fn from(value: Value) -> Self {
        match value {
            Value::String(reference) => OutputItem::Reference(reference),
            Value::Object(_) => OutputItem::File(FileOutput::from(value)),
            other => OutputItem::Other(other),
        }
    }
}

impl From<Value> for RemoteJobOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) => RemoteJobOutput::File(FileOutput::from(value)),
            Value::Array(items) => {
                RemoteJobOutput::List(items.into_iter().map(OutputItem::from).collect())
            }
            Value::String(reference) => RemoteJobOutput::Reference(reference),
            other => RemoteJobOutput::Unrecognized(other),
        }
    }
}

impl RemoteJobOutput {
    /// Short description of the shape, used in error messages.
    pub fn shape(&self) -> String {
        match self {
            RemoteJobOutput::File(file) if file.url.is_some() => "object".to_string(),
            RemoteJobOutput::File(_) => "object without url".to_string(),
            RemoteJobOutput::List(items) if items.is_empty() => "empty list".to_string(),
            RemoteJobOutput::List(items) => {
                let first = match &items[0] {
                    OutputItem::Reference(_) => "string".to_string(),
                    OutputItem::File(_) => "object".to_string(),
                    OutputItem::Other(value) => json_kind(value).to_string(),
                };
                format!("list[{}] of {}", items.len(), first)
            }
            RemoteJobOutput::Reference(_) => "string".to_string(),
            RemoteJobOutput::Unrecognized(value) => json_kind(value).to_string(),
        }
    }
}

/// Picks the URL to download. Only the first element of a list is looked at.
pub fn resolve_reference(output: &RemoteJobOutput) -> Result<String, UpscaleError> {
    let reference = match output {
        RemoteJobOutput::File(file) => file.url.as_deref(),
        RemoteJobOutput::List(items) => match items.first() {
            Some(OutputItem::File(file)) => file.url.as_deref(),
            Some(OutputItem::Reference(reference)) => Some(reference.as_str()),
            Some(OutputItem::Other(_)) | None => None,
        },
        RemoteJobOutput::Reference(reference) => Some(reference.as_str()),
        RemoteJobOutput::Unrecognized(_) => None,
    };

    reference
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .map(str::to_string)
        .ok_or_else(|| UpscaleError::UnresolvableOutput {
            shape: output.shape(),
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
