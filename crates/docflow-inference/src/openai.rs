//! OpenAI-compatible inference backends.
//!
//! Two concerns live here: text embeddings for template matching, and the
//! structured-extraction oracle that reads invoice documents against a
//! confirmed field schema. Both speak the OpenAI wire format, so any
//! compatible gateway works as the endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use docflow_core::embedding::conform_embedding;
use docflow_core::{
    defaults, EmbeddingBackend, Error, ExtractionOracle, ExtractionSchema, FieldType, Result,
    SuggestedField,
};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = defaults::EMBED_MODEL;

/// Default extraction model.
pub const DEFAULT_EXTRACT_MODEL: &str = defaults::EXTRACT_MODEL;

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = defaults::EMBED_TIMEOUT_SECS;

/// Timeout for extraction requests (seconds).
pub const EXTRACT_TIMEOUT_SECS: u64 = defaults::EXTRACT_TIMEOUT_SECS;

/// OpenAI-compatible embedding backend.
pub struct OpenAiEmbeddingBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddingBackend {
    /// Create a backend against the given endpoint.
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        info!(
            subsystem = "inference",
            component = "embedding",
            model = %model,
            "Initializing embedding backend"
        );

        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    /// Create from environment variables.
    ///
    /// Reads `DOCFLOW_API_BASE`, `DOCFLOW_API_KEY`, and
    /// `DOCFLOW_EMBED_MODEL`; the key is required.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("DOCFLOW_API_BASE").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("DOCFLOW_API_KEY")
            .map_err(|_| Error::Config("DOCFLOW_API_KEY is not set".to_string()))?;
        let model = std::env::var("DOCFLOW_EMBED_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());
        Ok(Self::new(base_url, api_key, model))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddingBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding request failed with {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let raw = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))?
            .embedding;

        debug!(
            subsystem = "inference",
            component = "embedding",
            duration_ms = start.elapsed().as_millis() as u64,
            raw_dimension = raw.len(),
            "Generated embedding"
        );
        conform_embedding(raw)
    }

    fn dimension(&self) -> usize {
        defaults::EMBED_DIMENSION
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible structured-extraction oracle.
///
/// Documents are handed to the model as URLs; output is constrained to a
/// JSON schema derived from the confirmed field set, so the response is
/// parseable by construction.
pub struct OpenAiExtractionOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiExtractionOracle {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(EXTRACT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        info!(
            subsystem = "inference",
            component = "extraction",
            model = %model,
            "Initializing extraction oracle"
        );

        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    /// Create from environment variables.
    ///
    /// Reads `DOCFLOW_API_BASE`, `DOCFLOW_API_KEY`, and
    /// `DOCFLOW_EXTRACT_MODEL`; the key is required.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("DOCFLOW_API_BASE").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("DOCFLOW_API_KEY")
            .map_err(|_| Error::Config("DOCFLOW_API_KEY is not set".to_string()))?;
        let model = std::env::var("DOCFLOW_EXTRACT_MODEL")
            .unwrap_or_else(|_| DEFAULT_EXTRACT_MODEL.to_string());
        Ok(Self::new(base_url, api_key, model))
    }

    async fn chat_json(
        &self,
        system_prompt: &str,
        user_content: JsonValue,
        schema_name: &str,
        schema: JsonValue,
    ) -> Result<JsonValue> {
        let start = Instant::now();
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_content},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "strict": true,
                    "schema": schema,
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "inference",
                component = "extraction",
                status = %status,
                "Extraction request failed"
            );
            return Err(Error::Extraction(format!(
                "extraction request failed with {}: {}",
                status, text
            )));
        }

        let parsed: JsonValue = response.json().await?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Extraction("response carried no message content".to_string()))?;
        let result: JsonValue = serde_json::from_str(content)
            .map_err(|e| Error::Extraction(format!("model returned invalid JSON: {}", e)))?;

        debug!(
            subsystem = "inference",
            component = "extraction",
            duration_ms = start.elapsed().as_millis() as u64,
            "Extraction call succeeded"
        );
        Ok(result)
    }

    fn document_content(file_urls: &[String], instruction: &str) -> JsonValue {
        let mut parts = vec![json!({"type": "text", "text": instruction})];
        for url in file_urls {
            parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
        }
        JsonValue::Array(parts)
    }
}

/// Map a field's declared type to a JSON Schema type. Dates stay strings
/// on the wire.
fn json_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Number => "number",
        FieldType::String | FieldType::Date => "string",
    }
}

fn group_schema(fields: &[SuggestedField]) -> JsonValue {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for field in fields {
        let mut prop = serde_json::Map::new();
        if field.required {
            prop.insert("type".to_string(), json!(json_type(field.field_type)));
        } else {
            // Optional fields are nullable rather than omittable; strict
            // mode requires every property to be listed in `required`.
            prop.insert(
                "type".to_string(),
                json!([json_type(field.field_type), "null"]),
            );
        }
        if !field.description.is_empty() {
            prop.insert("description".to_string(), json!(field.description));
        }
        properties.insert(field.name.clone(), JsonValue::Object(prop));
        required.push(field.name.clone());
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Build the strict output schema for an extraction run: one `header`
/// object and a `lineItems` array per document.
pub fn extraction_output_schema(schema: &ExtractionSchema) -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "documents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "header": group_schema(&schema.header_fields),
                        "lineItems": {
                            "type": "array",
                            "items": group_schema(&schema.line_item_fields),
                        },
                    },
                    "required": ["header", "lineItems"],
                    "additionalProperties": false,
                }
            }
        },
        "required": ["documents"],
        "additionalProperties": false,
    })
}

const EXTRACT_SYSTEM_PROMPT: &str = "You are an invoice data extraction engine. Read the \
    attached documents and extract the requested fields exactly as they appear. Use null for \
    optional fields that are absent. Produce one entry in `documents` per distinct invoice.";

const SUPPLIER_SYSTEM_PROMPT: &str = "You identify the supplier (the party issuing the invoice) \
    from the attached documents. Return the supplier's name as written on the document, or null \
    if no supplier is identifiable.";

#[async_trait]
impl ExtractionOracle for OpenAiExtractionOracle {
    async fn extract(&self, file_urls: &[String], schema: &ExtractionSchema) -> Result<JsonValue> {
        let output_schema = extraction_output_schema(schema);
        let content = Self::document_content(
            file_urls,
            "Extract the configured fields from these documents.",
        );
        let result = self
            .chat_json(EXTRACT_SYSTEM_PROMPT, content, "invoice_extraction", output_schema)
            .await?;

        // Single-document jobs are flattened so downstream merge logic sees
        // `header`/`lineItems` at the top level.
        let documents = result
            .get("documents")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| Error::Extraction("output missing documents array".to_string()))?;
        match documents.len() {
            0 => Err(Error::Extraction("no documents extracted".to_string())),
            1 => Ok(documents[0].clone()),
            _ => Ok(json!({"documents": documents})),
        }
    }

    async fn extract_supplier(&self, file_urls: &[String]) -> Result<Option<String>> {
        let schema = json!({
            "type": "object",
            "properties": {
                "supplier": {"type": ["string", "null"]},
            },
            "required": ["supplier"],
            "additionalProperties": false,
        });
        let content = Self::document_content(file_urls, "Who is the supplier on this invoice?");
        let result = self
            .chat_json(SUPPLIER_SYSTEM_PROMPT, content, "supplier_identification", schema)
            .await?;

        Ok(result
            .get("supplier")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from))
    }
}
