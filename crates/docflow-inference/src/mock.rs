//! Mock inference backends for deterministic testing.
//!
//! The embedding mock derives vectors from a hash of the input text, so
//! identical supplier strings are identical vectors (similarity 1.0) and
//! unrelated strings land far apart; tests that need exact similarity
//! control can pin vectors per input instead. The oracle mock replays
//! queued responses and records every call.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use docflow_core::{
    defaults, EmbeddingBackend, Error, ExtractionOracle, ExtractionSchema, Result,
};

/// Deterministic embedding backend for tests.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    fixed: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failing: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self {
            dimension: defaults::EMBED_DIMENSION,
            fixed: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(Mutex::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the vector returned for an exact input text. Short vectors are
    /// zero-padded to the backend dimension.
    pub fn with_vector(self, text: impl Into<String>, mut vector: Vec<f32>) -> Self {
        vector.resize(self.dimension, 0.0);
        self.fixed.lock().unwrap().insert(text.into(), vector);
        self
    }

    /// Make subsequent embed calls fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Every text embedded so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn hash_seeded(&self, text: &str) -> Vec<f32> {
        // FNV-1a seed, then an LCG walk to fill the vector.
        let mut seed: u64 = 0xcbf29ce484222325;
        for b in text.as_bytes() {
            seed ^= u64::from(*b);
            seed = seed.wrapping_mul(0x100000001b3);
        }
        let mut state = seed;
        (0..self.dimension)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.lock().unwrap().push(text.to_string());
        if *self.failing.lock().unwrap() {
            return Err(Error::Embedding("simulated embedding failure".to_string()));
        }
        if let Some(vector) = self.fixed.lock().unwrap().get(text) {
            return Ok(vector.clone());
        }
        Ok(self.hash_seeded(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

/// One recorded oracle call.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleCall {
    Extract { file_count: usize },
    ExtractSupplier { file_count: usize },
}

/// Scripted extraction oracle for tests.
///
/// `extract` pops queued results in order; an empty queue is an error so
/// tests fail loudly when a call they did not script happens.
#[derive(Clone, Default)]
pub struct MockOracle {
    extractions: Arc<Mutex<VecDeque<Result<JsonValue>>>>,
    supplier: Arc<Mutex<Option<Result<Option<String>>>>>,
    calls: Arc<Mutex<Vec<OracleCall>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful extraction result.
    pub fn enqueue_extraction(&self, result: JsonValue) {
        self.extractions.lock().unwrap().push_back(Ok(result));
    }

    /// Queue an extraction failure.
    pub fn enqueue_extraction_failure(&self, message: impl Into<String>) {
        self.extractions
            .lock()
            .unwrap()
            .push_back(Err(Error::Extraction(message.into())));
    }

    /// Fix the supplier-identification response for all calls.
    pub fn set_supplier(&self, supplier: Option<&str>) {
        *self.supplier.lock().unwrap() = Some(Ok(supplier.map(String::from)));
    }

    /// Make supplier identification fail.
    pub fn set_supplier_failure(&self, message: impl Into<String>) {
        *self.supplier.lock().unwrap() = Some(Err(Error::Extraction(message.into())));
    }

    /// All oracle calls made so far.
    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `extract` calls made so far.
    pub fn extract_call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, OracleCall::Extract { .. }))
            .count()
    }
}

#[async_trait]
impl ExtractionOracle for MockOracle {
    async fn extract(&self, file_urls: &[String], _schema: &ExtractionSchema) -> Result<JsonValue> {
        self.calls.lock().unwrap().push(OracleCall::Extract {
            file_count: file_urls.len(),
        });
        self.extractions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Extraction("no queued extraction result".to_string())))
    }

    async fn extract_supplier(&self, file_urls: &[String]) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(OracleCall::ExtractSupplier {
            file_count: file_urls.len(),
        });
        match &*self.supplier.lock().unwrap() {
            Some(Ok(supplier)) => Ok(supplier.clone()),
            Some(Err(e)) => Err(Error::Extraction(e.to_string())),
            None => Ok(None),
        }
    }
}
