//! Template matcher over the embedding index.
//!
//! Candidate templates are retrieved by nearest-neighbor search on an
//! embedding of the supplier and client names, then filtered by a score
//! floor. An empty result is a normal outcome and means "no usable
//! template", never an error.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use docflow_core::{
    defaults, EmbeddingBackend, Result, TemplateMatch, TemplateRepository, UpsertTemplateRequest,
};

/// Canonical embedding text for a `(supplier, client)` pair: trimmed
/// non-empty parts joined by a single space. Both the stored template
/// embeddings and match queries go through this, so the two sides always
/// agree on normalization.
pub fn embedding_text(supplier: &str, client_name: Option<&str>) -> String {
    let mut parts: Vec<&str> = vec![supplier.trim()];
    if let Some(client) = client_name {
        parts.push(client.trim());
    }
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Embedding-based matcher for extraction templates.
pub struct TemplateMatcher {
    templates: Arc<dyn TemplateRepository>,
    embeddings: Arc<dyn EmbeddingBackend>,
}

impl TemplateMatcher {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        embeddings: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            templates,
            embeddings,
        }
    }

    /// Find templates matching a supplier/client pair, best first.
    ///
    /// Returns at most [`defaults::MATCH_CANDIDATE_LIMIT`] candidates
    /// scoring at least [`defaults::MATCH_SCORE_FLOOR`]; may be empty.
    pub async fn find_matches(
        &self,
        supplier: &str,
        client_name: Option<&str>,
    ) -> Result<Vec<TemplateMatch>> {
        let start = Instant::now();
        let query = self
            .embeddings
            .embed(&embedding_text(supplier, client_name))
            .await?;

        let candidates = self
            .templates
            .find_similar(&query, defaults::MATCH_CANDIDATE_LIMIT)
            .await?;
        let candidate_count = candidates.len();

        let mut matches: Vec<TemplateMatch> = candidates
            .into_iter()
            .filter(|(_, score)| *score >= defaults::MATCH_SCORE_FLOOR)
            .map(|(template, score)| TemplateMatch {
                template_id: template.id,
                supplier: template.supplier,
                client_name: template.client_name,
                header_fields: template.header_fields,
                line_item_fields: template.line_item_fields,
                score,
            })
            .collect();
        // The index returns candidates ranked already; re-sort defensively
        // since the floor filter must not disturb best-first order.
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(
            subsystem = "match",
            op = "find_matches",
            supplier,
            candidate_count,
            match_count = matches.len(),
            best_score = matches.first().map(|m| m.score).unwrap_or(0.0),
            duration_ms = start.elapsed().as_millis() as u64,
            "Template match complete"
        );
        Ok(matches)
    }

    /// Create or update a template, recomputing its embedding.
    ///
    /// With a `template_id` the named template is patched in place.
    /// Otherwise the canonical `(client_id, supplier)` template is
    /// updated if one exists, or a new one is created. Either way the
    /// embedding is recomputed from the request's names, so a renamed
    /// supplier re-indexes.
    pub async fn upsert_template(&self, req: UpsertTemplateRequest) -> Result<Uuid> {
        let embedding = self
            .embeddings
            .embed(&embedding_text(&req.supplier, req.client_name.as_deref()))
            .await?;

        let id = match req.template_id {
            Some(id) => {
                self.templates.update(id, req.clone(), embedding).await?;
                id
            }
            None => {
                match self
                    .templates
                    .find_by_client_supplier(req.client_id, &req.supplier)
                    .await?
                {
                    Some(existing) => {
                        self.templates
                            .update(existing.id, req.clone(), embedding)
                            .await?;
                        existing.id
                    }
                    None => self.templates.insert(req.clone(), embedding).await?,
                }
            }
        };

        info!(
            subsystem = "match",
            op = "upsert_template",
            template_id = %id,
            supplier = %req.supplier,
            "Upserted template"
        );
        Ok(id)
    }
}
