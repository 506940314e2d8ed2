//! Multi-collection keyword search ("ultra search").
//!
//! A query is matched case-insensitively against a fixed set of fields in
//! every configured collection. Each collection contributes at most
//! [`PER_COLLECTION_LIMIT`] hits and the response holds at most
//! [`TOTAL_LIMIT`], in configured collection order. A collection whose query
//! fails is skipped and reported, never failing the request.
use crate::cache_validator::ValidatedCacheEntry;
use crate::circuit_breaker::DbCircuitBreaker;
use crate::db_storage::CEDULA_FIELDS;
use crate::errors::AppError;
use crate::models::{SearchHit, SearchResponse};
use crate::normalization::{detect_search_type, SearchType};
use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

pub const PER_COLLECTION_LIMIT: i64 = 50;
pub const TOTAL_LIMIT: usize = 100;
pub const MIN_QUERY_LEN: usize = 2;

/// Fields matched against the query text.
pub const TEXT_FIELDS: &[&str] = &[
    "nombre",
    "nombre_completo",
    "primer_apellido",
    "segundo_apellido",
    "razon_social",
    "email",
];

/// Fields matched against the query with dashes removed.
pub const PHONE_FIELDS: &[&str] = &["telefono"];

/// Trims the raw `q` parameter and enforces the minimum length.
pub fn validate_query(raw: Option<&str>) -> Result<String, AppError> {
    let query = raw.map(str::trim).unwrap_or_default();
    if query.chars().count() < MIN_QUERY_LEN {
        return Err(AppError::BadRequest(format!(
            "Query must be at least {} characters",
            MIN_QUERY_LEN
        )));
    }
    Ok(query.to_string())
}

/// `personas_fisicas` -> `Personas Fisicas`.
pub fn collection_label(collection: &str) -> String {
    collection
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn tag_hit(collection: &str, data: Value) -> SearchHit {
    SearchHit {
        tipo: collection_label(collection),
        coleccion: collection.to_string(),
        data,
    }
}

/// SQL text and regex parameters for one query, shared by every collection.
///
/// Parameter `$1` is the collection, `$2..` are `patterns` in order and the
/// last parameter is the row limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    pub sql: String,
    pub patterns: Vec<String>,
}

impl SearchPlan {
    pub fn limit_param(&self) -> usize {
        self.patterns.len() + 2
    }
}

/// Builds the per-collection query. The user query is regex-escaped, so it
/// always matches literally as a substring. Each returned document carries
/// its row id as `_id`.
pub fn build_search_plan(query: &str) -> SearchPlan {
    let mut predicates: Vec<String> = Vec::new();
    let mut patterns: Vec<String> = Vec::new();

    patterns.push(regex::escape(query));
    let text_param = patterns.len() + 1;
    for field in TEXT_FIELDS {
        predicates.push(format!("data->>'{}' ~* ${}", field, text_param));
    }

    let dashless = query.replace('-', "");
    if !dashless.trim().is_empty() {
        patterns.push(regex::escape(&dashless));
        let phone_param = patterns.len() + 1;
        for field in PHONE_FIELDS {
            predicates.push(format!("data->>'{}' ~* ${}", field, phone_param));
        }
    }

    if !dashless.is_empty() && dashless.chars().all(|c| c.is_ascii_digit()) {
        patterns.push(dashless);
        let digits_param = patterns.len() + 1;
        for field in CEDULA_FIELDS {
            predicates.push(format!(
                "regexp_replace(COALESCE(data->>'{}', ''), '[^0-9]', '', 'g') ~ ${}",
                field, digits_param
            ));
        }
    }

    let sql = format!(
        "SELECT data || jsonb_build_object('_id', id::text) FROM registry.documents WHERE collection = $1 AND ({}) ORDER BY created_at, seq LIMIT ${}",
        predicates.join(" OR "),
        patterns.len() + 2
    );

    SearchPlan { sql, patterns }
}

/// Hits in collection order plus the collections that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub skipped: Vec<String>,
}

/// Applies the total cap while keeping collection order.
pub fn assemble(
    collections: &[String],
    per_collection: Vec<Option<Result<Vec<Value>, String>>>,
) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();
    for (name, result) in collections.iter().zip(per_collection) {
        match result {
            Some(Ok(docs)) => {
                for doc in docs {
                    if outcome.hits.len() >= TOTAL_LIMIT {
                        break;
                    }
                    outcome.hits.push(tag_hit(name, doc));
                }
            }
            Some(Err(reason)) => {
                tracing::warn!("Search skipped collection {}: {}", name, reason);
                outcome.skipped.push(name.clone());
            }
            None => {
                tracing::warn!("Search task for collection {} did not finish", name);
                outcome.skipped.push(name.clone());
            }
        }
    }
    outcome
}

#[derive(Clone)]
pub struct SearchService {
    pool: PgPool,
    collections: Arc<Vec<String>>,
    breaker: Arc<DbCircuitBreaker>,
    cache: Cache<String, String>,
}

impl SearchService {
    pub fn new(pool: PgPool, collections: Vec<String>, breaker: Arc<DbCircuitBreaker>) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(60))
            .max_capacity(5_000)
            .build();
        Self {
            pool,
            collections: Arc::new(collections),
            breaker,
            cache,
        }
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Full ultra search: validation, cache, fan-out, assembly.
    pub async fn ultra_search(&self, raw_query: Option<&str>) -> Result<SearchResponse, AppError> {
        let started = Instant::now();
        let query = validate_query(raw_query)?;
        let search_type = detect_search_type(&query);
        let cache_key = query.to_lowercase();

        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Some(mut response) = ValidatedCacheEntry::open::<SearchResponse>(&cached) {
                tracing::debug!("Search cache HIT for '{}'", query);
                response.query = query;
                response.search_time_ms = started.elapsed().as_millis() as u64;
                return Ok(response);
            }
        }

        let outcome = self.search_collections(&query).await;
        let response = SearchResponse {
            total_found: outcome.hits.len(),
            results: outcome.hits,
            search_time_ms: started.elapsed().as_millis() as u64,
            query: query.clone(),
            search_type,
            skipped_collections: outcome.skipped,
        };

        // Partial answers are not cached so a recovered collection shows up
        // on the next request.
        if response.skipped_collections.is_empty() {
            if let Some(sealed) = ValidatedCacheEntry::seal(&response) {
                self.cache.insert(cache_key, sealed).await;
            }
        }

        tracing::info!(
            "Ultra search '{}' ({:?}): {} hits in {}ms, {} collections skipped",
            query,
            search_type,
            response.total_found,
            response.search_time_ms,
            response.skipped_collections.len()
        );

        Ok(response)
    }

    /// Runs the query against every collection concurrently and assembles
    /// the hits in configured order.
    pub async fn search_collections(&self, query: &str) -> SearchOutcome {
        let plan = Arc::new(build_search_plan(query));
        let mut tasks = JoinSet::new();

        for (idx, collection) in self.collections.iter().enumerate() {
            let pool = self.pool.clone();
            let breaker = self.breaker.clone();
            let plan = plan.clone();
            let collection = collection.clone();

            tasks.spawn(async move {
                let result = breaker
                    .call(async {
                        let mut q = sqlx::query_as::<_, (Value,)>(&plan.sql).bind(&collection);
                        for pattern in &plan.patterns {
                            q = q.bind(pattern);
                        }
                        q.bind(PER_COLLECTION_LIMIT).fetch_all(&pool).await
                    })
                    .await;

                let result = match result {
                    Ok(rows) => Ok(rows.into_iter().map(|(data,)| data).collect::<Vec<_>>()),
                    Err(failsafe::Error::Inner(e)) => Err(e.to_string()),
                    Err(failsafe::Error::Rejected) => Err("database circuit open".to_string()),
                };
                (idx, result)
            });
        }

        let mut per_collection: Vec<Option<Result<Vec<Value>, String>>> =
            vec![None; self.collections.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => per_collection[idx] = Some(result),
                Err(e) => tracing::error!("Search task panicked: {}", e),
            }
        }

        assemble(&self.collections, per_collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn short_queries_are_rejected() {
        assert!(validate_query(None).is_err());
        assert!(validate_query(Some("")).is_err());
        assert!(validate_query(Some(" a ")).is_err());
        assert_eq!(validate_query(Some("  Maria ")).unwrap(), "Maria");
        // multibyte characters count as characters, not bytes
        assert!(validate_query(Some("ñ")).is_err());
        assert!(validate_query(Some("ñá")).is_ok());
    }

    #[test]
    fn labels_title_case_collection_names() {
        assert_eq!(collection_label("personas_fisicas"), "Personas Fisicas");
        assert_eq!(collection_label("tse_datos_hibridos"), "Tse Datos Hibridos");
        assert_eq!(collection_label("personas_fisicas_fast2m"), "Personas Fisicas Fast2m");
    }

    #[test]
    fn name_query_plan_has_text_and_phone_patterns() {
        let plan = build_search_plan("Maria");
        assert_eq!(plan.patterns, vec!["Maria", "Maria"]);
        assert!(plan.sql.contains("data->>'nombre' ~* $2"));
        assert!(plan.sql.contains("data->>'razon_social' ~* $2"));
        assert!(plan.sql.contains("data->>'telefono' ~* $3"));
        assert!(!plan.sql.contains("regexp_replace"));
        assert!(plan.sql.ends_with("LIMIT $4"));
        assert_eq!(plan.limit_param(), 4);
    }

    #[test]
    fn cedula_query_plan_matches_digits() {
        let plan = build_search_plan("1-2345-6789");
        assert_eq!(plan.patterns[0], regex::escape("1-2345-6789"));
        assert_eq!(plan.patterns[1], "123456789");
        assert_eq!(plan.patterns[2], "123456789");
        assert!(plan
            .sql
            .contains("regexp_replace(COALESCE(data->>'cedula', ''), '[^0-9]', '', 'g') ~ $4"));
        assert!(plan.sql.contains("data->>'numero_cedula'"));
        assert!(plan.sql.ends_with("LIMIT $5"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let plan = build_search_plan("a.*(b");
        assert_eq!(plan.patterns[0], r"a\.\*\(b");
    }

    #[test]
    fn assembly_keeps_order_caps_and_reports_skips() {
        let collections = names(&["uno", "dos", "tres", "cuatro"]);
        let docs = |n: usize, tag: &str| -> Vec<Value> {
            (0..n).map(|i| json!({"n": i, "from": tag})).collect()
        };
        let outcome = assemble(
            &collections,
            vec![
                Some(Ok(docs(50, "uno"))),
                Some(Err("relation does not exist".into())),
                Some(Ok(docs(50, "tres"))),
                Some(Ok(docs(10, "cuatro"))),
            ],
        );

        assert_eq!(outcome.hits.len(), TOTAL_LIMIT);
        assert_eq!(outcome.skipped, vec!["dos".to_string()]);
        assert_eq!(outcome.hits[0].coleccion, "uno");
        assert_eq!(outcome.hits[50].coleccion, "tres");
        assert!(outcome.hits.iter().all(|h| h.coleccion != "cuatro"));
    }

    #[test]
    fn unfinished_collections_are_skipped() {
        let collections = names(&["uno", "dos"]);
        let outcome = assemble(&collections, vec![Some(Ok(vec![json!({"a": 1})])), None]);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].tipo, "Uno");
        assert_eq!(outcome.skipped, vec!["dos".to_string()]);
    }
}
