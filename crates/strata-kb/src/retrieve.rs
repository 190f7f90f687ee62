//! Query-side retrieval: embed, search, rerank.
//!
//! Each query runs its own search-and-rerank pipeline; queries fan out
//! concurrently without a pool since query sets are small.

use futures::future;
use tracing::{debug, instrument};

use strata_common::{InputType, MetadataFilter, RankedResult, Result, StrataError};

use crate::components::Components;

/// ANN candidates fetched per query before reranking.
const SEARCH_TOP_K: usize = 200;

#[instrument(skip_all, fields(n_queries = queries.len()))]
pub(crate) async fn ranked_results_for_queries(
    components: &Components,
    queries: &[String],
    filter: Option<&MetadataFilter>,
) -> Result<Vec<Vec<RankedResult>>> {
    let searches = queries.iter().map(|query| search_one(components, query, filter));
    future::join_all(searches).await.into_iter().collect()
}

async fn search_one(
    components: &Components,
    query: &str,
    filter: Option<&MetadataFilter>,
) -> Result<Vec<RankedResult>> {
    let vectors = components
        .embedding
        .embed(&[query.to_string()], InputType::Query)
        .await
        .map_err(StrataError::Provider)?;
    let query_vector = vectors
        .into_iter()
        .next()
        .ok_or_else(|| StrataError::Store("embedding returned no query vector".to_string()))?;

    let hits = components
        .vector_store
        .search(&query_vector, SEARCH_TOP_K, filter)
        .await?;
    if hits.is_empty() {
        return Ok(vec![]);
    }

    let reranked = components
        .reranker
        .rerank(query, hits)
        .await
        .map_err(StrataError::Provider)?;
    debug!(query, n_results = reranked.len(), "query pipeline complete");
    Ok(reranked)
}
