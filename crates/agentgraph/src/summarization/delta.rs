//! Delta summarization: given a session and a filter key, fold the events
//! since the last summarize call (plus the previous summary text, as a
//! synthetic leading entry) into an updated summary.

use crate::persistence::{Event, PersistenceError, Session, SessionStore, Summary};
use agentgraph_kernel::{GraphError, Summarizer, SummarizerInput};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SummarizationError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Summarizer(#[from] GraphError),
}

pub type SummarizationResult<T> = Result<T, SummarizationError>;

fn epoch() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(0, 0).unwrap()
}

fn event_to_input(event: &Event) -> SummarizerInput {
    let content = event
        .model_response
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    SummarizerInput {
        author: event.author.clone(),
        content,
        timestamp: Some(event.timestamp),
    }
}

/// Runs the delta algorithm for a single `(session, filter_key)` pair.
/// Returns `Ok(None)` for every "do nothing" branch the algorithm describes
/// (empty subset without `force`, summarizer declines, empty summarizer
/// output) — the caller is responsible for persisting a `Some` result.
pub async fn delta_summarize(
    store: &dyn SessionStore,
    summarizer: &dyn Summarizer,
    session_id: Uuid,
    filter_key: &str,
    force: bool,
) -> SummarizationResult<Option<Summary>> {
    let prev = store.get_summary(session_id, filter_key).await?;
    let prev_at = prev.as_ref().map(|s| s.updated_at).unwrap_or_else(epoch);
    let prev_text = prev.map(|s| s.text).unwrap_or_default();

    let subset = store.events_since(session_id, filter_key, prev_at).await?;
    if subset.is_empty() && !force {
        return Ok(None);
    }

    let mut input = Vec::with_capacity(subset.len() + 1);
    if !prev_text.is_empty() {
        input.push(SummarizerInput {
            author: "system".to_string(),
            content: prev_text,
            timestamp: None,
        });
    }
    input.extend(subset.iter().map(event_to_input));

    if !summarizer.should_summarize(&input).await? && !force {
        return Ok(None);
    }

    let output = summarizer.summarize(&input).await?;
    if output.text.is_empty() {
        return Ok(None);
    }

    let updated_at = output
        .last_included_timestamp
        .or_else(|| subset.last().map(|e| e.timestamp))
        .unwrap_or_else(chrono::Utc::now);

    Ok(Some(Summary {
        text: output.text,
        topics: output.topics,
        updated_at,
    }))
}

/// True when every event in the session's full log has `filter_key == key`
/// or an empty filter key — the precondition for the cascade's
/// single-filter optimization.
fn every_event_matches_or_unscoped(session: &Session, key: &str) -> bool {
    session
        .events
        .iter()
        .all(|e| e.filter_key == key || e.filter_key.is_empty())
}

/// Summarizes filter key `K` and the full session (`""`) concurrently, per
/// the cascade rule. When every event in the session belongs to `K` (or is
/// unscoped), the second LLM call is skipped and `K`'s summary is copied to
/// `""` with a zero `updated_at`, marking it as needing persistence only
/// (no further LLM call) until new events arrive.
pub async fn cascade_summarize(
    store: &dyn SessionStore,
    summarizer: &dyn Summarizer,
    session_id: Uuid,
    filter_key: &str,
    force: bool,
) -> SummarizationResult<()> {
    if filter_key.is_empty() {
        if let Some(summary) = delta_summarize(store, summarizer, session_id, "", force).await? {
            store.put_summary(session_id, "", summary).await?;
        }
        return Ok(());
    }

    let session = store
        .get_session(session_id)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;

    if every_event_matches_or_unscoped(&session, filter_key) {
        if let Some(summary) = delta_summarize(store, summarizer, session_id, filter_key, force).await? {
            store.put_summary(session_id, filter_key, summary.clone()).await?;
            store
                .put_summary(
                    session_id,
                    "",
                    Summary {
                        updated_at: epoch(),
                        ..summary
                    },
                )
                .await?;
        }
        return Ok(());
    }

    let (scoped, full) = tokio::join!(
        delta_summarize(store, summarizer, session_id, filter_key, force),
        delta_summarize(store, summarizer, session_id, "", force),
    );
    if let Some(summary) = scoped? {
        store.put_summary(session_id, filter_key, summary).await?;
    }
    if let Some(summary) = full? {
        store.put_summary(session_id, "", summary).await?;
    }
    Ok(())
}

/// `PickSummaryText(summaries, filter_key, min_time)`: the scoped summary if
/// it's fresh enough, falling back to the full-session summary, falling back
/// to `"none"`.
pub fn pick_summary_text(
    summaries: &std::collections::HashMap<String, Summary>,
    filter_key: &str,
    min_time: chrono::DateTime<chrono::Utc>,
) -> String {
    if let Some(summary) = summaries.get(filter_key) {
        if !summary.text.is_empty() && summary.updated_at >= min_time {
            return summary.text.clone();
        }
    }
    if !filter_key.is_empty() {
        if let Some(summary) = summaries.get("") {
            if !summary.text.is_empty() && summary.updated_at >= min_time {
                return summary.text.clone();
            }
        }
    }
    "none".to_string()
}
