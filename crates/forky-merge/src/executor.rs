//! Orchestration of the three-way merge pipeline.
//!
//! `merge` runs entirely against the in-memory graph; the caller commits
//! the result with an atomic store save. Any failure before the final
//! insertion leaves the graph untouched, so a failed merge persists
//! nothing.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use forky_core::messages::{to_model_messages, ChatMessage};
use forky_core::model::ModelClient;
use forky_core::node::MergeMetadata;
use forky_core::state::{ConflictRecord, StateDiff, StateRecord};
use forky_core::NodeId;
use forky_graph::ConversationGraph;

use crate::classify::classify;
use crate::diff::{diff, to_prompt_json};
use crate::eligibility::check_eligibility;
use crate::error::MergeError;
use crate::summarizer::StateSummarizer;

const MERGE_SYSTEM_PROMPT: &str = "\
You are merging two branches of one conversation three-way against their \
common ancestor. Combine the baseline state with both branches' changes \
into a single coherent continuation.";

const CONFLICT_INSTRUCTION: &str = "\
Do NOT auto-resolve the conflicts listed above. Surface each one to the \
user and ask clarifying questions where needed.";

const DEGRADED_NOTE: &str = "\
Note: state summarization failed for at least one branch, so the diffs \
below may be incomplete and no conflicts were classified. Merge \
conservatively and say so.";

/// Result of a committed merge.
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    pub node_id: NodeId,
    pub conflicts: Vec<ConflictRecord>,
    /// True when the pipeline ran in structural-only mode.
    pub summarization_failed: bool,
}

/// Drives the merge pipeline. Successful branch summaries are memoized per
/// node id — node content is immutable, so a cached record never goes
/// stale.
pub struct MergeExecutor {
    summarizer: StateSummarizer,
    summary_cache: Mutex<HashMap<NodeId, StateRecord>>,
}

impl MergeExecutor {
    pub fn new() -> Self {
        Self { summarizer: StateSummarizer::new(), summary_cache: Mutex::new(HashMap::new()) }
    }

    /// Merge the conversation's current checkout (left) with `target_id`
    /// (right), appending a two-parent merge node and moving the checkout
    /// to it.
    #[instrument(skip(self, graph, client, merge_prompt), fields(target = %target_id, model))]
    pub async fn merge(
        &self,
        graph: &mut ConversationGraph,
        target_id: &NodeId,
        merge_prompt: &str,
        client: &dyn ModelClient,
        model: &str,
    ) -> Result<MergeOutcome, MergeError> {
        let current_id = graph.current_node_id().clone();

        // 1. Eligibility, which also yields the LCA.
        let eligibility = check_eligibility(graph, &current_id, target_id)?;
        if let Some(reason) = eligibility.rejection_reason {
            return Err(MergeError::Ineligible(reason));
        }
        let lca_id = eligibility.lca_id.ok_or_else(|| {
            MergeError::Graph(forky_graph::GraphError::Corrupt(
                "eligible merge reported no lca".into(),
            ))
        })?;
        debug!(lca = %lca_id, left = %current_id, "merge eligible");

        // 2–3. Summarize the three states.
        let (base, base_degraded) = self.summarize_node(graph, &lca_id, client, model).await?;
        let (left, left_degraded) = self.summarize_node(graph, &current_id, client, model).await?;
        let (right, right_degraded) = self.summarize_node(graph, target_id, client, model).await?;
        let degraded = base_degraded || left_degraded || right_degraded;

        // 4. Diff both sides against the base.
        let left_diff = diff(&base, &left);
        let right_diff = diff(&base, &right);

        // 5. Classify conflicts — skipped entirely in structural-only mode.
        let conflicts = if degraded {
            warn!("summarization degraded, skipping conflict classification");
            Vec::new()
        } else {
            classify(&left_diff, &right_diff)
        };

        // 6–7. Synthesize the merge request and run the final completion.
        let request = build_merge_request(
            &base,
            &left_diff,
            &right_diff,
            &conflicts,
            merge_prompt,
            degraded,
        );
        let content = client.complete(&request, model).await?;

        // 8. Insert the merge node; the caller persists atomically.
        let node_id = graph.insert_merge(
            content,
            MergeMetadata {
                lca_id,
                left_parent_id: current_id,
                right_parent_id: target_id.clone(),
                conflicts: conflicts.clone(),
            },
        )?;
        debug!(node = %node_id, conflicts = conflicts.len(), "merge node created");

        Ok(MergeOutcome { node_id, conflicts, summarization_failed: degraded })
    }

    async fn summarize_node(
        &self,
        graph: &ConversationGraph,
        id: &NodeId,
        client: &dyn ModelClient,
        model: &str,
    ) -> Result<(StateRecord, bool), MergeError> {
        if let Some(cached) = self.summary_cache.lock().get(id) {
            return Ok((cached.clone(), false));
        }
        let history = graph.history(id)?;
        let messages = to_model_messages(&history);
        let outcome = self.summarizer.summarize(&messages, client, model).await?;
        if !outcome.degraded {
            let _ = self.summary_cache.lock().insert(id.clone(), outcome.record.clone());
        }
        Ok((outcome.record, outcome.degraded))
    }
}

impl Default for MergeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_merge_request(
    base: &StateRecord,
    left_diff: &StateDiff,
    right_diff: &StateDiff,
    conflicts: &[ConflictRecord],
    merge_prompt: &str,
    degraded: bool,
) -> Vec<ChatMessage> {
    let mut body = format!(
        "<base_state>\n{}\n</base_state>\n\n<left_branch_changes>\n{}\n</left_branch_changes>\n\n<right_branch_changes>\n{}\n</right_branch_changes>",
        serde_json::to_string_pretty(base).unwrap_or_else(|_| "{}".into()),
        serde_json::to_string_pretty(&to_prompt_json(left_diff)).unwrap_or_else(|_| "{}".into()),
        serde_json::to_string_pretty(&to_prompt_json(right_diff)).unwrap_or_else(|_| "{}".into()),
    );

    if !conflicts.is_empty() {
        let rendered: Vec<String> = conflicts
            .iter()
            .map(|c| {
                format!(
                    "- [{}] {}: left: {} | right: {}",
                    c.kind.as_str(),
                    c.category,
                    c.left_item,
                    c.right_item
                )
            })
            .collect();
        body.push_str(&format!(
            "\n\n<conflicts>\n{}\n</conflicts>\n\n{CONFLICT_INSTRUCTION}",
            rendered.join("\n")
        ));
    }
    if degraded {
        body.push_str(&format!("\n\n{DEGRADED_NOTE}"));
    }
    if !merge_prompt.trim().is_empty() {
        body.push_str(&format!("\n\nUser instruction for this merge: {merge_prompt}"));
    }

    vec![ChatMessage::system(MERGE_SYSTEM_PROMPT), ChatMessage::user(body)]
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use forky_core::mock::{MockModelClient, MockReply};
    use forky_core::model::ModelError;
    use forky_core::node::Role;
    use forky_core::state::ConflictKind;
    use serde_json::json;

    /// Build: root → base("context") → two branches, returning the tips.
    /// Current checkout is the left tip.
    fn divergent_graph() -> (ConversationGraph, NodeId, NodeId, NodeId) {
        let mut graph = ConversationGraph::new();
        let root = graph.root_id().clone();
        let base = graph.append(&root, Role::User, "shared context").unwrap();
        let left = graph.append(&base, Role::User, "left direction").unwrap();
        let right = graph.append(&base, Role::User, "right direction").unwrap();
        let _ = graph.checkout(left.as_str()).unwrap();
        (graph, base, left, right)
    }

    fn summary(facts: &[&str]) -> MockReply {
        MockReply::json(&json!({
            "facts": facts,
            "decisions": [],
            "open_questions": [],
            "assumptions": [],
            "topic": "test"
        }))
    }

    fn decisions(items: &[&str]) -> MockReply {
        MockReply::json(&json!({
            "facts": [],
            "decisions": items,
            "open_questions": [],
            "assumptions": [],
            "topic": "test"
        }))
    }

    #[tokio::test]
    async fn disjoint_additions_merge_without_conflicts() {
        let (mut graph, base, left, right) = divergent_graph();
        // Summaries arrive in pipeline order: lca, left, right, then the
        // final merged completion.
        let mock = MockModelClient::new(vec![
            summary(&["x=1"]),
            summary(&["x=1", "y=2"]),
            summary(&["x=1", "z=3"]),
            MockReply::text("merged: x=1, y=2, z=3"),
        ]);

        let outcome = MergeExecutor::new()
            .merge(&mut graph, &right, "", &mock, "mock-model")
            .await
            .unwrap();

        assert!(outcome.conflicts.is_empty());
        assert!(!outcome.summarization_failed);

        let node = graph.node(&outcome.node_id).unwrap();
        assert_eq!(node.parent_ids, vec![left.clone(), right.clone()]);
        let meta = node.merge_metadata.as_ref().unwrap();
        assert_eq!(meta.lca_id, base);
        assert_eq!(meta.left_parent_id, left);
        assert_eq!(meta.right_parent_id, right);
        assert!(meta.conflicts.is_empty());
        assert_eq!(node.content, "merged: x=1, y=2, z=3");
        assert_eq!(graph.current_node_id(), &outcome.node_id);
        graph.validate().unwrap();
    }

    #[tokio::test]
    async fn both_modified_decision_is_reported() {
        let (mut graph, _, _, right) = divergent_graph();
        let mock = MockModelClient::new(vec![
            decisions(&["we will use a database (tbd)"]),
            decisions(&["we will use a database postgres"]),
            decisions(&["we will use a database sqlite"]),
            MockReply::text("the branches disagree about the database"),
        ]);

        let outcome = MergeExecutor::new()
            .merge(&mut graph, &right, "", &mock, "mock-model")
            .await
            .unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::BothModified);
        assert_eq!(conflict.category.as_str(), "decisions");

        // The conflict rides along in the persisted metadata and in the
        // prompt for the final completion.
        let node = graph.node(&outcome.node_id).unwrap();
        assert_eq!(node.merge_metadata.as_ref().unwrap().conflicts.len(), 1);
        let final_request = mock.requests().last().unwrap().clone();
        assert!(final_request[1].content().contains("<conflicts>"));
        assert!(final_request[1].content().contains("Do NOT auto-resolve"));
    }

    #[tokio::test]
    async fn ineligible_merge_makes_no_model_calls() {
        let (mut graph, base, _, _) = divergent_graph();
        let mock = MockModelClient::new(vec![]);
        let before = graph.len();

        // The current checkout descends from `base`.
        let err = MergeExecutor::new()
            .merge(&mut graph, &base, "", &mock, "mock-model")
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), "cannot_merge_ancestor_with_descendant");
        assert_eq!(mock.call_count(), 0);
        assert_eq!(graph.len(), before, "a failed merge must not change the graph");
    }

    #[tokio::test]
    async fn summarization_failure_degrades_to_structural_only() {
        let (mut graph, _, _, right) = divergent_graph();
        // Every summary attempt (3 states × 2 tries) is unparseable; the
        // final completion still runs.
        let mut replies: Vec<MockReply> =
            (0..6).map(|i| MockReply::text(format!("garbage {i}"))).collect();
        replies.push(MockReply::text("merged conservatively"));
        let mock = MockModelClient::new(replies);

        let outcome = MergeExecutor::new()
            .merge(&mut graph, &right, "", &mock, "mock-model")
            .await
            .unwrap();

        assert!(outcome.summarization_failed);
        assert!(outcome.conflicts.is_empty(), "structural-only mode classifies nothing");
        let final_request = mock.requests().last().unwrap().clone();
        assert!(final_request[1].content().contains("state summarization failed"));
    }

    #[tokio::test]
    async fn model_transport_error_aborts_without_a_node() {
        let (mut graph, _, _, right) = divergent_graph();
        let mock = MockModelClient::new(vec![
            summary(&["x=1"]),
            MockReply::Error(ModelError::Timeout(std::time::Duration::from_secs(30))),
        ]);
        let before = graph.len();
        let current = graph.current_node_id().clone();

        let err = MergeExecutor::new()
            .merge(&mut graph, &right, "", &mock, "mock-model")
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), "model_timeout");
        assert_eq!(graph.len(), before);
        assert_eq!(graph.current_node_id(), &current);
    }

    #[tokio::test]
    async fn branch_summaries_are_cached_across_merges() {
        let (mut graph, _, left, right) = divergent_graph();
        let executor = MergeExecutor::new();
        let mock = MockModelClient::new(vec![
            summary(&["x=1"]),
            summary(&["x=1", "y=2"]),
            summary(&["x=1", "z=3"]),
            MockReply::text("first merge"),
        ]);
        let first = executor.merge(&mut graph, &right, "", &mock, "mock-model").await.unwrap();
        assert_eq!(mock.call_count(), 4);

        // Merge the fresh right-side tip into the merge node. The LCA of
        // that pair is the old right tip, whose summary is cached, so only
        // the merge node and the fresh tip are summarized (two calls) plus
        // the final completion.
        let _ = graph.checkout(first.node_id.as_str()).unwrap();
        let fresh = graph.append(&right, Role::User, "more on the right").unwrap();
        let _ = graph.checkout(first.node_id.as_str()).unwrap();
        mock.push_reply(summary(&["x=1", "y=2", "z=3"]));
        mock.push_reply(summary(&["x=1", "z=3", "w=4"]));
        mock.push_reply(MockReply::text("second merge"));

        let second = executor.merge(&mut graph, &fresh, "", &mock, "mock-model").await.unwrap();
        assert_eq!(mock.call_count(), 7, "cached left/right summaries must be reused");
        assert!(graph.node(&second.node_id).unwrap().is_merge());
        graph.validate().unwrap();
    }

    #[tokio::test]
    async fn user_merge_prompt_reaches_the_model() {
        let (mut graph, _, _, right) = divergent_graph();
        let mock = MockModelClient::new(vec![
            summary(&[]),
            summary(&["y=2"]),
            summary(&["z=3"]),
            MockReply::text("done"),
        ]);
        let _ = MergeExecutor::new()
            .merge(&mut graph, &right, "prefer the left branch's tone", &mock, "mock-model")
            .await
            .unwrap();
        let final_request = mock.requests().last().unwrap().clone();
        assert!(final_request[1].content().contains("prefer the left branch's tone"));
    }
}
