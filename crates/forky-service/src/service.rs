//! [`ConversationService`] — every operation a front-end needs.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use forky_core::messages::to_model_messages;
use forky_core::model::{ModelClient, ModelError, ModelInfo};
use forky_core::node::{AttachmentRef, Node, Role};
use forky_core::{ConversationId, NodeId};
use forky_merge::{check_eligibility, MergeEligibility, MergeExecutor};
use forky_store::{ConversationStore, SearchRow};

use crate::config::ServiceConfig;
use crate::deadline::DeadlineModelClient;
use crate::error::ServiceError;
use crate::locks::LockRegistry;
use crate::views::{ChatChunk, ChatStream, ConversationSummary, GraphView, MergeReport};

pub struct ConversationService {
    store: Arc<ConversationStore>,
    model: Arc<dyn ModelClient>,
    executor: Arc<MergeExecutor>,
    locks: LockRegistry,
    config: ServiceConfig,
}

impl ConversationService {
    pub fn new(store: ConversationStore, model: Arc<dyn ModelClient>, config: ServiceConfig) -> Self {
        Self {
            store: Arc::new(store),
            model,
            executor: Arc::new(MergeExecutor::new()),
            locks: LockRegistry::new(),
            config,
        }
    }

    fn timed_model(&self) -> DeadlineModelClient {
        DeadlineModelClient::new(Arc::clone(&self.model), self.config.model_timeout)
    }

    // ── Conversation lifecycle ────────────────────────────────────────

    pub fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ServiceError> {
        Ok(self
            .store
            .list_conversations()?
            .into_iter()
            .map(ConversationSummary::from)
            .collect())
    }

    #[instrument(skip(self))]
    pub fn create_conversation(&self, name: Option<&str>) -> Result<ConversationId, ServiceError> {
        let (record, _) = self.store.create_conversation(name)?;
        Ok(record.id)
    }

    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(id, self.config.lock_timeout).await?;
        Ok(self.store.delete_conversation(id)?)
    }

    pub async fn rename_conversation(
        &self,
        id: &ConversationId,
        name: &str,
    ) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(id, self.config.lock_timeout).await?;
        Ok(self.store.rename_conversation(id, name)?)
    }

    /// Load a conversation and mark it active (single active conversation
    /// per process, for CLI convenience).
    pub fn load_conversation(&self, id: &ConversationId) -> Result<ConversationSummary, ServiceError> {
        let (record, _) = self.store.load(id)?;
        self.store.set_active(id)?;
        let mut summary = ConversationSummary::from(record);
        summary.is_active = true;
        Ok(summary)
    }

    // ── Graph reads ───────────────────────────────────────────────────

    pub fn get_graph(&self, id: &ConversationId) -> Result<GraphView, ServiceError> {
        let (_, graph) = self.store.load(id)?;
        Ok(GraphView::from_graph(&graph))
    }

    /// Root→current history with fork markers filtered.
    pub fn get_history(&self, id: &ConversationId) -> Result<Vec<Node>, ServiceError> {
        let (_, graph) = self.store.load(id)?;
        let history = graph.history(graph.current_node_id())?;
        Ok(history.into_iter().cloned().collect())
    }

    /// ASCII rendering of the whole graph for terminal display.
    pub fn render_tree(&self, id: &ConversationId) -> Result<String, ServiceError> {
        let (_, graph) = self.store.load(id)?;
        Ok(graph.ascii_tree())
    }

    pub fn search(&self, query: &str) -> Result<Vec<SearchRow>, ServiceError> {
        Ok(self.store.search(query, self.config.search_limit)?)
    }

    pub async fn available_models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        Ok(self.timed_model().available_models().await?)
    }

    // ── Graph writes ──────────────────────────────────────────────────

    #[instrument(skip(self), fields(conversation_id = %id))]
    pub async fn checkout(
        &self,
        id: &ConversationId,
        identifier: &str,
    ) -> Result<NodeId, ServiceError> {
        let _guard = self.locks.acquire(id, self.config.lock_timeout).await?;
        let (_, mut graph) = self.store.load(id)?;
        let landed = graph.checkout(identifier)?;
        self.store.save(id, &graph)?;
        debug!(node = %landed, "checked out");
        Ok(landed)
    }

    /// Fork from the current checkout; returns the new marker id.
    #[instrument(skip(self), fields(conversation_id = %id))]
    pub async fn fork(
        &self,
        id: &ConversationId,
        branch_name: Option<String>,
    ) -> Result<NodeId, ServiceError> {
        let _guard = self.locks.acquire(id, self.config.lock_timeout).await?;
        let (_, mut graph) = self.store.load(id)?;
        let current = graph.current_node_id().clone();
        let marker = graph.fork(&current, branch_name)?;
        self.store.save(id, &graph)?;
        Ok(marker)
    }

    #[instrument(skip(self), fields(conversation_id = %id, node = %node_id))]
    pub async fn delete_node(
        &self,
        id: &ConversationId,
        node_id: &NodeId,
    ) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(id, self.config.lock_timeout).await?;
        let (_, mut graph) = self.store.load(id)?;
        graph.delete_node(node_id)?;
        self.store.save(id, &graph)?;
        Ok(())
    }

    // ── Chat ──────────────────────────────────────────────────────────

    /// Append a user turn and stream the assistant's reply.
    ///
    /// The conversation lock is held for the whole streamed turn; the
    /// user and assistant nodes are committed together once the stream
    /// ends, so a model failure persists nothing. If the caller drops the
    /// stream mid-turn, the partial assistant content accumulated so far
    /// is still committed.
    #[instrument(skip(self, message, attachments), fields(conversation_id = %id))]
    pub async fn chat(
        &self,
        id: &ConversationId,
        message: &str,
        model: Option<&str>,
        attachments: Vec<AttachmentRef>,
    ) -> Result<ChatStream, ServiceError> {
        let guard = self.locks.acquire(id, self.config.lock_timeout).await?;
        let (_, mut graph) = self.store.load(id)?;
        let model = model.unwrap_or(&self.config.default_model).to_string();

        let current = graph.current_node_id().clone();
        let user_node_id =
            graph.append_with_attachments(&current, Role::User, message, attachments)?;
        let request = to_model_messages(&graph.history(&user_node_id)?);

        // Open the provider stream before spawning so setup failures
        // surface synchronously, with nothing persisted.
        let mut chunks = self.timed_model().stream(&request, &model).await?;

        let (tx, rx) = mpsc::channel::<Result<ChatChunk, ServiceError>>(self.config.chat_buffer);
        let store = Arc::clone(&self.store);
        let conversation_id = id.clone();
        let chunk_deadline = self.config.model_timeout;

        let _task = tokio::spawn(async move {
            // Owning the guard keeps the conversation locked for the turn.
            let _guard = guard;
            let mut content = String::new();
            let mut disconnected = false;

            loop {
                match tokio::time::timeout(chunk_deadline, chunks.next()).await {
                    Err(_) => {
                        let _ = tx
                            .send(Err(ServiceError::Model(ModelError::Timeout(chunk_deadline))))
                            .await;
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "provider stream failed mid-turn, discarding");
                        let _ = tx.send(Err(ServiceError::Model(e))).await;
                        return;
                    }
                    Ok(Some(Ok(delta))) => {
                        content.push_str(&delta);
                        if !disconnected && tx.send(Ok(ChatChunk::Delta(delta))).await.is_err() {
                            // Client went away: keep what we have.
                            debug!("chat client disconnected, committing partial turn");
                            disconnected = true;
                            break;
                        }
                    }
                }
            }

            let assistant_node_id = match graph.append(&user_node_id, Role::Assistant, content) {
                Ok(node_id) => node_id,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };
            if let Err(e) = store.save(&conversation_id, &graph) {
                warn!(error = %e, "failed to commit chat turn");
                let _ = tx.send(Err(e.into())).await;
                return;
            }
            if !disconnected {
                let _ = tx.send(Ok(ChatChunk::Done { user_node_id, assistant_node_id })).await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    // ── Merge ─────────────────────────────────────────────────────────

    /// Check whether two nodes could merge, without mutating anything.
    pub fn check_merge_eligibility(
        &self,
        id: &ConversationId,
        a: &NodeId,
        b: &NodeId,
    ) -> Result<MergeEligibility, ServiceError> {
        let (_, graph) = self.store.load(id)?;
        Ok(check_eligibility(&graph, a, b)?)
    }

    /// Merge the current checkout (left) with `target_id` (right).
    ///
    /// The conversation lock is held across the whole pipeline so the
    /// graph and the checkout pointer commit atomically with respect to
    /// other writers.
    #[instrument(skip(self, merge_prompt), fields(conversation_id = %id, target = %target_id))]
    pub async fn merge_branches(
        &self,
        id: &ConversationId,
        target_id: &NodeId,
        merge_prompt: &str,
    ) -> Result<MergeReport, ServiceError> {
        let _guard = self.locks.acquire(id, self.config.lock_timeout).await?;
        let (_, mut graph) = self.store.load(id)?;

        let timed = self.timed_model();
        let outcome = self
            .executor
            .merge(&mut graph, target_id, merge_prompt, &timed, &self.config.default_model)
            .await?;
        self.store.save(id, &graph)?;

        debug!(node = %outcome.node_id, conflicts = outcome.conflicts.len(), "merge committed");
        Ok(MergeReport {
            new_node_id: outcome.node_id,
            has_conflicts: !outcome.conflicts.is_empty(),
            conflicts: outcome.conflicts,
            summarization_failed: outcome.summarization_failed,
        })
    }
}
