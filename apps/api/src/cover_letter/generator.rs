//! Cover letter generation: the narrow seam between the HTTP handler and the provider.
//!
//! Flow (AssistantCoverLetterGenerator): upload file → create vector store →
//!       attach + wait for indexing → create assistant → create thread →
//!       run to completion → read the run's first reply.
//!
//! Every step depends on the id returned by the previous one. The first failure
//! aborts the whole request; nothing is retried.
//!
//! `AppState` holds an `Arc<dyn CoverLetterGenerator>`, so tests swap in mocks
//! without reproducing the provider's API shape.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::cover_letter::prompts::{
    job_message, ASSISTANT_INSTRUCTIONS, ASSISTANT_NAME, VECTOR_STORE_NAME,
};
use crate::errors::AppError;
use crate::llm_client::assistants::{AssistantSpec, MessageList, Run, RunStatus};
use crate::llm_client::{LlmClient, LlmError};
use crate::uploads::StagedUpload;

#[async_trait]
pub trait CoverLetterGenerator: Send + Sync {
    /// Produces cover-letter text for the staged résumé and the job posting text.
    async fn generate(&self, resume: &StagedUpload, job_text: &str) -> Result<String, AppError>;
}

/// Provider-backed generator built on the Assistants API with file search.
pub struct AssistantCoverLetterGenerator {
    llm: LlmClient,
}

impl AssistantCoverLetterGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CoverLetterGenerator for AssistantCoverLetterGenerator {
    async fn generate(&self, resume: &StagedUpload, job_text: &str) -> Result<String, AppError> {
        let file = self
            .llm
            .upload_file(resume.path(), resume.original_name())
            .await?;
        info!("Uploaded résumé as file {}", file.id);

        let vector_store = self.llm.create_vector_store(VECTOR_STORE_NAME).await?;
        info!("Created vector store {}", vector_store.id);

        let attached = self
            .llm
            .create_vector_store_file(&vector_store.id, &file.id)
            .await?;
        let attached = self.llm.poll_vector_store_file(attached).await?;
        info!(
            "Attached file {} to vector store {}",
            attached.id, attached.vector_store_id
        );

        let assistant = self
            .llm
            .create_assistant(&AssistantSpec {
                name: ASSISTANT_NAME,
                instructions: ASSISTANT_INSTRUCTIONS,
                vector_store_id: &attached.vector_store_id,
            })
            .await?;
        info!("Created assistant {}", assistant.id);

        let thread = self.llm.create_thread(&job_message(job_text)).await?;
        info!("Created thread {}", thread.id);

        let run = self
            .llm
            .create_run_and_poll(&thread.id, &assistant.id)
            .await?;
        ensure_completed(&run)?;
        info!("Run {} completed", run.id);

        let messages = self.llm.list_run_messages(&thread.id, &run.id).await?;
        let reply = first_reply(&messages)?;
        debug!("Generated cover letter ({} chars)", reply.len());

        Ok(reply)
    }
}

/// Any terminal status other than `completed` fails the request.
fn ensure_completed(run: &Run) -> Result<(), LlmError> {
    if run.status == RunStatus::Completed {
        return Ok(());
    }
    let detail = run
        .last_error
        .as_ref()
        .map(|e| format!(": {}", e.message))
        .unwrap_or_default();
    Err(LlmError::RunFailed(format!(
        "run {} ended with status {}{detail}",
        run.id,
        run.status.as_str()
    )))
}

/// The reply is the first text block of the newest message the run produced.
/// A block holding only whitespace counts as no reply.
fn first_reply(messages: &MessageList) -> Result<String, LlmError> {
    let message = messages.data.first().ok_or(LlmError::EmptyContent)?;
    let text = message
        .first_text()
        .filter(|text| !text.trim().is_empty())
        .ok_or(LlmError::EmptyContent)?;
    debug!("Reply taken from message {}", message.id);
    Ok(text.to_string())
}
