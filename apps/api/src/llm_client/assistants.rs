//! Assistants v2 endpoints: files, vector stores, assistants, threads, runs, messages.
//!
//! Only the fields the cover-letter flow reads are modelled; everything else the
//! provider returns is ignored on deserialization.

use std::path::Path;

use reqwest::{
    multipart::{Form, Part},
    Method,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LlmClient, LlmError, MODEL};

// ────────────────────────────────────────────────────────────────────────────
// Response models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStore {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreFileStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    pub vector_store_id: String,
    pub status: VectorStoreFileStatus,
    #[serde(default)]
    pub last_error: Option<LastError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Statuses after which the provider will not advance the run on its own.
    /// An unrecognised status stops polling too; the caller reports it.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::RequiresAction
                | RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Completed
                | RunStatus::Incomplete
                | RunStatus::Expired
                | RunStatus::Unknown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<LastError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    pub data: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub value: String,
}

impl ThreadMessage {
    /// Text of the first text content block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            MessageContent::Text { text } => Some(text.value.as_str()),
            MessageContent::Other => None,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateVectorStoreRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateVectorStoreFileRequest<'a> {
    file_id: &'a str,
}

/// Parameters for a retrieval-backed assistant.
#[derive(Debug, Clone)]
pub struct AssistantSpec<'a> {
    pub name: &'a str,
    pub instructions: &'a str,
    pub vector_store_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
    tools: Vec<AssistantTool>,
    tool_resources: ToolResources<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AssistantTool {
    FileSearch,
}

#[derive(Debug, Serialize)]
struct ToolResources<'a> {
    file_search: FileSearchResources<'a>,
}

#[derive(Debug, Serialize)]
struct FileSearchResources<'a> {
    vector_store_ids: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreateThreadRequest<'a> {
    messages: Vec<NewMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct NewMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

// ────────────────────────────────────────────────────────────────────────────
// Endpoints
// ────────────────────────────────────────────────────────────────────────────

impl LlmClient {
    /// POST /files: uploads the file at `path` with purpose `assistants`.
    pub async fn upload_file(&self, path: &Path, file_name: &str) -> Result<FileObject, LlmError> {
        let bytes = tokio::fs::read(path).await?;
        debug!("Uploading {file_name} ({} bytes)", bytes.len());

        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        self.send(self.request(Method::POST, "files").multipart(form))
            .await
    }

    /// POST /vector_stores
    pub async fn create_vector_store(&self, name: &str) -> Result<VectorStore, LlmError> {
        self.send(
            self.request(Method::POST, "vector_stores")
                .json(&CreateVectorStoreRequest { name }),
        )
        .await
    }

    /// POST /vector_stores/{id}/files: attaches an uploaded file to a vector store.
    pub async fn create_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, LlmError> {
        self.send(
            self.request(Method::POST, &format!("vector_stores/{vector_store_id}/files"))
                .json(&CreateVectorStoreFileRequest { file_id }),
        )
        .await
    }

    /// Waits until an attached file has been indexed.
    /// `failed` and `cancelled` attachments are errors.
    pub async fn poll_vector_store_file(
        &self,
        attached: VectorStoreFile,
    ) -> Result<VectorStoreFile, LlmError> {
        let file = if attached.status == VectorStoreFileStatus::InProgress {
            let path = format!(
                "vector_stores/{}/files/{}",
                attached.vector_store_id, attached.id
            );
            self.poll_until(
                &format!("vector store file {}", attached.id),
                || self.send_with_headers(self.request(Method::GET, &path)),
                |f: &VectorStoreFile| f.status != VectorStoreFileStatus::InProgress,
            )
            .await?
        } else {
            attached
        };

        match file.status {
            VectorStoreFileStatus::Failed | VectorStoreFileStatus::Cancelled => {
                let detail = file
                    .last_error
                    .as_ref()
                    .map(|e| format!(": {}", e.message))
                    .unwrap_or_default();
                Err(LlmError::IndexingFailed(format!(
                    "indexing of file {} did not complete{detail}",
                    file.id
                )))
            }
            _ => Ok(file),
        }
    }

    /// POST /assistants: creates a `file_search` assistant bound to one vector store.
    pub async fn create_assistant(&self, spec: &AssistantSpec<'_>) -> Result<Assistant, LlmError> {
        let body = CreateAssistantRequest {
            name: spec.name,
            instructions: spec.instructions,
            model: MODEL,
            tools: vec![AssistantTool::FileSearch],
            tool_resources: ToolResources {
                file_search: FileSearchResources {
                    vector_store_ids: vec![spec.vector_store_id],
                },
            },
        };

        self.send(self.request(Method::POST, "assistants").json(&body))
            .await
    }

    /// POST /threads: opens a thread seeded with a single user message.
    pub async fn create_thread(&self, user_message: &str) -> Result<Thread, LlmError> {
        let body = CreateThreadRequest {
            messages: vec![NewMessage {
                role: "user",
                content: user_message,
            }],
        };

        self.send(self.request(Method::POST, "threads").json(&body))
            .await
    }

    /// POST /threads/{id}/runs
    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, LlmError> {
        self.send(
            self.request(Method::POST, &format!("threads/{thread_id}/runs"))
                .json(&CreateRunRequest { assistant_id }),
        )
        .await
    }

    /// Creates a run and polls it until it reaches a terminal status.
    /// The run is returned whatever that status is; callers decide what counts as success.
    pub async fn create_run_and_poll(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<Run, LlmError> {
        let run = self.create_run(thread_id, assistant_id).await?;
        if run.status.is_terminal() {
            return Ok(run);
        }

        let path = format!("threads/{thread_id}/runs/{}", run.id);
        self.poll_until(
            &format!("run {}", run.id),
            || self.send_with_headers(self.request(Method::GET, &path)),
            |r: &Run| r.status.is_terminal(),
        )
        .await
    }

    /// GET /threads/{id}/messages?run_id=…: messages produced by one run, newest first.
    pub async fn list_run_messages(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<MessageList, LlmError> {
        self.send(
            self.request(Method::GET, &format!("threads/{thread_id}/messages"))
                .query(&[("run_id", run_id)]),
        )
        .await
    }
}
