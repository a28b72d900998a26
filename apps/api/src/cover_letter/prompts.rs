// Prompt text for the cover-letter assistant.

/// Name of the per-request vector store holding the résumé.
pub const VECTOR_STORE_NAME: &str = "Job helper";

pub const ASSISTANT_NAME: &str = "Job Review Expert";

pub const ASSISTANT_INSTRUCTIONS: &str = "You are an expert job reviewer. \
    Use your knowledge to create the perfect cover letter based on the resume and job description.";

/// Seed message for the conversation thread. `{job_text}` is replaced with the posting.
pub const JOB_MESSAGE_TEMPLATE: &str = "Here are the requirements for this job: {job_text}";

pub fn job_message(job_text: &str) -> String {
    JOB_MESSAGE_TEMPLATE.replace("{job_text}", job_text)
}
