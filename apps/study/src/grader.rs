//! Grading oracle contract and an LLM-backed implementation.

use async_trait::async_trait;
use recall_core::Grade;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GraderConfig;
use crate::error::{GradingError, StudyError};

/// Grades a user's answer against the expected one.
#[async_trait]
pub trait GradingOracle: Send + Sync {
    /// Returns a letter grade, or an error when no grade could be obtained.
    ///
    /// A reply that is not a letter grade is returned as
    /// [`Grade::Unrecognized`], not as an error.
    async fn grade(
        &self,
        question: &str,
        expected_answer: &str,
        user_answer: &str,
    ) -> Result<Grade, GradingError>;
}

// === API Request/Response Types ===

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Grader that asks an OpenAI-compatible chat completion endpoint.
pub struct HttpGrader {
    client: Client,
    config: GraderConfig,
}

impl HttpGrader {
    pub fn new(config: GraderConfig) -> Result<Self, StudyError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StudyError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request<'a>(&'a self, question: &str, expected_answer: &str, user_answer: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "system".to_string(),
                content: grading_prompt(question, expected_answer, user_answer),
            }],
            stream: false,
        }
    }
}

#[async_trait]
impl GradingOracle for HttpGrader {
    async fn grade(
        &self,
        question: &str,
        expected_answer: &str,
        user_answer: &str,
    ) -> Result<Grade, GradingError> {
        let request = self.request(question, expected_answer, user_answer);

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GradingError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(GradingError::Backend { status, message });
        }

        let response: ChatResponse = resp
            .json()
            .await
            .map_err(|e| GradingError::Parse(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GradingError::EmptyReply)?;

        let grade = extract_grade(&content);
        tracing::debug!(reply = %content, grade = %grade, "grader replied");
        Ok(grade)
    }
}

/// System prompt asking the model for a bare letter grade.
pub fn grading_prompt(question: &str, expected_answer: &str, user_answer: &str) -> String {
    format!(
        "This is the question: {question}.\n\
         Compare correct answer: {expected_answer}\n\
         with the user answer: {user_answer}.\n\
         Return just a letter grade (A, B, C, D, F).\n\
         A being correct compared with the correct answer.\n\
         B being somewhat correct with little room for improvement compared with the correct answer.\n\
         C being neither with some room for improvement compared with the correct answer.\n\
         D being incorrect with significant room for improvement compared with the correct answer.\n\
         F being completely incorrect with complete room for improvement compared with the correct answer."
    )
}

/// Pull the first standalone letter grade out of a model reply.
///
/// Tokens are split on whitespace and stripped of surrounding punctuation, so
/// `"Grade: B."` and `"**C**"` both parse. A reply without any letter is kept
/// verbatim as an unrecognized grade.
pub fn extract_grade(reply: &str) -> Grade {
    reply
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .map(Grade::parse)
        .find(Grade::is_recognized)
        .unwrap_or_else(|| Grade::Unrecognized(reply.trim().to_string()))
}
