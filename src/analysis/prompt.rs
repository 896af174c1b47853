use serde::{Deserialize, Serialize};

use crate::analysis::types::AnalysisOperation;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const MAX_TOKENS: u32 = 2000;
pub const TEMPERATURE: f32 = 0.3;

pub fn assistant_persona() -> &'static str {
    concat!(
        "You are a helpful programming assistant that provides clear, accurate, ",
        "and practical code analysis. Always format your responses in a readable way ",
        "with proper explanations."
    )
}

pub fn instruction_for(operation: AnalysisOperation) -> &'static str {
    match operation {
        AnalysisOperation::Explain => concat!(
            "Please provide a clear, detailed explanation of how this code works. ",
            "Break down the logic, explain what each part does, and highlight any ",
            "important concepts or patterns used:"
        ),
        AnalysisOperation::Fix => concat!(
            "Please analyze this code for bugs, errors, or issues and provide a corrected ",
            "version with explanations of what was wrong and how you fixed it:"
        ),
        AnalysisOperation::Optimize => concat!(
            "Please analyze this code for performance improvements and optimization ",
            "opportunities. Provide an optimized version with explanations of the ",
            "improvements made:"
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Body of a chat-completions call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl PromptPayload {
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    model: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl PromptBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build(&self, operation: AnalysisOperation, code: &str) -> PromptPayload {
        PromptPayload {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: assistant_persona().to_string(),
                },
                ChatMessage {
                    role: ChatRole::User,
                    content: format!("{}\n\n{}", instruction_for(operation), code),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}
