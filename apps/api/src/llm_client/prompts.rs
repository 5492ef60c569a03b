//! Prompt assembly for resume-grounded chat.

use serde_json::Value;

use crate::llm_client::ChatMessage;
use crate::models::chat::{ChatMessageRow, ROLE_USER};

pub const CHAT_SYSTEM: &str = "You are a helpful resume assistant. \
    Analyze the resume structure and suggest improvements \
    based on job-fit, skill gaps, and clarity. Your output should be UI-friendly.";

/// Number of prior history messages included in each completion request.
const HISTORY_WINDOW: usize = 8;

/// Builds the full message list for a completion request: system prompt,
/// the last `HISTORY_WINDOW` history messages, then the new user message
/// with a summary of the parsed resume appended.
pub fn build_chat_messages(
    parsed_data: &Value,
    history: &[ChatMessageRow],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new("system", CHAT_SYSTEM)];

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    for item in &history[start..] {
        let role = if item.message_type == ROLE_USER {
            "user"
        } else {
            "assistant"
        };
        messages.push(ChatMessage::new(role, item.content.clone()));
    }

    let summary = summarize_resume(parsed_data);
    messages.push(ChatMessage::new(
        "user",
        format!("{user_message}\n\nResume Summary:\n{summary}"),
    ));

    messages
}

/// Renders the parsed resume fields the assistant is grounded on:
/// name, summary, positions held, and programming languages.
pub fn summarize_resume(parsed_data: &Value) -> String {
    let name = parsed_data
        .pointer("/contact_info/full_name")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown");
    let summary = parsed_data
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let positions = collect_strings(parsed_data.get("work_experience"), "position");
    let skills = collect_strings(
        parsed_data.pointer("/technical_skills/programming_languages"),
        "name",
    );

    format!(
        "Name: {name}\nSummary: {summary}\nExperience: {}\nSkills: {}",
        positions.join(", "),
        skills.join(", ")
    )
}

fn collect_strings(array: Option<&Value>, field: &str) -> Vec<String> {
    array
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field).and_then(|v| v.as_str()).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ROLE_ASSISTANT;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn history_row(message_type: &str, content: &str) -> ChatMessageRow {
        ChatMessageRow {
            id: Uuid::new_v4(),
            resume_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            message_type: message_type.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn sample_resume() -> Value {
        json!({
            "contact_info": { "full_name": "Ada Lovelace" },
            "summary": "Engineer and writer.",
            "work_experience": [
                { "position": "Analyst" },
                { "position": "Engineer" }
            ],
            "technical_skills": {
                "programming_languages": [
                    { "name": "Rust" },
                    { "name": "Python" }
                ]
            }
        })
    }

    #[test]
    fn test_summarize_resume_includes_all_fields() {
        let summary = summarize_resume(&sample_resume());
        assert!(summary.contains("Name: Ada Lovelace"));
        assert!(summary.contains("Summary: Engineer and writer."));
        assert!(summary.contains("Analyst, Engineer"));
        assert!(summary.contains("Rust, Python"));
    }

    #[test]
    fn test_summarize_resume_tolerates_missing_fields() {
        let summary = summarize_resume(&json!({}));
        assert!(summary.contains("Name: Unknown"));
        assert!(summary.contains("Experience: \n"));
    }

    #[test]
    fn test_history_window_keeps_last_eight() {
        let history: Vec<_> = (0..12)
            .map(|i| {
                let role = if i % 2 == 0 { ROLE_USER } else { ROLE_ASSISTANT };
                history_row(role, &format!("message {i}"))
            })
            .collect();

        let messages = build_chat_messages(&sample_resume(), &history, "final question");

        // system + 8 history + new user message
        assert_eq!(messages.len(), 10);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "message 4");
        assert!(messages.last().unwrap().content.starts_with("final question"));
    }

    #[test]
    fn test_final_message_carries_resume_summary() {
        let messages = build_chat_messages(&sample_resume(), &[], "How can I improve?");
        assert_eq!(messages.len(), 2);
        let last = &messages.last().unwrap().content;
        assert!(last.contains("Resume Summary:"));
        assert!(last.contains("Ada Lovelace"));
    }

    #[test]
    fn test_unknown_roles_map_to_assistant() {
        let history = vec![history_row("system_note", "hello")];
        let messages = build_chat_messages(&sample_resume(), &history, "q");
        assert_eq!(messages[1].role, "assistant");
    }
}
