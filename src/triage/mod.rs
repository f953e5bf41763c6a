//! Ticket triage: one model call, JSON extraction, keyword fallback.

pub mod fallback;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::shared::models::{normalize_skills, Priority, TicketAnnex};
use crate::llm::LLMProvider;

pub use fallback::{fallback_annex, keyword_skills};

pub const SYSTEM_PROMPT: &str = "You are an expert AI assistant that processes technical support tickets.

Your job is to:
1. Summarize the issue.
2. Estimate its priority.
3. Provide helpful notes and resource links for human moderators.
4. List relevant technical skills required.

IMPORTANT:
- Respond with *only* valid raw JSON.
- Do NOT include markdown, code fences, comments, or any extra formatting.
- The format must be a raw JSON object.

Repeat: Do not wrap your output in markdown or code fences.";

static JSON_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").ok());

pub fn build_prompt(title: &str, description: &str) -> String {
    format!(
        r#"You are a ticket triage agent. Only return a strict JSON object with no extra text, headers, or markdown.

Analyze the following support ticket and provide a JSON object with:

- summary: A short 1-2 sentence summary of the issue.
- priority: One of "low", "medium", or "high".
- helpfulNotes: A detailed technical explanation that a moderator can use to solve this issue. Include useful external links or resources if possible.
- relatedSkills: An array of relevant skills required to solve the issue (e.g., ["React", "MongoDB"]).

Respond ONLY in this JSON format and do not include any other text or markdown in the answer:

{{
"summary": "Short summary of the ticket",
"priority": "high",
"helpfulNotes": "Here are useful tips...",
"relatedSkills": ["React", "Node.js"]
}}

---

Ticket information:

- Title: {title}
- Description: {description}"#
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageReport {
    pub annex: TicketAnnex,
    pub source: TriageSource,
}

/// Shape the model is asked to produce. Every field is optional so that a
/// partial answer still parses.
#[derive(Debug, Default, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, alias = "helpfulNotes")]
    helpful_notes: Option<String>,
    #[serde(default, alias = "relatedSkills")]
    related_skills: Option<Vec<String>>,
}

/// JSON text inside the model output: a ```json fence, else the trimmed
/// text, else the outermost `{...}` slice.
pub fn extract_json(raw: &str) -> Option<String> {
    if let Some(fenced) = JSON_FENCE
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
    {
        return Some(fenced.as_str().to_string());
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| trimmed[start..=end].to_string())
}

/// Parses and normalizes a model answer. `None` when no usable summary is present.
pub fn parse_annex(raw: &str) -> Option<TicketAnnex> {
    let json = extract_json(raw)?;
    let answer: ModelAnswer = match serde_json::from_str(&json) {
        Ok(answer) => answer,
        Err(e) => {
            warn!("Failed to parse JSON from AI response: {e}");
            return None;
        }
    };

    let summary = answer.summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())?;
    Some(TicketAnnex {
        summary,
        priority: Priority::normalize(answer.priority.as_deref()),
        helpful_notes: answer.helpful_notes.unwrap_or_default().trim().to_string(),
        related_skills: normalize_skills(answer.related_skills.unwrap_or_default()),
    })
}

pub struct Triage {
    provider: Option<Arc<dyn LLMProvider>>,
}

impl Triage {
    pub fn new(provider: Option<Arc<dyn LLMProvider>>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.name())
    }

    /// Never fails: any model problem yields the keyword fallback.
    pub async fn analyze_ticket(&self, title: &str, description: &str) -> TriageReport {
        let Some(provider) = &self.provider else {
            return Self::fallback(title, description);
        };

        let raw = match provider
            .generate(SYSTEM_PROMPT, &build_prompt(title, description))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error making AI request via {}: {e}", provider.name());
                return Self::fallback(title, description);
            }
        };

        match parse_annex(&raw) {
            Some(annex) => {
                info!(
                    "AI triage complete: priority={} skills={:?}",
                    annex.priority, annex.related_skills
                );
                TriageReport {
                    annex,
                    source: TriageSource::Model,
                }
            }
            None => {
                warn!("AI response had no usable JSON ({} bytes)", raw.len());
                Self::fallback(title, description)
            }
        }
    }

    fn fallback(title: &str, description: &str) -> TriageReport {
        warn!("Using local AI fallback for ticket analysis");
        TriageReport {
            annex: fallback_annex(title, description),
            source: TriageSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::MockLLMProvider;

    #[test]
    fn test_prompt_contains_ticket() {
        let prompt = build_prompt("Checkout fails", "500 on /pay");
        assert!(prompt.ends_with("- Title: Checkout fails\n- Description: 500 on /pay"));
        assert!(prompt.contains("\"relatedSkills\": [\"React\", \"Node.js\"]"));
    }

    #[test]
    fn test_extract_fenced_json() {
        let raw = "Sure!\n```JSON\n{\"summary\": \"x\"}\n```\nbye";
        assert_eq!(extract_json(raw).as_deref(), Some("{\"summary\": \"x\"}"));
    }

    #[test]
    fn test_extract_embedded_object() {
        let raw = "Here you go: {\"summary\": \"x\", \"priority\": \"low\"} hope it helps";
        assert_eq!(
            extract_json(raw).as_deref(),
            Some("{\"summary\": \"x\", \"priority\": \"low\"}")
        );
        assert_eq!(extract_json("   "), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_parse_normalizes_fields() {
        let raw = r#"{"summary":" Pods crash ","priority":"URGENT","helpfulNotes":"Check limits","relatedSkills":["Kubernetes"," ","kubernetes","Go"]}"#;
        let annex = parse_annex(raw).expect("annex");
        assert_eq!(annex.summary, "Pods crash");
        assert_eq!(annex.priority, Priority::Medium);
        assert_eq!(annex.helpful_notes, "Check limits");
        assert_eq!(annex.related_skills, vec!["Kubernetes", "Go"]);
    }

    #[test]
    fn test_parse_accepts_snake_case() {
        let raw = r#"{"summary":"s","priority":"high","helpful_notes":"n","related_skills":["SQL"]}"#;
        let annex = parse_annex(raw).expect("annex");
        assert_eq!(annex.priority, Priority::High);
        assert_eq!(annex.related_skills, vec!["SQL"]);
    }

    #[test]
    fn test_parse_rejects_missing_summary() {
        assert!(parse_annex(r#"{"priority":"high"}"#).is_none());
        assert!(parse_annex("[1,2,3]").is_none());
    }

    #[tokio::test]
    async fn test_model_answer_is_used() {
        let provider = MockLLMProvider::with_response(
            "```json\n{\"summary\":\"DB down\",\"priority\":\"high\",\"helpfulNotes\":\"restart\",\"relatedSkills\":[\"SQL\"]}\n```",
        );
        let triage = Triage::new(Some(Arc::new(provider)));
        let report = triage.analyze_ticket("DB", "down").await;

        assert_eq!(report.source, TriageSource::Model);
        assert_eq!(report.annex.summary, "DB down");
        assert_eq!(report.annex.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back() {
        let provider = MockLLMProvider::with_response("I cannot help with that.");
        let triage = Triage::new(Some(Arc::new(provider)));
        let report = triage.analyze_ticket("React app blank", "White screen").await;

        assert_eq!(report.source, TriageSource::Fallback);
        assert_eq!(report.annex.related_skills, vec!["React"]);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let triage = Triage::new(Some(Arc::new(MockLLMProvider::failing())));
        let report = triage.analyze_ticket("Mongo errors", "mongoose timeout").await;
        assert_eq!(report.source, TriageSource::Fallback);
        assert_eq!(report.annex.related_skills, vec!["MongoDB"]);
    }

    #[tokio::test]
    async fn test_no_provider_falls_back() {
        let report = Triage::new(None).analyze_ticket("Title", "Body").await;
        assert_eq!(report.source, TriageSource::Fallback);
        assert_eq!(report.annex.summary, "Title");
    }
}
