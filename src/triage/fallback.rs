use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::shared::models::{Priority, TicketAnnex};

static SENTENCE_BREAK: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[.!?]\s").ok());

static SKILL_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"react|frontend|reactjs", "React"),
        (r"node|express|backend", "Node.js"),
        (r"mongo|mongodb|mongoose", "MongoDB"),
        (r"sql|postgres|mysql", "SQL"),
        (r"docker|k8s|kubernetes", "Docker"),
    ]
    .into_iter()
    .filter_map(|(pattern, skill)| Regex::new(pattern).ok().map(|re| (re, skill)))
    .collect()
});

/// Deterministic annex built from the ticket text alone.
pub fn fallback_annex(title: &str, description: &str) -> TicketAnnex {
    let text = format!("{title}. {description}");
    let text = text.trim();
    let summary = SENTENCE_BREAK
        .as_ref()
        .and_then(|re| re.split(text).next())
        .filter(|s| !s.is_empty())
        .unwrap_or(text)
        .to_string();

    let notes_source = if description.trim().is_empty() {
        title
    } else {
        description
    };

    TicketAnnex {
        summary,
        priority: Priority::Medium,
        helpful_notes: format!("Fallback analysis: {notes_source}"),
        related_skills: keyword_skills(&format!("{title} {description}")),
    }
}

/// Skills whose keyword rule matches the lowercased text, in rule order.
pub fn keyword_skills(text: &str) -> Vec<String> {
    let haystack = text.to_lowercase();
    SKILL_RULES
        .iter()
        .filter(|(re, _)| re.is_match(&haystack))
        .map(|(_, skill)| skill.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_is_first_sentence() {
        let annex = fallback_annex(
            "Login page broken",
            "The React form crashes on submit. It worked yesterday!",
        );
        assert_eq!(annex.summary, "Login page broken");
        assert_eq!(annex.priority, Priority::Medium);
        assert_eq!(
            annex.helpful_notes,
            "Fallback analysis: The React form crashes on submit. It worked yesterday!"
        );
    }

    #[test]
    fn test_keyword_rules_in_order() {
        let skills = keyword_skills("Express backend can't reach MongoDB inside Docker");
        assert_eq!(skills, vec!["Node.js", "MongoDB", "Docker"]);
    }

    #[test]
    fn test_substring_matches_count() {
        // "postgresql" contains both "sql" and "postgres"; one rule, one skill.
        assert_eq!(keyword_skills("PostgreSQL timeouts"), vec!["SQL"]);
        assert!(keyword_skills("printer jammed").is_empty());
    }

    #[test]
    fn test_blank_description_uses_title_for_notes() {
        let annex = fallback_annex("Kubernetes pod restarts", "  ");
        assert_eq!(annex.helpful_notes, "Fallback analysis: Kubernetes pod restarts");
        assert_eq!(annex.related_skills, vec!["Docker"]);
    }
}
