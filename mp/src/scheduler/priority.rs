//! Static priority pattern table
//!
//! Rules are evaluated top-down: an exact identifier match anywhere in the
//! table wins first, then the first rule whose pattern and the identifier
//! contain one another. Unmatched identifiers get the lowest priority.

use serde::{Deserialize, Serialize};

use crate::domain::Priority;

/// One `(pattern, priority)` rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRule {
    pub pattern: String,
    pub priority: Priority,
}

impl PriorityRule {
    pub fn new(pattern: impl Into<String>, priority: u8) -> Self {
        Self {
            pattern: pattern.into(),
            priority: Priority::new(priority),
        }
    }
}

/// Ordered rule list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTable {
    rules: Vec<PriorityRule>,
}

const BUILTIN_RULES: &[(&str, u8)] = &[
    // Tier 1
    ("anthropic/claude-3.5-sonnet", 1),
    ("anthropic/claude-3-opus", 1),
    ("openai/gpt-4o", 1),
    ("openai/gpt-4o-mini", 1),
    ("microsoft/phi-4", 1),
    ("meta-llama/llama-3.2-90b-vision-instruct", 1),
    // Tier 2
    ("anthropic/claude-3-haiku", 2),
    ("openai/gpt-4-turbo", 2),
    ("meta-llama/llama-3.2-11b-vision-instruct", 2),
    ("meta-llama/llama-3.1-70b-instruct", 2),
    ("mistralai/mistral-large-2407", 2),
    // Tier 3
    ("openai/gpt-4", 3),
    ("meta-llama/llama-3.1-8b-instruct", 3),
    ("microsoft/phi-3.5-mini-instruct", 3),
    ("mistralai/mistral-7b-instruct", 3),
    // Tier 4
    ("ai21labs/jamba-1.5-large", 4),
    ("cohere/command-r-plus", 4),
];

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new(
            BUILTIN_RULES
                .iter()
                .map(|(pattern, priority)| PriorityRule::new(*pattern, *priority))
                .collect(),
        )
    }
}

impl PriorityTable {
    pub fn new(rules: Vec<PriorityRule>) -> Self {
        Self { rules }
    }

    /// Built-in table unless the configuration supplies its own rules
    pub fn from_config(rules: Option<&[PriorityRule]>) -> Self {
        match rules {
            Some(rules) => Self::new(rules.to_vec()),
            None => Self::default(),
        }
    }

    /// Priority for a target identifier
    pub fn priority_for(&self, id: &str) -> Priority {
        if let Some(rule) = self.rules.iter().find(|r| r.pattern == id) {
            return rule.priority;
        }
        if id.is_empty() {
            return Priority::LOWEST;
        }
        self.rules
            .iter()
            .find(|r| !r.pattern.is_empty() && (id.contains(r.pattern.as_str()) || r.pattern.contains(id)))
            .map(|r| r.priority)
            .unwrap_or(Priority::LOWEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let table = PriorityTable::default();
        assert_eq!(table.priority_for("openai/gpt-4o-mini"), Priority::new(1));
        assert_eq!(table.priority_for("openai/gpt-4"), Priority::new(3));
        assert_eq!(table.priority_for("cohere/command-r-plus"), Priority::new(4));
    }

    #[test]
    fn test_exact_match_beats_earlier_substring() {
        // "openai/gpt-4-turbo" contains "openai/gpt-4" but its exact rule wins
        let table = PriorityTable::default();
        assert_eq!(table.priority_for("openai/gpt-4-turbo"), Priority::new(2));
    }

    #[test]
    fn test_substring_match_follows_table_order() {
        let table = PriorityTable::default();
        assert_eq!(table.priority_for("openai/gpt-4o-2024-11-20"), Priority::new(1));
        assert_eq!(table.priority_for("openai/gpt-4-turbo-preview"), Priority::new(2));
        assert_eq!(table.priority_for("openai/gpt-4-32k"), Priority::new(3));
    }

    #[test]
    fn test_identifier_inside_pattern_matches() {
        let table = PriorityTable::default();
        assert_eq!(table.priority_for("phi-4"), Priority::new(1));
    }

    #[test]
    fn test_unknown_is_lowest() {
        let table = PriorityTable::default();
        assert_eq!(table.priority_for("xai/grok-3"), Priority::LOWEST);
        assert_eq!(table.priority_for(""), Priority::LOWEST);
    }

    #[test]
    fn test_custom_rules() {
        let rules = vec![PriorityRule::new("grok", 2)];
        let table = PriorityTable::from_config(Some(&rules));
        assert_eq!(table.priority_for("xai/grok-3"), Priority::new(2));
        assert_eq!(table.priority_for("openai/gpt-4o"), Priority::LOWEST);
        assert_eq!(PriorityTable::from_config(None), PriorityTable::default());
    }
}
