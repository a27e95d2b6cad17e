//! Request intent and complexity analysis
//!
//! Keyword-scored classification: each intent has a keyword set, the
//! highest-scoring intent wins, ties resolve toward implementation (the
//! default). Deliberately cheap; it runs on every request before any
//! expert is involved.

use maestro_core::{Complexity, TaskIntent};
use regex::Regex;
use std::sync::OnceLock;

/// Analysis of one incoming request
#[derive(Debug, Clone, PartialEq)]
pub struct IntentAnalysis {
    pub intent: TaskIntent,
    pub complexity: Complexity,
    /// File paths mentioned in the request
    pub file_references: Vec<String>,
}

struct IntentKeywords {
    intent: TaskIntent,
    keywords: &'static [&'static str],
}

fn keyword_table() -> &'static [IntentKeywords] {
    static TABLE: OnceLock<Vec<IntentKeywords>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            IntentKeywords {
                intent: TaskIntent::Debugging,
                keywords: &[
                    "bug", "fix", "error", "crash", "broken", "fails", "failing",
                    "panic", "regression", "debug", "doesn't work", "does not work",
                ],
            },
            IntentKeywords {
                intent: TaskIntent::Refactoring,
                keywords: &[
                    "refactor", "clean up", "cleanup", "restructure", "rename",
                    "extract", "simplify", "deduplicate", "reorganize",
                ],
            },
            IntentKeywords {
                intent: TaskIntent::Research,
                keywords: &[
                    "research", "investigate", "find out", "compare", "evaluate",
                    "which library", "alternatives", "look into", "survey",
                ],
            },
            IntentKeywords {
                intent: TaskIntent::Review,
                keywords: &[
                    "review", "audit", "check this", "look over", "critique",
                    "feedback on",
                ],
            },
            IntentKeywords {
                intent: TaskIntent::Documentation,
                keywords: &[
                    "document", "docs", "readme", "changelog", "docstring",
                    "write up", "explain how",
                ],
            },
            IntentKeywords {
                intent: TaskIntent::Conceptual,
                keywords: &[
                    "design", "architecture", "approach", "strategy", "plan",
                    "how should", "what is the best way", "trade-off", "tradeoff",
                ],
            },
            IntentKeywords {
                intent: TaskIntent::Implementation,
                keywords: &[
                    "implement", "add", "create", "build", "write", "support",
                    "feature", "endpoint", "integrate",
                ],
            },
        ]
    })
}

fn file_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Paths with at least one separator or a recognizable extension
        Regex::new(r"[\w./-]+\.(?:rs|toml|md|json|yaml|yml|txt|sh|py|js|ts)\b|\b[\w-]+(?:/[\w.-]+)+")
            .unwrap()
    })
}

/// Classify a request's intent
///
/// Scores each intent by keyword hits on the lowercased request; the
/// highest score wins. Earlier table rows win ties, and a request with no
/// hits at all defaults to implementation.
pub fn classify_intent(request: &str) -> TaskIntent {
    let lower = request.to_lowercase();

    let mut best = TaskIntent::default();
    let mut best_score = 0usize;
    for entry in keyword_table() {
        let score = entry
            .keywords
            .iter()
            .filter(|keyword| lower.contains(*keyword))
            .count();
        if score > best_score {
            best = entry.intent;
            best_score = score;
        }
    }
    best
}

/// Estimate complexity from request length and structural signals
pub fn estimate_complexity(request: &str) -> Complexity {
    let words = request.split_whitespace().count();
    let files = extract_file_references(request).len();
    let lower = request.to_lowercase();
    let multi_step = ["then", "after that", "also", "additionally", "finally"]
        .iter()
        .filter(|marker| lower.contains(*marker))
        .count();

    if words > 150 || files > 3 || multi_step >= 3 {
        Complexity::Complex
    } else if words < 15 && files <= 1 && multi_step == 0 {
        Complexity::Trivial
    } else {
        Complexity::Moderate
    }
}

/// Pull file paths out of a request, deduplicated in order
pub fn extract_file_references(request: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for found in file_reference_pattern().find_iter(request) {
        let path = found.as_str().to_string();
        if !refs.contains(&path) {
            refs.push(path);
        }
    }
    refs
}

/// Full analysis of a request
pub fn analyze(request: &str) -> IntentAnalysis {
    let analysis = IntentAnalysis {
        intent: classify_intent(request),
        complexity: estimate_complexity(request),
        file_references: extract_file_references(request),
    };
    tracing::debug!(
        "Request classified: intent={} complexity={} files={}",
        analysis.intent,
        analysis.complexity,
        analysis.file_references.len()
    );
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debugging_keywords() {
        assert_eq!(
            classify_intent("fix the crash when parsing empty input"),
            TaskIntent::Debugging
        );
        assert_eq!(
            classify_intent("the login flow is broken and fails on retry"),
            TaskIntent::Debugging
        );
    }

    #[test]
    fn test_conceptual_keywords() {
        assert_eq!(
            classify_intent("what is the best way to design the caching architecture?"),
            TaskIntent::Conceptual
        );
    }

    #[test]
    fn test_research_keywords() {
        assert_eq!(
            classify_intent("investigate alternatives and compare async runtimes"),
            TaskIntent::Research
        );
    }

    #[test]
    fn test_review_keywords() {
        assert_eq!(
            classify_intent("please review this pull request and give feedback on the API"),
            TaskIntent::Review
        );
    }

    #[test]
    fn test_documentation_keywords() {
        assert_eq!(
            classify_intent("update the readme and document the new flags"),
            TaskIntent::Documentation
        );
    }

    #[test]
    fn test_refactoring_keywords() {
        assert_eq!(
            classify_intent("refactor the parser module and extract the tokenizer"),
            TaskIntent::Refactoring
        );
    }

    #[test]
    fn test_default_is_implementation() {
        assert_eq!(classify_intent("hello there"), TaskIntent::Implementation);
        assert_eq!(
            classify_intent("add a new endpoint for uploads"),
            TaskIntent::Implementation
        );
    }

    #[test]
    fn test_highest_score_wins() {
        // Two debugging hits beat one implementation hit
        assert_eq!(
            classify_intent("add logging to debug the recurring error"),
            TaskIntent::Debugging
        );
    }

    #[test]
    fn test_complexity_trivial() {
        assert_eq!(estimate_complexity("fix typo"), Complexity::Trivial);
    }

    #[test]
    fn test_complexity_moderate() {
        assert_eq!(
            estimate_complexity(
                "add retries to the upload client and make the backoff configurable \
                 through the existing settings file"
            ),
            Complexity::Moderate
        );
    }

    #[test]
    fn test_complexity_complex_from_multi_step() {
        let request = "first migrate the schema, then update the data access layer, \
                       after that adjust the API handlers, also update the client, \
                       finally write the migration guide";
        assert_eq!(estimate_complexity(request), Complexity::Complex);
    }

    #[test]
    fn test_complexity_complex_from_many_files() {
        let request = "update src/a.rs src/b.rs src/c.rs src/d.rs to the new trait";
        assert_eq!(estimate_complexity(request), Complexity::Complex);
    }

    #[test]
    fn test_file_reference_extraction() {
        let refs = extract_file_references(
            "the bug is in src/parser.rs, config lives in settings.toml, see src/parser.rs",
        );
        assert_eq!(refs, vec!["src/parser.rs", "settings.toml"]);
    }

    #[test]
    fn test_no_file_references() {
        assert!(extract_file_references("nothing path-like here").is_empty());
    }

    #[test]
    fn test_analyze_combines_fields() {
        let analysis = analyze("fix the crash in src/main.rs");
        assert_eq!(analysis.intent, TaskIntent::Debugging);
        assert_eq!(analysis.file_references, vec!["src/main.rs"]);
    }
}
