//! Task classifier: maps a free-text request to a task kind so the agent
//! selector can route it without the user naming an agent.

use crate::memory::store::{tokenize, PermanentStore};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Knowledge category for self-recorded classifications.
pub const CATEGORY_TASK_ROUTING: &str = "task_routing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodeModification,
    CodeReview,
    SystemLearning,
    Cybersecurity,
    Architecture,
    Research,
    Optimization,
    Debugging,
    DataAnalysis,
    Documentation,
    Unknown,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CodeModification => "code_modification",
            TaskType::CodeReview => "code_review",
            TaskType::SystemLearning => "system_learning",
            TaskType::Cybersecurity => "cybersecurity",
            TaskType::Architecture => "architecture",
            TaskType::Research => "research",
            TaskType::Optimization => "optimization",
            TaskType::Debugging => "debugging",
            TaskType::DataAnalysis => "data_analysis",
            TaskType::Documentation => "documentation",
            TaskType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "code_modification" => TaskType::CodeModification,
            "code_review" => TaskType::CodeReview,
            "system_learning" => TaskType::SystemLearning,
            "cybersecurity" => TaskType::Cybersecurity,
            "architecture" => TaskType::Architecture,
            "research" => TaskType::Research,
            "optimization" => TaskType::Optimization,
            "debugging" => TaskType::Debugging,
            "data_analysis" => TaskType::DataAnalysis,
            "documentation" => TaskType::Documentation,
            _ => TaskType::Unknown,
        }
    }
}

struct TaskPatterns {
    task_type: TaskType,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).expect("task pattern regex")).collect()
}

static PATTERN_TABLE: Lazy<Vec<TaskPatterns>> = Lazy::new(|| {
    vec![
        TaskPatterns {
            task_type: TaskType::CodeModification,
            keywords: &[
                "create", "write", "build", "implement", "modify", "update", "add", "refactor",
                "fix bug", "patch", "rewrite", "convert", "migrate", "generate code",
                "write function", "script", "implement feature", "add method",
            ],
            patterns: compile(&[
                r"(?:create|write|build|implement|modify|update).*(?:code|script|function|class|module)",
                r"(?:refactor|rewrite|convert).*(?:from|to) \w+",
                r"fix.*(?:bug|issue|error|problem)",
                r"(?:add|implement) (?:feature|functionality)",
                r"write (?:a )?(?:python|javascript|java|go|rust) (?:script|function|class)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::CodeReview,
            keywords: &[
                "review", "analyze", "explain", "understand", "read", "check", "examine",
                "audit", "inspect", "evaluate", "what does", "how does", "annotate",
            ],
            patterns: compile(&[
                r"(?:review|analyze|examine).*(?:code|script|function|class|module)",
                r"explain.*(?:code|this|that|what)",
                r"(?:what|how) (?:does|can|will).*(?:code|script|function|class)",
                r"(?:audit|inspect|evaluate).*(?:code|implementation)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::SystemLearning,
            keywords: &[
                "learn", "mistake", "i was wrong", "correction", "i realized", "update process",
                "lesson", "learned", "adjust", "refine", "remember this", "don't forget",
            ],
            patterns: compile(&[
                r"i (?:made a |was |realized )(?:mistake|error|wrong)",
                r"(?:lesson|learned|mistake).*(?:for )?(?:next time|future)",
                r"(?:update|improve|adjust|refine).*(?:process|approach|method)",
                r"don't (?:repeat|make) (?:this|that) (?:mistake|error)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::Cybersecurity,
            keywords: &[
                "security", "vulnerability", "penetration", "pentest", "breach", "exploit",
                "attack", "threat", "compliance", "encrypt", "authentication", "malware",
                "injection", "xss", "csrf",
            ],
            patterns: compile(&[
                r"(?:security|penetration|pentest|vulnerability) (?:audit|assessment|testing|scan)",
                r"(?:find|identify|discover) (?:vulnerabilities|exploits|security issues)",
                r"(?:encrypt|secure|harden).*(?:code|system|application)",
                r"(?:sanitize|validate|escape).*(?:input|data|user input)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::Architecture,
            keywords: &[
                "architecture", "design", "system design", "pattern", "structure",
                "scalability", "reliability", "microservices", "schema", "deployment",
                "infrastructure", "distributed", "tradeoff",
            ],
            patterns: compile(&[
                r"(?:design|architect).*(?:system|application|solution|infrastructure)",
                r"(?:system design|architecture).*(?:for|to handle)",
                r"(?:technology|framework) (?:choice|decision|selection)",
                r"(?:database|schema) (?:design|planning)",
                r"(?:microservices|distributed).*(?:architecture|pattern)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::Research,
            keywords: &[
                "research", "find", "look up", "investigate", "information", "statistics",
                "trend", "study", "compare", "benchmark", "survey",
            ],
            patterns: compile(&[
                r"(?:research|find|look up|investigate).*(?:about|on|regarding)",
                r"(?:compare|benchmark).*(?:vs|versus|against)",
                r"(?:find|get).*(?:information|data|statistics).*(?:about|on)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::Optimization,
            keywords: &[
                "optimize", "faster", "performance", "efficiency", "reduce", "simplify",
                "streamline", "tuning", "bottleneck", "profiling", "caching",
            ],
            patterns: compile(&[
                r"(?:optimize|improve|enhance).*(?:performance|speed|efficiency)",
                r"(?:make|be) (?:faster|more efficient|optimized)",
                r"(?:reduce|minimize).*(?:latency|overhead|memory|cpu)",
                r"(?:bottleneck|slow).*(?:part|area|section)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::Debugging,
            keywords: &[
                "debug", "problem", "error", "bug", "crash", "fail", "issue", "not working",
                "broken", "doesn't work", "what's wrong", "trace",
            ],
            patterns: compile(&[
                r"(?:debug|trace|find).*(?:bug|error|problem|issue)",
                r"(?:why|why is).*(?:failing|crashing|not working|broken)",
                r"(?:what's|what is).*(?:wrong|error|problem)",
                r"(?:error|exception|crash).*(?:message|trace|stack)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::DataAnalysis,
            keywords: &[
                "data", "analysis", "analytics", "statistics", "sql", "query", "dataset",
                "visualization", "chart", "metrics",
            ],
            patterns: compile(&[
                r"(?:analyze|process|query).*(?:data|dataset|database)",
                r"(?:create|generate).*(?:report|visualization|chart|graph).*(?:from|of)",
                r"(?:sql|query).*(?:data|table|database)",
            ]),
        },
        TaskPatterns {
            task_type: TaskType::Documentation,
            keywords: &[
                "document", "readme", "guide", "tutorial", "instruction", "docstring",
                "manual", "describe", "write about", "how to",
            ],
            patterns: compile(&[
                r"(?:document|write).*(?:code|function|class|api|module)",
                r"(?:create|write).*(?:readme|guide|tutorial|documentation)",
                r"(?:add|write).*(?:docstring|comment|explanation)",
            ]),
        },
    ]
});

/// One classification outcome with the full score table.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub task_type: TaskType,
    pub confidence: f32,
    pub scores: HashMap<TaskType, f32>,
}

pub struct TaskClassifier {
    store: Option<Arc<PermanentStore>>,
}

impl TaskClassifier {
    pub fn new(store: Option<Arc<PermanentStore>>) -> Self {
        Self { store }
    }

    /// Scores every task type by keywords (30%) and regex patterns (70%),
    /// then falls back to recent stored classifications when pattern
    /// confidence is low.
    pub fn classify(&self, task_input: &str) -> Classification {
        let normalized = task_input.trim().to_lowercase();
        if normalized.is_empty() {
            return Classification {
                task_type: TaskType::Unknown,
                confidence: 0.0,
                scores: HashMap::new(),
            };
        }

        let mut scores: HashMap<TaskType, f32> = HashMap::new();
        for table in PATTERN_TABLE.iter() {
            let keyword_matches =
                table.keywords.iter().filter(|kw| normalized.contains(*kw)).count();
            let keyword_score =
                ((keyword_matches as f32 / table.keywords.len().max(1) as f32) * 0.5).min(1.0);

            let pattern_matches =
                table.patterns.iter().filter(|p| p.is_match(&normalized)).count();
            let pattern_score =
                (pattern_matches as f32 / table.patterns.len().max(1) as f32).min(1.0);

            scores.insert(table.task_type, (keyword_score * 0.3 + pattern_score * 0.7).min(1.0));
        }

        let (mut best_type, mut best_score) = scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(t, s)| (*t, *s))
            .unwrap_or((TaskType::Unknown, 0.0));

        if best_score < 0.4 {
            if let Some((contextual_type, contextual_score)) = self.classify_from_context(&normalized) {
                if contextual_score > best_score {
                    debug!("contextual classification took over: {:?}", contextual_type);
                    best_type = contextual_type;
                    best_score = contextual_score;
                }
            }
        }

        if best_score <= 0.0 {
            best_type = TaskType::Unknown;
        }
        self.record_classification(task_input, best_type, best_score);

        Classification { task_type: best_type, confidence: best_score, scores }
    }

    /// Inherits the classification of a recent similar request when patterns
    /// were inconclusive.
    fn classify_from_context(&self, normalized: &str) -> Option<(TaskType, f32)> {
        let store = self.store.as_ref()?;
        let recent = store.recall_category(CATEGORY_TASK_ROUTING).ok()?;
        let query_tokens: HashSet<String> = tokenize(normalized).into_iter().collect();
        if query_tokens.is_empty() {
            return None;
        }

        let mut best: Option<(TaskType, f32)> = None;
        for entry in recent.iter().take(5) {
            let record: serde_json::Value = serde_json::from_str(&entry.value).ok()?;
            let task_type = record.get("task_type").and_then(|v| v.as_str()).map(TaskType::parse)?;
            let input = record.get("input").and_then(|v| v.as_str()).unwrap_or("");
            let input_tokens: HashSet<String> = tokenize(input).into_iter().collect();
            let overlap = query_tokens.intersection(&input_tokens).count();
            let relevance = overlap as f32 / query_tokens.len().max(1) as f32;
            if relevance > best.map(|(_, r)| r).unwrap_or(0.0) {
                best = Some((task_type, relevance));
            }
        }

        best.filter(|(_, relevance)| *relevance > 0.3)
            .map(|(task_type, relevance)| (task_type, relevance * 0.8))
    }

    fn record_classification(&self, input: &str, task_type: TaskType, confidence: f32) {
        if confidence <= 0.3 {
            return;
        }
        let Some(store) = self.store.as_ref() else { return };
        let truncated: String = input.chars().take(200).collect();
        let record = serde_json::json!({
            "task_type": task_type.as_str(),
            "confidence": confidence,
            "input": truncated,
        });
        let key = format!("classification_{}", Utc::now().timestamp_millis());
        let importance = if confidence > 0.7 { 7.0 } else { 5.0 };
        let _ = store.store_knowledge(
            CATEGORY_TASK_ROUTING,
            &key,
            &record.to_string(),
            importance,
            confidence,
            Some("classifier"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> TaskClassifier {
        TaskClassifier::new(None)
    }

    #[test]
    fn classifies_code_modification() {
        let result = classifier().classify("write a rust function to parse dates");
        assert_eq!(result.task_type, TaskType::CodeModification);
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn classifies_debugging() {
        let result = classifier().classify("why is my server crashing with this error message");
        assert_eq!(result.task_type, TaskType::Debugging);
    }

    #[test]
    fn classifies_security() {
        let result = classifier().classify("run a vulnerability scan and identify security issues");
        assert_eq!(result.task_type, TaskType::Cybersecurity);
    }

    #[test]
    fn empty_input_is_unknown() {
        let result = classifier().classify("   ");
        assert_eq!(result.task_type, TaskType::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn unrelated_input_scores_low() {
        let result = classifier().classify("good morning");
        assert!(result.confidence < 0.3);
    }

    #[test]
    fn contextual_fallback_inherits_recent_classification() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PermanentStore::open_path(dir.path().join("t.db")).unwrap());
        let classifier = TaskClassifier::new(Some(Arc::clone(&store)));

        // Seed a confident classification.
        let seeded = classifier.classify("debug the flaky websocket error in the gateway");
        assert_eq!(seeded.task_type, TaskType::Debugging);

        // A vague follow-up that shares tokens inherits the debugging type.
        let followup = classifier.classify("the websocket gateway again");
        assert_eq!(followup.task_type, TaskType::Debugging);
    }
}
