use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the backend sandbox knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Python3,
    C,
    Cpp,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Python3 => "python3",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Some(Language::Python),
            "python3" => Some(Language::Python3),
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    pub fn all() -> Vec<Language> {
        vec![
            Language::Python,
            Language::Python3,
            Language::C,
            Language::Cpp,
            Language::Java,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Python3 => "Python 3",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Java => "Java",
        }
    }

    pub fn next(&self) -> Language {
        let all = Language::all();
        let idx = all.iter().position(|l| l == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /submissions/run` and `POST /submissions/submit`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock seconds reported by the sandbox
    #[serde(default)]
    pub execution_time: Option<f64>,
}

/// Response of the grading endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmissionReport {
    #[serde(default)]
    pub submission_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub tests_total: u32,
    #[serde(default)]
    pub feedback: String,
}

/// Body of `POST /chat/ask`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

/// A pointer to a knowledge document backing an assistant answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl SourceRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snippet: None,
            path: None,
        }
    }

    /// Single-line hint shown next to a selected chip
    pub fn hint(&self) -> String {
        match self.snippet.as_deref() {
            Some(s) if !s.trim().is_empty() => s.split_whitespace().collect::<Vec<_>>().join(" "),
            _ => "Enter to view".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnowledgeDocument {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Only assistant turns carry sources
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    role: ChatRole,
    text: String,
    sources: Vec<SourceRef>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>, sources: Vec<SourceRef>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
            sources,
        }
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }
}

/// Backend reachability as shown in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl Connectivity {
    pub fn label(&self) -> &'static str {
        match self {
            Connectivity::Unknown => "Checking...",
            Connectivity::Connected => "Connected",
            Connectivity::Disconnected => "Disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chip_hint_fits_on_one_line() {
        let source = SourceRef {
            snippet: Some("# Loops\n\nA `for` loop\n   repeats\twork".to_string()),
            ..SourceRef::named("loops.md")
        };
        assert_eq!(source.hint(), "# Loops A `for` loop repeats work");
        assert_eq!(SourceRef::named("loops.md").hint(), "Enter to view");
    }

    #[test]
    fn language_serializes_lowercase() {
        let req = ExecutionRequest {
            code: "print(1)".to_string(),
            language: Language::Cpp,
            lab_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"code": "print(1)", "language": "cpp"}));
    }

    #[test]
    fn lab_id_is_sent_when_configured() {
        let req = ChatRequest {
            message: "hi".to_string(),
            code: String::new(),
            lab_id: Some("lab-3".to_string()),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["lab_id"], "lab-3");
    }

    #[test]
    fn language_selector_wraps() {
        assert_eq!(Language::Java.next(), Language::Python);
        assert_eq!(Language::Python.next(), Language::Python3);
        assert_eq!(Language::from_str("C++"), Some(Language::Cpp));
        assert_eq!(Language::from_str("rust"), None);
    }

    #[test]
    fn chat_reply_tolerates_missing_and_extra_fields() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"response":"ok","sources":[{"name":"loops.md","path":"/kb/loops.md","score":0.4}]}"#,
        )
        .unwrap();
        assert_eq!(reply.sources, vec![SourceRef {
            name: "loops.md".to_string(),
            snippet: None,
            path: Some("/kb/loops.md".to_string()),
        }]);

        let bare: ChatReply = serde_json::from_str(r#"{"response":"ok"}"#).unwrap();
        assert!(bare.sources.is_empty());
    }

    #[test]
    fn user_turns_never_carry_sources() {
        let turn = ChatTurn::user("what is a loop?");
        assert_eq!(turn.role(), ChatRole::User);
        assert!(turn.sources().is_empty());
    }
}
