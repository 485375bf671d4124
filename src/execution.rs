use crate::api::LabApi;
use crate::error::ApiError;
use crate::state::{ExecutionRequest, ExecutionResult, Language, SubmissionReport};

pub const OUTPUT_PLACEHOLDER: &str = "Output will appear here...";
pub const EMPTY_CODE_PROMPT: &str = "Please enter some code to run.";
pub const RUNNING_OUTPUT: &str = "Executing code...";
pub const NO_OUTPUT: &str = "(No output)";
pub const GENERIC_FAILURE: &str = "Execution failed";

/// Sample program loaded into the editor at startup
pub const SAMPLE_CODE: &str = r#"# Sample Python Code
# Press Ctrl+R (or Ctrl+Enter) to execute

def greet(name):
    return f"Hello, {name}!"

for i in range(3):
    print(greet(f"Student {i+1}"))
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

pub struct ExecutionPanel {
    status: RunStatus,
    label: String,
    output: String,
    running: bool,
    pub language: Language,
    lab_id: Option<String>,
    server: String,
}

impl ExecutionPanel {
    pub fn new(language: Language, lab_id: Option<String>, server: &str) -> Self {
        Self {
            status: RunStatus::Idle,
            label: String::new(),
            output: OUTPUT_PLACEHOLDER.to_string(),
            running: false,
            language,
            lab_id,
            server: server.to_string(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn status_label(&self) -> &str {
        &self.label
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// The run action is disabled while a request is in flight
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cycle_language(&mut self) {
        self.language = self.language.next();
    }

    fn request_for(&self, code: &str) -> Option<ExecutionRequest> {
        if self.running || code.trim().is_empty() {
            return None;
        }
        Some(ExecutionRequest {
            code: code.to_string(),
            language: self.language,
            lab_id: self.lab_id.clone(),
        })
    }

    fn set_running(&mut self) {
        self.status = RunStatus::Running;
        self.label = "Running...".to_string();
        self.output = RUNNING_OUTPUT.to_string();
        self.running = true;
    }

    /// Start a run. Returns the request to send, or `None` when the editor is
    /// blank (a prompt is shown instead) or a run is already in flight.
    pub fn begin_run(&mut self, code: &str) -> Option<ExecutionRequest> {
        if !self.running && code.trim().is_empty() {
            self.output = EMPTY_CODE_PROMPT.to_string();
            return None;
        }
        let request = self.request_for(code)?;
        self.set_running();
        Some(request)
    }

    /// Apply the outcome of a run. Always re-enables the run action.
    pub fn finish_run(&mut self, outcome: Result<ExecutionResult, ApiError>) {
        self.running = false;

        match outcome {
            Ok(result) => self.show_result(&result),
            Err(err) => self.show_connection_error(&err),
        }
    }

    fn show_result(&mut self, result: &ExecutionResult) {
        let output = result.output.as_deref().filter(|s| !s.is_empty());
        let error = result.error.as_deref().filter(|s| !s.is_empty());

        if result.success {
            self.status = RunStatus::Success;
            self.label = "Success".to_string();
            self.output = output.unwrap_or(NO_OUTPUT).to_string();
        } else {
            self.status = RunStatus::Error;
            self.label = "Error".to_string();
            self.output = error.or(output).unwrap_or(GENERIC_FAILURE).to_string();
        }

        if let Some(seconds) = result.execution_time {
            self.label.push_str(&format!(" ({:.2}s)", seconds));
        }
    }

    fn show_connection_error(&mut self, err: &ApiError) {
        self.status = RunStatus::Error;
        self.label = "Error".to_string();
        self.output = match err {
            ApiError::Status { detail: Some(detail), .. } => detail.clone(),
            _ => format!(
                "Failed to connect to API: {}\n\nMake sure the backend is running at {}",
                err, self.server
            ),
        };
    }

    /// Start a grading submission; same guards as [`begin_run`](Self::begin_run)
    pub fn begin_submit(&mut self, code: &str) -> Option<ExecutionRequest> {
        if !self.running && code.trim().is_empty() {
            self.output = EMPTY_CODE_PROMPT.to_string();
            return None;
        }
        let request = self.request_for(code)?;
        self.set_running();
        self.label = "Submitting...".to_string();
        Some(request)
    }

    pub fn finish_submit(&mut self, outcome: Result<SubmissionReport, ApiError>) {
        self.running = false;

        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                self.show_connection_error(&err);
                return;
            }
        };

        let run_ok = report.execution_result.as_ref().map_or(true, |r| r.success);
        self.status = if run_ok { RunStatus::Success } else { RunStatus::Error };
        self.label = if report.status.is_empty() {
            "Submitted".to_string()
        } else {
            format!("Submitted ({})", report.status)
        };

        let mut output = format!(
            "Tests passed: {}/{}\n{}",
            report.tests_passed, report.tests_total, report.feedback
        );
        if let Some(result) = &report.execution_result {
            let run_output = if result.success {
                result.output.as_deref()
            } else {
                result.error.as_deref().or(result.output.as_deref())
            };
            if let Some(text) = run_output.filter(|s| !s.is_empty()) {
                output.push_str("\n\n");
                output.push_str(text);
            }
        }
        self.output = output;
    }

    /// Reset output and status; the caller empties the editor
    pub fn clear(&mut self) {
        self.status = RunStatus::Idle;
        self.label.clear();
        self.output = OUTPUT_PLACEHOLDER.to_string();
    }

    /// Run `code` end to end against `api`
    pub async fn run(&mut self, api: &dyn LabApi, code: &str) {
        let Some(request) = self.begin_run(code) else {
            return;
        };
        let outcome = api.run_code(&request).await;
        self.finish_run(outcome);
    }

    pub async fn submit(&mut self, api: &dyn LabApi, code: &str) {
        let Some(request) = self.begin_submit(code) else {
            return;
        };
        let outcome = api.submit_code(&request).await;
        self.finish_submit(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use reqwest::StatusCode;

    fn panel() -> ExecutionPanel {
        ExecutionPanel::new(Language::Python, None, "http://localhost:8000")
    }

    #[tokio::test]
    async fn successful_run_shows_output_and_time() {
        let api = FakeApi {
            run_result: Some(ExecutionResult {
                success: true,
                output: Some("1\n".to_string()),
                error: None,
                execution_time: Some(0.01),
            }),
            ..FakeApi::default()
        };
        let mut panel = panel();

        panel.run(&api, "print(1)").await;

        assert_eq!(panel.status(), RunStatus::Success);
        assert!(panel.status_label().ends_with("Success (0.01s)"));
        assert_eq!(panel.output(), "1\n");
        assert!(!panel.is_running());
    }

    #[tokio::test]
    async fn network_failure_still_reenables_run() {
        let api = FakeApi::offline();
        let mut panel = panel();

        panel.run(&api, "print(1)").await;

        assert_eq!(panel.status(), RunStatus::Error);
        assert_eq!(panel.status_label(), "Error");
        assert!(panel.output().starts_with("Failed to connect to API: connection refused"));
        assert!(panel.output().contains("http://localhost:8000"));
        assert!(!panel.is_running());
    }

    #[tokio::test]
    async fn blank_code_never_reaches_backend() {
        let api = FakeApi::offline();
        let mut panel = panel();

        panel.run(&api, "   \n\t").await;

        assert_eq!(api.call_count(), 0);
        assert_eq!(panel.status(), RunStatus::Idle);
        assert_eq!(panel.status_label(), "");
        assert_eq!(panel.output(), EMPTY_CODE_PROMPT);
    }

    #[test]
    fn running_state_blocks_reentry() {
        let mut panel = panel();
        let first = panel.begin_run("print(1)");
        assert!(first.is_some());
        assert_eq!(panel.status(), RunStatus::Running);
        assert_eq!(panel.status_label(), "Running...");
        assert_eq!(panel.output(), RUNNING_OUTPUT);
        assert!(panel.is_running());

        assert!(panel.begin_run("print(2)").is_none());
        // A blank editor while running keeps the running display
        assert!(panel.begin_run("").is_none());
        assert_eq!(panel.output(), RUNNING_OUTPUT);
    }

    #[test]
    fn failure_output_falls_back_in_order() {
        let mut panel = panel();

        panel.begin_run("x");
        panel.finish_run(Ok(ExecutionResult {
            success: false,
            output: Some("partial".to_string()),
            error: Some("NameError: x".to_string()),
            execution_time: None,
        }));
        assert_eq!(panel.output(), "NameError: x");

        panel.begin_run("x");
        panel.finish_run(Ok(ExecutionResult {
            success: false,
            output: Some("partial".to_string()),
            error: Some(String::new()),
            execution_time: Some(1.234),
        }));
        assert_eq!(panel.output(), "partial");
        assert_eq!(panel.status_label(), "Error (1.23s)");

        panel.begin_run("x");
        panel.finish_run(Ok(ExecutionResult::default()));
        assert_eq!(panel.output(), GENERIC_FAILURE);
    }

    #[test]
    fn empty_success_output_uses_placeholder() {
        let mut panel = panel();
        panel.begin_run("pass");
        panel.finish_run(Ok(ExecutionResult {
            success: true,
            output: Some(String::new()),
            ..ExecutionResult::default()
        }));
        assert_eq!(panel.output(), NO_OUTPUT);
        assert_eq!(panel.status_label(), "Success");
    }

    #[test]
    fn backend_detail_is_shown_for_server_errors() {
        let mut panel = panel();
        panel.begin_run("print(1)");
        panel.finish_run(Err(ApiError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: Some("Execution error: docker unavailable".to_string()),
        }));
        assert_eq!(panel.status(), RunStatus::Error);
        assert_eq!(panel.output(), "Execution error: docker unavailable");
    }

    #[test]
    fn clear_resets_from_any_state() {
        let mut panel = panel();
        panel.begin_run("print(1)");
        panel.finish_run(Err(ApiError::Network("refused".to_string())));
        panel.clear();
        assert_eq!(panel.status(), RunStatus::Idle);
        assert_eq!(panel.status_label(), "");
        assert_eq!(panel.output(), OUTPUT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn submission_reports_tests_and_feedback() {
        let api = FakeApi {
            submit_report: Some(SubmissionReport {
                submission_id: "demo-submission-001".to_string(),
                status: "completed".to_string(),
                execution_result: Some(ExecutionResult {
                    success: true,
                    output: Some("Hello\n".to_string()),
                    ..ExecutionResult::default()
                }),
                tests_passed: 0,
                tests_total: 0,
                feedback: "Submission received.".to_string(),
            }),
            ..FakeApi::default()
        };
        let mut panel = panel();

        panel.submit(&api, "print('Hello')").await;

        assert_eq!(panel.status(), RunStatus::Success);
        assert_eq!(panel.status_label(), "Submitted (completed)");
        assert_eq!(panel.output(), "Tests passed: 0/0\nSubmission received.\n\nHello\n");
        assert!(!panel.is_running());
    }
}
