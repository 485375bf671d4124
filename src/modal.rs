use ratatui::text::Text;

use crate::api::LabApi;
use crate::error::ApiError;
use crate::markdown::MarkdownRenderer;
use crate::state::KnowledgeDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalView {
    Closed,
    Normal,
    Minimized,
    Maximized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalBody {
    Loading,
    Document(Text<'static>),
    Failed(String),
}

pub struct SourceModal {
    view: ModalView,
    title: String,
    category: String,
    body: ModalBody,
    pub scroll: u16,
}

impl Default for SourceModal {
    fn default() -> Self {
        Self::new()
    }
}

/// Friendly title for a knowledge file name: `for_loops.md` → `For loops`
pub fn display_title(name: &str) -> String {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    let spaced = stem.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl SourceModal {
    pub fn new() -> Self {
        Self {
            view: ModalView::Closed,
            title: String::new(),
            category: String::new(),
            body: ModalBody::Loading,
            scroll: 0,
        }
    }

    pub fn view(&self) -> ModalView {
        self.view
    }

    pub fn is_open(&self) -> bool {
        self.view != ModalView::Closed
    }

    pub fn is_minimized(&self) -> bool {
        self.view == ModalView::Minimized
    }

    pub fn is_maximized(&self) -> bool {
        self.view == ModalView::Maximized
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn body(&self) -> &ModalBody {
        &self.body
    }

    /// Show the loading state for `name`; the caller fetches the document
    /// and hands the outcome to [`finish`](Self::finish).
    pub fn open(&mut self, name: &str) -> String {
        if !self.is_open() {
            self.view = ModalView::Normal;
        }
        self.title = name.replacen(".md", "", 1);
        self.category = "Loading...".to_string();
        self.body = ModalBody::Loading;
        self.scroll = 0;
        name.to_string()
    }

    /// Apply a fetch result. The latest result wins; results arriving after
    /// the modal was closed are dropped.
    pub fn finish(&mut self, outcome: Result<KnowledgeDocument, ApiError>, renderer: &dyn MarkdownRenderer) {
        if !self.is_open() {
            return;
        }

        match outcome {
            Ok(doc) => {
                self.title = display_title(&doc.name);
                self.category = doc.category;
                self.body = ModalBody::Document(renderer.render_document(&doc.content));
            }
            Err(err) => {
                self.body = ModalBody::Failed(format!("❌ Error loading file: {}", err));
                self.category = "Error".to_string();
            }
        }
    }

    pub async fn show(&mut self, api: &dyn LabApi, name: &str, renderer: &dyn MarkdownRenderer) {
        let name = self.open(name);
        let outcome = api.fetch_knowledge(&name).await;
        self.finish(outcome, renderer);
    }

    pub fn toggle_minimize(&mut self) {
        self.view = match self.view {
            ModalView::Closed => ModalView::Closed,
            ModalView::Minimized => ModalView::Normal,
            ModalView::Normal | ModalView::Maximized => ModalView::Minimized,
        };
    }

    pub fn toggle_maximize(&mut self) {
        self.view = match self.view {
            ModalView::Closed => ModalView::Closed,
            ModalView::Maximized => ModalView::Normal,
            ModalView::Normal | ModalView::Minimized => ModalView::Maximized,
        };
    }

    pub fn close(&mut self) {
        self.view = ModalView::Closed;
        self.scroll = 0;
    }

    /// Escape key: closes only when open. Returns whether it was consumed.
    pub fn handle_escape(&mut self) -> bool {
        if self.is_open() {
            self.close();
            true
        } else {
            false
        }
    }

    /// A click landed outside the modal body
    pub fn handle_background_click(&mut self) -> bool {
        self.handle_escape()
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use crate::markdown::MinimalMarkdown;

    fn with_doc(name: &str, category: &str, content: &str) -> FakeApi {
        let mut api = FakeApi::default();
        api.documents.insert(
            name.to_string(),
            KnowledgeDocument {
                name: name.to_string(),
                category: category.to_string(),
                content: content.to_string(),
            },
        );
        api
    }

    #[test]
    fn titles_are_friendly() {
        assert_eq!(display_title("for_loops.md"), "For loops");
        assert_eq!(display_title("list-comprehensions.md"), "List comprehensions");
        assert_eq!(display_title("README"), "README");
        assert_eq!(display_title(".md"), "");
    }

    #[test]
    fn open_shows_loading_state() {
        let mut modal = SourceModal::new();
        assert_eq!(modal.view(), ModalView::Closed);

        let name = modal.open("for_loops.md");

        assert_eq!(name, "for_loops.md");
        assert_eq!(modal.view(), ModalView::Normal);
        assert_eq!(modal.title(), "for_loops");
        assert_eq!(modal.category(), "Loading...");
        assert_eq!(modal.body(), &ModalBody::Loading);
    }

    #[tokio::test]
    async fn loaded_document_sets_title_and_category() {
        let api = with_doc("for_loops.md", "python-basics", "Loops repeat.");
        let mut modal = SourceModal::new();

        modal.show(&api, "for_loops.md", &MinimalMarkdown).await;

        assert_eq!(modal.title(), "For loops");
        assert_eq!(modal.category(), "python-basics");
        assert_eq!(modal.body(), &ModalBody::Document(Text::raw("Loops repeat.")));
    }

    #[tokio::test]
    async fn missing_document_keeps_modal_open_with_error() {
        let api = FakeApi::default();
        let mut modal = SourceModal::new();

        modal.show(&api, "nope.md", &MinimalMarkdown).await;

        assert!(modal.is_open());
        assert_eq!(modal.category(), "Error");
        assert_eq!(
            modal.body(),
            &ModalBody::Failed("❌ Error loading file: File not found".to_string())
        );
    }

    #[test]
    fn minimize_and_maximize_are_exclusive() {
        let mut modal = SourceModal::new();
        modal.open("a.md");

        modal.toggle_minimize();
        assert!(modal.is_minimized());
        modal.toggle_maximize();
        assert!(modal.is_maximized());
        assert!(!modal.is_minimized());
        modal.toggle_minimize();
        assert!(modal.is_minimized());
        assert!(!modal.is_maximized());

        modal.toggle_minimize();
        assert_eq!(modal.view(), ModalView::Normal);
        modal.toggle_maximize();
        modal.toggle_maximize();
        assert_eq!(modal.view(), ModalView::Normal);
    }

    #[test]
    fn close_clears_flags_and_escape_only_acts_when_open() {
        let mut modal = SourceModal::new();
        assert!(!modal.handle_escape());
        modal.toggle_maximize();
        assert_eq!(modal.view(), ModalView::Closed);

        modal.open("a.md");
        modal.toggle_maximize();
        assert!(modal.handle_background_click());
        assert_eq!(modal.view(), ModalView::Closed);

        modal.open("b.md");
        assert_eq!(modal.view(), ModalView::Normal);
    }

    #[test]
    fn late_result_after_close_is_dropped() {
        let mut modal = SourceModal::new();
        modal.open("a.md");
        modal.close();
        modal.finish(
            Ok(KnowledgeDocument {
                name: "a.md".to_string(),
                category: "x".to_string(),
                content: String::new(),
            }),
            &MinimalMarkdown,
        );
        assert!(!modal.is_open());
        assert_eq!(modal.category(), "Loading...");
    }
}
