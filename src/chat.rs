use crate::api::LabApi;
use crate::error::ApiError;
use crate::state::{ChatReply, ChatRequest, ChatTurn, SourceRef};

/// One row of the transcript
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Turn(ChatTurn),
    /// "Thinking..." row for the request with this id
    Thinking(u64),
}

/// A chat request waiting to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChat {
    pub id: u64,
    pub request: ChatRequest,
}

#[derive(Default)]
pub struct ChatPanel {
    entries: Vec<Entry>,
    next_id: u64,
    selected_chip: Option<usize>,
    lab_id: Option<String>,
}

impl ChatPanel {
    pub fn new(lab_id: Option<String>) -> Self {
        Self {
            lab_id,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Turn(turn) => Some(turn),
            Entry::Thinking(_) => None,
        })
    }

    pub fn is_thinking(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, Entry::Thinking(_)))
    }

    /// Append the user's turn and a placeholder; returns the request to send.
    /// Blank input is ignored.
    pub fn begin_send(&mut self, input: &str, code: &str) -> Option<PendingChat> {
        let message = input.trim();
        if message.is_empty() {
            return None;
        }

        self.entries.push(Entry::Turn(ChatTurn::user(message)));

        // Keep a single placeholder: a newer request takes it over
        self.entries.retain(|e| !matches!(e, Entry::Thinking(_)));
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry::Thinking(id));

        Some(PendingChat {
            id,
            request: ChatRequest {
                message: message.to_string(),
                code: code.to_string(),
                lab_id: self.lab_id.clone(),
            },
        })
    }

    /// Drop the placeholder for `id` (if it is still there) and add the
    /// assistant's answer, or a synthetic one describing the failure. A newer
    /// request's placeholder stays at the bottom.
    pub fn finish_send(&mut self, id: u64, outcome: Result<ChatReply, ApiError>) {
        self.entries.retain(|e| *e != Entry::Thinking(id));

        let turn = match outcome {
            Ok(reply) => ChatTurn::assistant(reply.response, reply.sources),
            Err(err) => ChatTurn::assistant(
                format!("Error connecting to TA: {}. Make sure the backend is running.", err),
                Vec::new(),
            ),
        };
        let at = self
            .entries
            .iter()
            .position(|e| matches!(e, Entry::Thinking(_)))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, Entry::Turn(turn));
    }

    pub async fn send(&mut self, api: &dyn LabApi, input: &str, code: &str) {
        let Some(pending) = self.begin_send(input, code) else {
            return;
        };
        let outcome = api.ask_chat(&pending.request).await;
        self.finish_send(pending.id, outcome);
    }

    /// Every reference chip in transcript order
    pub fn chips(&self) -> Vec<&SourceRef> {
        self.turns().flat_map(|turn| turn.sources().iter()).collect()
    }

    pub fn selected_chip(&self) -> Option<usize> {
        self.selected_chip
    }

    pub fn selected_source(&self) -> Option<&SourceRef> {
        self.selected_chip.and_then(|i| self.chips().get(i).copied())
    }

    pub fn select_chip(&mut self, index: usize) {
        if index < self.chips().len() {
            self.selected_chip = Some(index);
        }
    }

    pub fn select_next_chip(&mut self) {
        let len = self.chips().len();
        if len == 0 {
            return;
        }
        self.selected_chip = Some(match self.selected_chip {
            Some(i) => (i + 1).min(len - 1),
            // Start from the newest answer's references
            None => len - 1,
        });
    }

    pub fn select_prev_chip(&mut self) {
        let len = self.chips().len();
        if len == 0 {
            return;
        }
        self.selected_chip = Some(match self.selected_chip {
            Some(i) => i.saturating_sub(1),
            None => len - 1,
        });
    }

    pub fn clear_chip_selection(&mut self) {
        self.selected_chip = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use crate::state::ChatRole;

    fn loops_reply() -> ChatReply {
        ChatReply {
            response: "A **loop** repeats.".to_string(),
            sources: vec![SourceRef::named("loops.md")],
        }
    }

    #[tokio::test]
    async fn send_appends_user_and_assistant_turns() {
        let api = FakeApi {
            chat_reply: Some(loops_reply()),
            ..FakeApi::default()
        };
        let mut chat = ChatPanel::new(None);

        chat.send(&api, "what is a loop?", "for i in range(3): pass").await;

        let turns: Vec<&ChatTurn> = chat.turns().collect();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role(), ChatRole::User);
        assert_eq!(turns[0].text(), "what is a loop?");
        assert_eq!(turns[1].role(), ChatRole::Assistant);
        assert_eq!(turns[1].text(), "A **loop** repeats.");
        assert_eq!(turns[1].sources()[0].name, "loops.md");
        assert!(!chat.is_thinking());
    }

    #[tokio::test]
    async fn failure_becomes_synthetic_answer() {
        let api = FakeApi::offline();
        let mut chat = ChatPanel::new(None);

        chat.send(&api, "hello", "").await;

        let turns: Vec<&ChatTurn> = chat.turns().collect();
        assert_eq!(turns.len(), 2);
        assert_eq!(
            turns[1].text(),
            "Error connecting to TA: connection refused. Make sure the backend is running."
        );
        assert!(turns[1].sources().is_empty());
        assert!(!chat.is_thinking());
    }

    #[tokio::test]
    async fn blank_message_is_a_no_op() {
        let api = FakeApi::offline();
        let mut chat = ChatPanel::new(None);

        chat.send(&api, "   ", "print(1)").await;

        assert!(chat.entries().is_empty());
        assert_eq!(api.call_count(), 0);
    }

    #[test]
    fn request_carries_trimmed_message_and_code() {
        let mut chat = ChatPanel::new(Some("lab-2".to_string()));
        let pending = chat.begin_send("  why?  ", "x = 1").unwrap();
        assert_eq!(pending.request.message, "why?");
        assert_eq!(pending.request.code, "x = 1");
        assert_eq!(pending.request.lab_id.as_deref(), Some("lab-2"));
        assert_eq!(chat.entries().last(), Some(&Entry::Thinking(pending.id)));
    }

    #[test]
    fn overlapping_sends_keep_one_placeholder() {
        let mut chat = ChatPanel::new(None);
        let first = chat.begin_send("one", "").unwrap();
        let second = chat.begin_send("two", "").unwrap();

        let placeholders = chat
            .entries()
            .iter()
            .filter(|e| matches!(e, Entry::Thinking(_)))
            .count();
        assert_eq!(placeholders, 1);

        // The older answer lands first and must not clear the newer placeholder
        chat.finish_send(first.id, Ok(ChatReply { response: "1".into(), sources: vec![] }));
        assert!(chat.is_thinking());
        assert_eq!(chat.entries().last(), Some(&Entry::Thinking(second.id)));
        assert_eq!(chat.turns().last().map(|t| t.text()), Some("1"));

        chat.finish_send(second.id, Ok(ChatReply { response: "2".into(), sources: vec![] }));
        assert!(!chat.is_thinking());
        assert_eq!(chat.turns().count(), 4);
        assert_eq!(chat.turns().last().map(|t| t.text()), Some("2"));
    }

    #[test]
    fn chip_selection_walks_all_references() {
        let mut chat = ChatPanel::new(None);
        assert!(chat.selected_source().is_none());
        chat.select_next_chip();
        assert_eq!(chat.selected_chip(), None);

        let a = chat.begin_send("a", "").unwrap();
        chat.finish_send(a.id, Ok(ChatReply {
            response: "see".into(),
            sources: vec![SourceRef::named("loops.md"), SourceRef::named("functions.md")],
        }));
        let b = chat.begin_send("b", "").unwrap();
        chat.finish_send(b.id, Ok(loops_reply()));

        assert_eq!(chat.chips().len(), 3);

        chat.select_next_chip();
        assert_eq!(chat.selected_chip(), Some(2));
        chat.select_prev_chip();
        chat.select_prev_chip();
        chat.select_prev_chip();
        assert_eq!(chat.selected_source().map(|s| s.name.as_str()), Some("loops.md"));
        assert_eq!(chat.selected_chip(), Some(0));

        chat.select_chip(1);
        assert_eq!(chat.selected_source().map(|s| s.name.as_str()), Some("functions.md"));
        chat.select_chip(9);
        assert_eq!(chat.selected_chip(), Some(1));
    }
}
