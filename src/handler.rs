use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, FocusPane};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        other => app.apply(other),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any pane
    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        app.should_quit = true;
        return;
    }

    if app.modal.is_open() && handle_modal_key(app, key) {
        return;
    }

    match key.code {
        KeyCode::Tab => {
            app.focus = app.focus.next();
            return;
        }
        KeyCode::BackTab => {
            app.focus = app.focus.prev();
            return;
        }
        KeyCode::F(5) => {
            app.run_code();
            return;
        }
        _ => {}
    }

    match app.focus {
        FocusPane::Editor => handle_editor(app, key),
        FocusPane::ChatInput => handle_chat_input(app, key),
        FocusPane::Transcript => handle_transcript(app, key),
    }
}

/// Keys for the source viewer. Returns false when the key belongs to the panes.
fn handle_modal_key(app: &mut App, key: KeyEvent) -> bool {
    if app.modal.is_minimized() {
        // The editor and chat input keep their keys while the viewer is docked
        if app.focus != FocusPane::Transcript {
            return false;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('x') => app.modal.close(),
            KeyCode::Char('m') => app.modal.toggle_minimize(),
            KeyCode::Char('M') | KeyCode::Char('f') => app.modal.toggle_maximize(),
            _ => return false,
        }
        return true;
    }

    match key.code {
        KeyCode::Esc => {
            app.modal.handle_escape();
        }
        KeyCode::Char('m') => app.modal.toggle_minimize(),
        KeyCode::Char('M') | KeyCode::Char('f') => app.modal.toggle_maximize(),
        KeyCode::Char('q') | KeyCode::Char('x') => app.modal.close(),
        KeyCode::Char('j') | KeyCode::Down => app.modal.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.modal.scroll_up(1),
        KeyCode::PageDown | KeyCode::Char(' ') => app.modal.scroll_down(10),
        KeyCode::PageUp => app.modal.scroll_up(10),
        KeyCode::Char('g') | KeyCode::Home => app.modal.scroll = 0,
        _ => {}
    }
    true
}

fn handle_editor(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        // Ctrl+Enter only reaches us on terminals that report it; Ctrl+R always works
        KeyCode::Enter if ctrl => app.run_code(),
        KeyCode::Char('r') if ctrl => app.run_code(),
        KeyCode::Char('s') if ctrl => app.submit_code(),
        KeyCode::Char('l') if ctrl => app.clear_editor(),
        KeyCode::Char('t') if ctrl => app.execution.cycle_language(),
        KeyCode::PageDown if ctrl => app.output_scroll = app.output_scroll.saturating_add(5),
        KeyCode::PageUp if ctrl => app.output_scroll = app.output_scroll.saturating_sub(5),
        KeyCode::Esc => app.focus = FocusPane::ChatInput,
        _ => {
            app.editor.input(key);
        }
    }
}

fn handle_chat_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.focus = FocusPane::Transcript;
        }
        KeyCode::Enter => app.send_chat(),
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.chat_cursor = 0;
        }
        KeyCode::End => {
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

fn handle_transcript(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::PageDown => app.scroll_chat_down(10),
        KeyCode::PageUp => app.scroll_chat_up(10),
        KeyCode::Char('G') | KeyCode::End => app.follow_chat = true,
        KeyCode::Char(']') | KeyCode::Char('l') | KeyCode::Right => app.chat.select_next_chip(),
        KeyCode::Char('[') | KeyCode::Char('h') | KeyCode::Left => app.chat.select_prev_chip(),
        KeyCode::Enter => app.open_selected_chip(),
        KeyCode::Char('i') | KeyCode::Char('/') => app.focus = FocusPane::ChatInput,
        KeyCode::Esc => {
            app.chat.clear_chip_selection();
            app.focus = FocusPane::Editor;
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;
    let inside = |area: Option<Rect>| area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    let modal_blocking = app.modal.is_open() && !app.modal.is_minimized();
    let in_modal = inside(app.modal_area);

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if modal_blocking {
                if !in_modal {
                    app.modal.handle_background_click();
                }
                return;
            }
            // Clicking the docked bar brings the viewer back
            if app.modal.is_minimized() && in_modal {
                app.modal.toggle_minimize();
                return;
            }

            let hit_chip = app
                .chip_areas
                .iter()
                .find(|(rect, _)| point_in_rect(x, y, *rect))
                .map(|(_, idx)| *idx);
            if let Some(idx) = hit_chip {
                app.focus = FocusPane::Transcript;
                app.open_chip(idx);
            } else if inside(app.editor_area) {
                app.focus = FocusPane::Editor;
            } else if inside(app.input_area) {
                app.focus = FocusPane::ChatInput;
            } else if inside(app.chat_area) {
                app.focus = FocusPane::Transcript;
            }
        }
        MouseEventKind::ScrollDown => {
            if modal_blocking {
                app.modal.scroll_down(3);
            } else if inside(app.chat_area) {
                app.scroll_chat_down(3);
            } else if inside(app.output_area) {
                app.output_scroll = app.output_scroll.saturating_add(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if modal_blocking {
                app.modal.scroll_up(3);
            } else if inside(app.chat_area) {
                app.scroll_chat_up(3);
            } else if inside(app.output_area) {
                app.output_scroll = app.output_scroll.saturating_sub(3);
            }
        }
        _ => {}
    }
}
