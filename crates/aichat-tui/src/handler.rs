use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, FocusPane, InputMode, Popup, SettingsField};
use crate::editor::TextInput;
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.on_tick(Instant::now()),
        AppEvent::Stream { request_id, event } => app.handle_stream_event(request_id, event),
        AppEvent::Models(result) => app.handle_models(result),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if let Some(popup) = app.popup.take() {
        if let Some(popup) = handle_popup_key(app, popup, key) {
            app.popup = Some(popup);
        }
        return;
    }

    app.notice = None;
    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Tab => app.focus = app.focus.next(),
        KeyCode::Char('i') => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }

        // Half-page scroll
        KeyCode::Char('d') if ctrl => app.scroll_half_page_down(),
        KeyCode::Char('u') if ctrl => app.scroll_half_page_up(),

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Conversations => app.nav_down(),
            _ => app.scroll_down(1),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Conversations => app.nav_up(),
            _ => app.scroll_up(1),
        },
        KeyCode::Char('g') => match app.focus {
            FocusPane::Conversations => app.nav_first(),
            _ => app.scroll_to_top(),
        },
        KeyCode::Char('G') => match app.focus {
            FocusPane::Conversations => app.nav_last(),
            _ => app.scroll_to_bottom(),
        },
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),

        KeyCode::Enter => match app.focus {
            FocusPane::Conversations => app.open_highlighted(),
            FocusPane::Chat | FocusPane::Input => {
                app.focus = FocusPane::Input;
                app.input_mode = InputMode::Editing;
            }
        },

        // Conversation management
        KeyCode::Char('n') => app.new_conversation(),
        KeyCode::Char('r') => app.open_rename(),
        KeyCode::Char('d') => app.request_delete(),
        KeyCode::Char('D') => app.request_clear_all(),

        KeyCode::Char('s') => app.open_settings(),
        KeyCode::Char('M') => app.open_model_picker(),
        KeyCode::Char('S') => app.stop_generation(),

        // Attachments
        KeyCode::Char('a') => app.open_attach(),
        KeyCode::Char('x') => app.remove_last_image(),

        // Code blocks and clipboard
        KeyCode::Char(']') => app.select_next_code_block(),
        KeyCode::Char('[') => app.select_prev_code_block(),
        KeyCode::Char('y') => app.copy_selected_code(),
        KeyCode::Char('c') => app.copy_last_reply(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let newline = key.modifiers.intersects(KeyModifiers::ALT | KeyModifiers::SHIFT);

    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = app.focus.next();
        }
        KeyCode::Enter if newline => app.input.insert_char('\n'),
        KeyCode::Char('j') if ctrl => app.input.insert_char('\n'),
        KeyCode::Enter => app.submit(),
        KeyCode::Up => app.input.move_up(),
        KeyCode::Down => app.input.move_down(),
        _ => {
            edit_text(&mut app.input, key);
        }
    }
}

/// Single-line editing keys shared by the composer and dialog fields.
/// Returns false for keys it does not handle.
fn edit_text(input: &mut TextInput, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(_) if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
        KeyCode::Char(c) => input.insert_char(c),
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.move_left(),
        KeyCode::Right => input.move_right(),
        KeyCode::Home => input.move_home(),
        KeyCode::End => input.move_end(),
        _ => return false,
    }
    true
}

/// Handle a key while a dialog is open. Returns the dialog if it stays open.
fn handle_popup_key(app: &mut App, popup: Popup, key: KeyEvent) -> Option<Popup> {
    match popup {
        Popup::Error { .. } => match key.code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q') => None,
            _ => Some(popup),
        },

        Popup::Confirm(mut dialog) => match key.code {
            KeyCode::Enter | KeyCode::Char('y') => {
                app.confirm(dialog);
                None
            }
            KeyCode::Esc | KeyCode::Char('n') => None,
            KeyCode::Char(' ') | KeyCode::Tab => {
                if let Some(checked) = dialog.dont_ask_again.as_mut() {
                    *checked = !*checked;
                }
                Some(Popup::Confirm(dialog))
            }
            _ => Some(Popup::Confirm(dialog)),
        },

        Popup::Rename { id, mut input } => match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter => {
                app.rename_conversation(&id, input.text());
                None
            }
            _ => {
                edit_text(&mut input, key);
                Some(Popup::Rename { id, input })
            }
        },

        Popup::Attach(mut input) => match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter => {
                app.attach_file(input.text());
                None
            }
            _ => {
                edit_text(&mut input, key);
                Some(Popup::Attach(input))
            }
        },

        Popup::ModelPicker(mut picker) => match key.code {
            KeyCode::Esc | KeyCode::Char('q') => None,
            KeyCode::Char('j') | KeyCode::Down => {
                picker.nav_down();
                Some(Popup::ModelPicker(picker))
            }
            KeyCode::Char('k') | KeyCode::Up => {
                picker.nav_up();
                Some(Popup::ModelPicker(picker))
            }
            KeyCode::Enter => {
                let chosen = picker.state.selected().and_then(|i| picker.models.get(i)).cloned();
                match chosen {
                    Some(model) => {
                        app.choose_model(&model);
                        None
                    }
                    None => Some(Popup::ModelPicker(picker)),
                }
            }
            _ => Some(Popup::ModelPicker(picker)),
        },

        Popup::Settings(mut form) => {
            match key.code {
                KeyCode::Esc => return None,
                KeyCode::Enter => {
                    app.save_settings(&form);
                    return None;
                }
                KeyCode::F(2) => form.show_key = !form.show_key,
                KeyCode::Tab | KeyCode::Down => form.next_field(),
                KeyCode::BackTab | KeyCode::Up => form.prev_field(),
                KeyCode::Char(' ') if form.focused() == SettingsField::SupportsImages => {
                    form.supports_vision = !form.supports_vision;
                }
                _ => {
                    if let Some(input) = form.focused_input() {
                        edit_text(input, key);
                    }
                }
            }
            Some(Popup::Settings(form))
        }
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.popup.is_some() {
        return;
    }

    let x = mouse.column;
    let y = mouse.row;

    // Scroll whichever pane is under the pointer
    let in_list = app.conversations_area.is_some_and(|r| point_in_rect(x, y, r));
    let in_chat = app.chat_area.is_some_and(|r| point_in_rect(x, y, r));

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_list {
                app.nav_down();
            } else if in_chat {
                app.scroll_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_list {
                app.nav_up();
            } else if in_chat {
                app.scroll_up(3);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aichat_core::Config;
    use crossterm::event::{KeyEventKind, KeyEventState, MouseButton};
    use tokio::sync::mpsc;

    use crate::app::AppOptions;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn key_with(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn test_app(dir: &std::path::Path) -> App {
        let config_path = dir.join("config.json");
        Config {
            api_key: Some("sk-test".to_string()),
            base_url: Some("http://127.0.0.1:9/v1".to_string()),
            ..Config::default()
        }
        .save_to(&config_path)
        .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(
            AppOptions {
                config_path,
                history_path: dir.join("conversations.json"),
                model_override: None,
            },
            tx,
        )
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_key(app, key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_newline_keys_do_not_send() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        assert_eq!(app.input_mode, InputMode::Editing);

        type_str(&mut app, "a");
        handle_key(&mut app, key_with(KeyCode::Enter, KeyModifiers::ALT));
        type_str(&mut app, "b");
        handle_key(&mut app, key_with(KeyCode::Enter, KeyModifiers::SHIFT));
        type_str(&mut app, "c");
        handle_key(&mut app, key_with(KeyCode::Char('j'), KeyModifiers::CONTROL));
        type_str(&mut app, "d");

        assert_eq!(app.input.text(), "a\nb\nc\nd");
        assert!(!app.is_busy());
    }

    #[test]
    fn test_ctrl_c_quits_even_with_dialog_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.open_settings();
        handle_key(&mut app, key_with(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }

    #[test]
    fn test_settings_dialog_edits_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        handle_key(&mut app, key(KeyCode::Esc));
        handle_key(&mut app, key(KeyCode::Char('s')));
        assert!(matches!(app.popup, Some(Popup::Settings(_))));

        // Move to the model field and replace its contents
        handle_key(&mut app, key(KeyCode::Tab));
        handle_key(&mut app, key(KeyCode::Tab));
        for _ in 0..40 {
            handle_key(&mut app, key(KeyCode::Backspace));
        }
        type_str(&mut app, "gpt-4o");
        // Toggle the checkbox
        handle_key(&mut app, key(KeyCode::Tab));
        handle_key(&mut app, key(KeyCode::Tab));
        handle_key(&mut app, key(KeyCode::Char(' ')));
        handle_key(&mut app, key(KeyCode::Enter));

        assert!(app.popup.is_none());
        assert_eq!(app.settings.model, "gpt-4o");
        assert!(app.settings.supports_vision);
        let saved = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(saved.model.as_deref(), Some("gpt-4o"));
        assert!(saved.supports_vision);
    }

    #[test]
    fn test_settings_escape_discards_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.open_settings();
        type_str(&mut app, "-extra");
        handle_key(&mut app, key(KeyCode::Esc));
        assert!(app.popup.is_none());
        assert_eq!(app.settings.api_key, "sk-test");
    }

    #[test]
    fn test_rename_via_dialog() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        handle_key(&mut app, key(KeyCode::Esc));
        handle_key(&mut app, key(KeyCode::Char('r')));
        for _ in 0..20 {
            handle_key(&mut app, key(KeyCode::Backspace));
        }
        type_str(&mut app, "Rust notes");
        handle_key(&mut app, key(KeyCode::Enter));

        assert_eq!(app.session.current().unwrap().title, "Rust notes");
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        handle_key(&mut app, key(KeyCode::Esc));
        handle_key(&mut app, key(KeyCode::Char('n')));
        handle_key(&mut app, key(KeyCode::Esc));
        assert_eq!(app.conversation_ids.len(), 2);

        handle_key(&mut app, key(KeyCode::Char('d')));
        handle_key(&mut app, key(KeyCode::Char('n')));
        assert_eq!(app.conversation_ids.len(), 2);

        handle_key(&mut app, key(KeyCode::Char('d')));
        handle_key(&mut app, key(KeyCode::Char('y')));
        assert_eq!(app.conversation_ids.len(), 1);
    }

    #[test]
    fn test_tab_cycles_focus() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        handle_key(&mut app, key(KeyCode::Esc));
        assert_eq!(app.focus, FocusPane::Input);
        handle_key(&mut app, key(KeyCode::Tab));
        assert_eq!(app.focus, FocusPane::Conversations);
        handle_key(&mut app, key(KeyCode::Tab));
        assert_eq!(app.focus, FocusPane::Chat);
    }

    #[test]
    fn test_mouse_wheel_scrolls_pane_under_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.conversations_area = Some(Rect::new(0, 1, 30, 20));
        app.chat_area = Some(Rect::new(30, 1, 50, 20));
        app.total_chat_lines = 100;
        app.chat_height = 18;

        let wheel = |kind, column| MouseEvent {
            kind,
            column,
            row: 5,
            modifiers: KeyModifiers::NONE,
        };
        handle_mouse(&mut app, wheel(MouseEventKind::ScrollDown, 40));
        assert_eq!(app.chat_scroll, 3);
        handle_mouse(&mut app, wheel(MouseEventKind::ScrollDown, 10));
        assert_eq!(app.chat_scroll, 3);
        handle_mouse(&mut app, wheel(MouseEventKind::Down(MouseButton::Left), 40));
        assert_eq!(app.chat_scroll, 3);
    }

    #[test]
    fn test_point_in_rect_edges() {
        let rect = Rect::new(2, 2, 3, 3);
        assert!(point_in_rect(2, 2, rect));
        assert!(point_in_rect(4, 4, rect));
        assert!(!point_in_rect(5, 4, rect));
        assert!(!point_in_rect(1, 2, rect));
    }
}
