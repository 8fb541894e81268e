use aichat_core::history::format_timestamp;
use aichat_core::markdown::{self, Segment};
use aichat_core::{ChatMessage, ChatRole, KeySource};
use ratatui::{
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
    Frame,
};

use crate::app::{App, ConfirmDialog, FocusPane, InputMode, ModelPicker, Popup, SettingsField, SettingsForm, Status};
use crate::editor::TextInput;

const LIST_WIDTH: u16 = 30;
const MAX_INPUT_LINES: u16 = 8;
const SETTINGS_LABEL_WIDTH: u16 = 17;

/// Parse a line of text and convert **bold**, *italic* and `code` markdown
/// to styled spans. Headings are shown bold.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('#') {
        let heading = trimmed.trim_start_matches('#');
        if heading.starts_with(' ') {
            return Line::from(Span::styled(
                heading.trim().to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
        }
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut current_text = String::new();
    let mut rest = text;

    while let Some(i) = rest.find(|c: char| c == '*' || c == '`') {
        current_text.push_str(&rest[..i]);
        let tail = &rest[i..];

        let (marker, style) = if tail.starts_with("**") {
            ("**", Style::default().add_modifier(Modifier::BOLD))
        } else if tail.starts_with('`') {
            ("`", Style::default().fg(Color::Magenta))
        } else {
            ("*", Style::default().add_modifier(Modifier::ITALIC))
        };

        let body = &tail[marker.len()..];
        match body.find(marker) {
            // Leading space means a bullet or a lone asterisk, not emphasis
            Some(end) if end > 0 && !body.starts_with(' ') => {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(body[..end].to_string(), style));
                rest = &body[end + marker.len()..];
            }
            _ => {
                // No closing marker, treat as literal
                current_text.push_str(marker);
                rest = body;
            }
        }
    }
    current_text.push_str(rest);

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Rows a line takes once wrapped to `width` columns
fn wrapped_height(line: &Line, width: usize) -> usize {
    let line_width = line.width();
    if line_width == 0 || width == 0 {
        1
    } else {
        line_width.div_ceil(width)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [list_area, main_area] = Layout::horizontal([
        Constraint::Length(LIST_WIDTH.min(body_area.width / 2)),
        Constraint::Min(0),
    ])
    .areas(body_area);

    let attachments_height = if app.pending_images.is_empty() { 0 } else { 1 };
    let input_height = (app.input.line_count() as u16).clamp(1, MAX_INPUT_LINES) + 2;
    let [chat_area, attachments_area, input_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(attachments_height),
        Constraint::Length(input_height),
    ])
    .areas(main_area);

    // Store areas for mouse hit-testing
    app.conversations_area = Some(list_area);
    app.chat_area = Some(chat_area);

    render_conversations(app, frame, list_area);
    render_chat(app, frame, chat_area);
    if attachments_height > 0 {
        render_attachments(app, frame, attachments_area);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if let Some(popup) = app.popup.as_mut() {
        match popup {
            Popup::Settings(form) => {
                render_settings(form, app.settings.api_key_source(), frame, area)
            }
            Popup::Rename { input, .. } => render_line_input(
                " Rename conversation ",
                "Enter to save, Esc to cancel",
                input,
                frame,
                area,
            ),
            Popup::Attach(input) => render_line_input(
                " Attach file ",
                "Path to an image or text file. Enter to attach, Esc to cancel",
                input,
                frame,
                area,
            ),
            Popup::Confirm(dialog) => render_confirm(dialog, frame, area),
            Popup::ModelPicker(picker) => render_model_picker(picker, &app.settings.model, frame, area),
            Popup::Error { title, message } => render_error(title, message, frame, area),
        }
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" AIChat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}]", app.settings.model), Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" EDIT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let status_style = match app.status {
        Status::Ready => Style::default().fg(Color::Green),
        Status::Thinking => Style::default().fg(Color::Yellow),
        Status::Error => Style::default().fg(Color::Red).bold(),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |k: &'static str, label: &'static str| {
        [Span::styled(k, key_style), Span::styled(label, label_style)]
    };

    let mut hints: Vec<Span> = Vec::new();
    if let Some(notice) = &app.notice {
        hints.push(Span::styled(format!(" {} ", notice), Style::default().fg(Color::Cyan)));
    } else {
        match app.input_mode {
            InputMode::Editing => {
                hints.extend(hint(" Enter ", " send "));
                hints.extend(hint(" Alt+Enter ", " newline "));
                hints.extend(hint(" Esc ", " commands "));
            }
            InputMode::Normal => {
                match app.focus {
                    FocusPane::Conversations => {
                        hints.extend(hint(" j/k ", " nav "));
                        hints.extend(hint(" Enter ", " open "));
                        hints.extend(hint(" r ", " rename "));
                        hints.extend(hint(" d ", " delete "));
                    }
                    FocusPane::Chat | FocusPane::Input => {
                        hints.extend(hint(" j/k ", " scroll "));
                        hints.extend(hint(" [ ] ", " code "));
                        hints.extend(hint(" y ", " copy code "));
                        hints.extend(hint(" c ", " copy reply "));
                    }
                }
                if app.is_busy() {
                    hints.extend(hint(" S ", " stop "));
                }
                hints.extend(hint(" i ", " type "));
                hints.extend(hint(" n ", " new "));
                hints.extend(hint(" a ", " attach "));
                hints.extend(hint(" s ", " settings "));
                hints.extend(hint(" M ", " model "));
                hints.extend(hint(" q ", " quit "));
            }
        }
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(format!(" {} ", app.status.label()), status_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_conversations(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Conversations;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Conversations ({}) ", app.conversation_ids.len()));

    let title_width = area.width.saturating_sub(4) as usize;
    let current_id = app.session.current_id();
    let items: Vec<ListItem> = app
        .conversation_ids
        .iter()
        .filter_map(|id| app.session.store().get(id))
        .map(|conv| {
            let title: String = conv.title.chars().take(title_width).collect();
            let title_style = if conv.id == current_id {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(vec![
                Line::from(Span::styled(title, title_style)),
                Line::from(Span::styled(
                    format_timestamp(&conv.created_at),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.conversation_state);
}

/// Transcript lines for the open conversation, with the row each code block
/// header sits on
fn transcript_lines(app: &App) -> (Vec<Line<'static>>, Vec<usize>) {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut code_rows = Vec::new();

    if let Some(conv) = app.session.current() {
        for msg in &conv.messages {
            push_message(&mut lines, &mut code_rows, msg, app.selected_code_block);
        }
    }

    let pending = app
        .session
        .pending()
        .filter(|p| p.conversation_id == app.session.current_id());
    if let Some(pending) = pending {
        lines.push(role_line(ChatRole::Assistant));
        if pending.content.is_empty() {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            for line in pending.content.lines() {
                lines.push(parse_markdown_line(line));
            }
            lines.push(Line::from(Span::styled("▌", Style::default().fg(Color::Yellow))));
        }
    }

    (lines, code_rows)
}

fn role_line(role: ChatRole) -> Line<'static> {
    match role {
        ChatRole::User => Line::from(Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        ChatRole::Assistant => Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        ChatRole::System => Line::from(Span::styled(
            "System:",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
        )),
    }
}

fn push_message(
    lines: &mut Vec<Line<'static>>,
    code_rows: &mut Vec<usize>,
    msg: &ChatMessage,
    selected: Option<usize>,
) {
    lines.push(role_line(msg.role));

    let images = msg.image_urls().len();
    if images > 0 {
        let label = if images == 1 {
            "[1 image attached]".to_string()
        } else {
            format!("[{} images attached]", images)
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
        )));
    }

    for segment in markdown::split_segments(&markdown::finalize(msg.text())) {
        match segment {
            Segment::Text(text) => {
                for line in text.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
            Segment::Code { lang, code } => {
                let index = code_rows.len();
                let header_style = if selected == Some(index) {
                    Style::default().bg(Color::Yellow).fg(Color::Black).bold()
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                code_rows.push(lines.len());
                lines.push(Line::from(Span::styled(
                    format!("── {} #{} ", lang, index + 1),
                    header_style,
                )));
                for line in code.trim_end_matches('\n').lines() {
                    lines.push(Line::from(vec![
                        Span::styled("│ ", Style::default().fg(Color::DarkGray)),
                        Span::styled(line.to_string(), Style::default().fg(Color::Green)),
                    ]));
                }
            }
        }
    }
    lines.push(Line::default());
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let title = app
        .session
        .current()
        .map(|c| format!(" {} ", c.title))
        .unwrap_or_default();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Inner size minus borders, for scroll calculations
    let inner = block.inner(area);
    app.chat_height = inner.height;

    let (lines, code_rows) = transcript_lines(app);

    if lines.is_empty() {
        app.total_chat_lines = 0;
        app.chat_scroll = 0;
        let placeholder = Paragraph::new(format!(
            "Start typing to chat with {}.\nPress Esc then s to change settings.",
            app.settings.model
        ))
        .style(Style::default().fg(Color::DarkGray))
        .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let width = inner.width as usize;
    let mut offsets = Vec::with_capacity(lines.len());
    let mut total = 0usize;
    for line in &lines {
        offsets.push(total);
        total += wrapped_height(line, width);
    }
    app.total_chat_lines = total.min(u16::MAX as usize) as u16;

    let max_scroll = app.total_chat_lines.saturating_sub(app.chat_height);
    let code_offset = app
        .selected_code_block
        .and_then(|i| code_rows.get(i))
        .and_then(|row| offsets.get(*row));
    match code_offset {
        Some(offset) if app.scroll_to_code => {
            app.chat_scroll = (*offset as u16).min(max_scroll);
            app.follow_output = app.chat_scroll >= max_scroll;
        }
        _ if app.follow_output => app.chat_scroll = max_scroll,
        _ => app.chat_scroll = app.chat_scroll.min(max_scroll),
    }
    app.scroll_to_code = false;

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);

    if app.total_chat_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state = ScrollbarState::new(max_scroll as usize)
            .position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_attachments(app: &App, frame: &mut Frame, area: Rect) {
    let names: Vec<&str> = app.pending_images.iter().map(|i| i.file_name.as_str()).collect();
    let line = Line::from(vec![
        Span::styled(
            format!(" Images ({}): ", names.len()),
            Style::default().fg(Color::Magenta).bold(),
        ),
        Span::raw(names.join(", ")),
        Span::styled("  x removes the last", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// First visible column so the cursor stays inside `width`
fn scroll_offset(cursor: usize, width: usize) -> usize {
    if width == 0 || cursor < width {
        0
    } else {
        cursor - width + 1
    }
}

fn render_input(app: &mut App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let focused = app.focus == FocusPane::Input;
    let border_color = if editing {
        Color::Yellow
    } else if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let title = if app.is_busy() {
        " Message (waiting for reply) "
    } else {
        " Message "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let inner = block.inner(area);
    let width = inner.width as usize;
    let height = inner.height.max(1) as usize;

    let (row, col) = app.input.cursor_line_col();
    let top = row.saturating_sub(height - 1);
    let offset = scroll_offset(col, width);

    let visible: Vec<Line> = app
        .input
        .text()
        .split('\n')
        .skip(top)
        .take(height)
        .map(|line| Line::from(line.chars().skip(offset).take(width).collect::<String>()))
        .collect();

    // Use cyan text to match the "You:" style - visible in both light and dark terminals
    let input = Paragraph::new(visible)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing && app.popup.is_none() {
        frame.set_cursor_position((
            inner.x + (col - offset) as u16,
            inner.y + (row - top) as u16,
        ));
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

/// Rows a block of text needs at `width`, counting wraps
fn text_height(text: &str, width: u16) -> u16 {
    let width = width.max(1) as usize;
    text.lines()
        .map(|line| line.chars().count().max(1).div_ceil(width))
        .sum::<usize>()
        .min(u16::MAX as usize) as u16
}

/// Mask all but the last four characters of a key
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        "*".repeat(len)
    } else {
        let masked_len = len - 4;
        let last_four: String = key.chars().skip(masked_len).collect();
        format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
    }
}

fn render_settings(form: &SettingsForm, key_source: Option<KeySource>, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(72, 11, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Settings ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let value_width = inner.width.saturating_sub(SETTINGS_LABEL_WIDTH) as usize;
    let mut cursor = None;
    let mut lines = Vec::new();

    for (i, field) in SettingsField::ALL.iter().enumerate() {
        let focused = form.focus == i;
        let label_style = if focused {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::Gray)
        };
        let label = Span::styled(
            format!("{:<width$}", field.label(), width = SETTINGS_LABEL_WIDTH as usize),
            label_style,
        );

        let value = match field {
            SettingsField::SupportsImages => {
                let mark = if form.supports_vision { "[x]" } else { "[ ]" };
                format!("{} force on for models not recognised as vision models", mark)
            }
            SettingsField::ApiKey if !form.show_key => mask_key(form.api_key.text()),
            _ => {
                let input = match field {
                    SettingsField::ApiKey => &form.api_key,
                    SettingsField::BaseUrl => &form.base_url,
                    SettingsField::Model => &form.model,
                    _ => &form.system_prompt,
                };
                let offset = scroll_offset(input.cursor(), value_width);
                if focused {
                    cursor = Some((input.cursor() - offset) as u16);
                }
                input.text().chars().skip(offset).take(value_width).collect()
            }
        };
        let value_style = if focused {
            Style::default().fg(Color::Cyan).bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Cyan)
        };
        lines.push(Line::from(vec![label, Span::styled(value, value_style)]));
    }

    lines.push(Line::default());
    if key_source == Some(KeySource::Env) {
        lines.push(Line::from(Span::styled(
            "API key comes from the environment and is not written to the config file",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        lines.push(Line::default());
    }
    lines.push(Line::from(Span::styled(
        "Tab/Up/Down move  Space toggle  F2 show key  Enter save  Esc cancel",
        Style::default().fg(Color::DarkGray),
    )));

    frame.render_widget(Paragraph::new(lines), inner);

    if let Some(x) = cursor {
        frame.set_cursor_position((
            inner.x + SETTINGS_LABEL_WIDTH + x,
            inner.y + form.focus as u16,
        ));
    }
}

fn render_line_input(title: &str, help: &str, input: &TextInput, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(64, 5, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title.to_string());
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let help_area = Rect::new(inner.x, inner.y, inner.width, 1);
    frame.render_widget(
        Paragraph::new(help.to_string()).style(Style::default().fg(Color::DarkGray)),
        help_area,
    );

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = inner.width as usize;
    let offset = scroll_offset(input.cursor(), width);
    let visible: String = input.text().chars().skip(offset).take(width).collect();
    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    frame.set_cursor_position((
        input_area.x + (input.cursor() - offset) as u16,
        input_area.y,
    ));
}

fn render_confirm(dialog: &ConfirmDialog, frame: &mut Frame, area: Rect) {
    let width = 60u16;
    let message_height = text_height(&dialog.message, width.saturating_sub(2));
    let extra = if dialog.dont_ask_again.is_some() { 2 } else { 0 };
    let popup_area = centered_rect(width, message_height + extra + 4, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" {} ", dialog.title));

    let mut lines: Vec<Line> = dialog.message.lines().map(|l| Line::from(l.to_string())).collect();
    let mut help = "y/Enter confirm  n/Esc cancel";
    if let Some(checked) = dialog.dont_ask_again {
        let mark = if checked { "[x]" } else { "[ ]" };
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("{} Don't show this again", mark),
            Style::default().fg(Color::Cyan),
        )));
        help = "y/Enter confirm  n/Esc cancel  Space toggle";
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))));

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, popup_area);
}

fn render_error(title: &str, message: &str, frame: &mut Frame, area: Rect) {
    let width = 64u16;
    let message_height = text_height(message, width.saturating_sub(2));
    let popup_area = centered_rect(width, message_height + 4, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(format!(" {} ", title));

    let mut lines: Vec<Line> = message.lines().map(|l| Line::from(l.to_string())).collect();
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "Press Enter or Esc to close",
        Style::default().fg(Color::DarkGray),
    )));

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, popup_area);
}

fn render_model_picker(picker: &mut ModelPicker, current: &str, frame: &mut Frame, area: Rect) {
    let popup_height = if picker.loading {
        3
    } else {
        picker.models.len() as u16 + 2
    };
    let popup_area = centered_rect(48, popup_height, area);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    if picker.loading {
        let loading = Paragraph::new("Loading models...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(loading, popup_area);
        return;
    }

    let items: Vec<ListItem> = picker
        .models
        .iter()
        .map(|model| {
            let style = if model == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut picker.state);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_texts(line: &Line) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_parse_markdown_bold_italic_code() {
        let line = parse_markdown_line("a **b** *c* `d`");
        assert_eq!(span_texts(&line), vec!["a ", "b", " ", "c", " ", "d"]);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert!(line.spans[3].style.add_modifier.contains(Modifier::ITALIC));
        assert_eq!(line.spans[5].style.fg, Some(Color::Magenta));
    }

    #[test]
    fn test_parse_markdown_unclosed_markers_are_literal() {
        let line = parse_markdown_line("2 * 3 and **open");
        assert_eq!(span_texts(&line), vec!["2 * 3 and **open"]);

        let bullet = parse_markdown_line("* item");
        assert_eq!(span_texts(&bullet), vec!["* item"]);
    }

    #[test]
    fn test_parse_markdown_heading() {
        let line = parse_markdown_line("## Setup");
        assert_eq!(span_texts(&line), vec!["Setup"]);
        assert!(line.spans[0].style.add_modifier.contains(Modifier::BOLD));

        let hashtag = parse_markdown_line("#rustlang");
        assert_eq!(span_texts(&hashtag), vec!["#rustlang"]);
    }

    #[test]
    fn test_wrapped_height() {
        assert_eq!(wrapped_height(&Line::default(), 10), 1);
        assert_eq!(wrapped_height(&Line::from("0123456789"), 10), 1);
        assert_eq!(wrapped_height(&Line::from("0123456789a"), 10), 2);
    }

    #[test]
    fn test_scroll_offset_keeps_cursor_visible() {
        assert_eq!(scroll_offset(3, 10), 0);
        assert_eq!(scroll_offset(10, 10), 1);
        assert_eq!(scroll_offset(25, 10), 16);
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key("sk-123456"), "*****...3456");
    }

    #[test]
    fn test_code_rows_number_blocks_across_messages() {
        let mut lines = Vec::new();
        let mut rows = Vec::new();
        push_message(&mut lines, &mut rows, &ChatMessage::user("```\nprint(1)\n```"), Some(1));
        push_message(
            &mut lines,
            &mut rows,
            &ChatMessage::assistant("Here:\n```rust\nfn main() {}\n```"),
            Some(1),
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(span_texts(&lines[rows[0]]), vec!["── code #1 "]);
        assert_eq!(span_texts(&lines[rows[1]]), vec!["── rust #2 "]);
        assert_eq!(lines[rows[1]].spans[0].style.bg, Some(Color::Yellow));
    }
}
