use std::path::{Path, PathBuf};
use std::time::Instant;

use aichat_core::markdown;
use aichat_core::{
    load_attachment, Attachment, BeginOutcome, ChatError, ChatRole, ChatSession, Config, ConversationStore,
    ImageAttachment, LoadOutcome, OpenAIClient, OutgoingRequest, ReplyOutcome, Settings,
};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::editor::TextInput;
use crate::tui::{AppEvent, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Conversations,
    Chat,
    Input,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Conversations => FocusPane::Chat,
            FocusPane::Chat => FocusPane::Input,
            FocusPane::Input => FocusPane::Conversations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Thinking,
    Error,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Ready => "Ready",
            Status::Thinking => "Thinking...",
            Status::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    DeleteConversation(String),
    ClearAll,
    SendWithImages,
}

#[derive(Debug, Clone)]
pub struct ConfirmDialog {
    pub title: String,
    pub message: String,
    pub action: ConfirmAction,
    /// "Don't show again" checkbox, when the dialog offers one
    pub dont_ask_again: Option<bool>,
}

/// Field order in the settings dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    ApiKey,
    BaseUrl,
    Model,
    SystemPrompt,
    SupportsImages,
}

impl SettingsField {
    pub const ALL: [SettingsField; 5] = [
        SettingsField::ApiKey,
        SettingsField::BaseUrl,
        SettingsField::Model,
        SettingsField::SystemPrompt,
        SettingsField::SupportsImages,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::ApiKey => "API key",
            SettingsField::BaseUrl => "Base URL",
            SettingsField::Model => "Model",
            SettingsField::SystemPrompt => "System prompt",
            SettingsField::SupportsImages => "Supports images",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsForm {
    pub api_key: TextInput,
    pub base_url: TextInput,
    pub model: TextInput,
    pub system_prompt: TextInput,
    pub supports_vision: bool,
    pub focus: usize,
    pub show_key: bool,
}

impl SettingsForm {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: TextInput::with_text(settings.api_key.clone()),
            base_url: TextInput::with_text(settings.base_url.clone()),
            model: TextInput::with_text(settings.model.clone()),
            system_prompt: TextInput::with_text(settings.system_prompt.clone().unwrap_or_default()),
            supports_vision: settings.supports_vision,
            focus: 0,
            show_key: false,
        }
    }

    pub fn focused(&self) -> SettingsField {
        SettingsField::ALL[self.focus]
    }

    /// The text field with focus; `None` on the checkbox
    pub fn focused_input(&mut self) -> Option<&mut TextInput> {
        match self.focused() {
            SettingsField::ApiKey => Some(&mut self.api_key),
            SettingsField::BaseUrl => Some(&mut self.base_url),
            SettingsField::Model => Some(&mut self.model),
            SettingsField::SystemPrompt => Some(&mut self.system_prompt),
            SettingsField::SupportsImages => None,
        }
    }

    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % SettingsField::ALL.len();
    }

    pub fn prev_field(&mut self) {
        self.focus = (self.focus + SettingsField::ALL.len() - 1) % SettingsField::ALL.len();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelPicker {
    pub models: Vec<String>,
    pub state: ListState,
    pub loading: bool,
}

impl ModelPicker {
    pub fn nav_down(&mut self) {
        let len = self.models.len();
        if len > 0 {
            let i = self.state.selected().unwrap_or(0);
            self.state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn nav_up(&mut self) {
        let i = self.state.selected().unwrap_or(0);
        self.state.select(Some(i.saturating_sub(1)));
    }
}

#[derive(Debug, Clone)]
pub enum Popup {
    Settings(SettingsForm),
    Rename { id: String, input: TextInput },
    Attach(TextInput),
    Confirm(ConfirmDialog),
    ModelPicker(ModelPicker),
    Error { title: String, message: String },
}

/// Where state lives on disk, plus command-line overrides
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub config_path: PathBuf,
    pub history_path: PathBuf,
    pub model_override: Option<String>,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub status: Status,
    /// One-line message shown in the footer until the next action
    pub notice: Option<String>,

    // Data
    pub session: ChatSession,
    pub settings: Settings,
    config_path: PathBuf,

    // Conversation list
    pub conversation_ids: Vec<String>,
    pub conversation_state: ListState,

    // Composer
    pub input: TextInput,
    pub pending_images: Vec<ImageAttachment>,

    // Transcript view
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub total_chat_lines: u16,
    /// Stick to the bottom while replies stream in
    pub follow_output: bool,
    pub selected_code_block: Option<usize>,
    /// Set when the selected block should be scrolled into view on next draw
    pub scroll_to_code: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub popup: Option<Popup>,

    // Background work
    request_task: Option<JoinHandle<()>>,
    model_task: Option<JoinHandle<()>>,
    events: UnboundedSender<AppEvent>,

    // Panel areas for mouse hit-testing (updated during render)
    pub conversations_area: Option<Rect>,
    pub chat_area: Option<Rect>,
}

impl App {
    pub fn new(options: AppOptions, events: UnboundedSender<AppEvent>) -> Self {
        let mut startup_error = None;

        let config = match Config::load_from(&options.config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %options.config_path.display(), error = %e, "could not read config, using defaults");
                startup_error = Some(format!(
                    "Could not read {}: {}\nDefaults are in use until settings are saved.",
                    options.config_path.display(),
                    e
                ));
                Config::default()
            }
        };

        let mut settings = Settings::resolve(&config);
        if let Some(model) = options.model_override.filter(|m| !m.trim().is_empty()) {
            settings.model = model.trim().to_string();
        }
        info!(
            model = %settings.model,
            key_source = settings.api_key_source().map_or("none", |s| s.as_str()),
            "settings resolved"
        );

        let mut store = ConversationStore::new(&options.history_path);
        let notice = match store.load() {
            Ok(LoadOutcome::Loaded(n)) => {
                info!(conversations = n, "history loaded");
                None
            }
            Ok(LoadOutcome::Missing) | Ok(LoadOutcome::Empty) => None,
            Ok(LoadOutcome::Incompatible(version)) => Some(format!(
                "History file version {} is not supported, starting fresh",
                version
            )),
            Ok(LoadOutcome::Corrupt(_)) => {
                Some("History file is damaged, starting fresh".to_string())
            }
            Err(e) => {
                error!(error = %e, "could not read history");
                Some(format!("Could not read history: {}", e))
            }
        };

        let session = ChatSession::open(store);

        let popup = match startup_error {
            Some(message) => Some(Popup::Error {
                title: "Configuration".to_string(),
                message,
            }),
            None if settings.api_key.trim().is_empty() => {
                Some(Popup::Settings(SettingsForm::from_settings(&settings)))
            }
            None => None,
        };

        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,
            status: Status::Ready,
            notice,
            session,
            settings,
            config_path: options.config_path,
            conversation_ids: Vec::new(),
            conversation_state: ListState::default(),
            input: TextInput::new(),
            pending_images: Vec::new(),
            chat_scroll: 0,
            chat_height: 0,
            total_chat_lines: 0,
            follow_output: true,
            selected_code_block: None,
            scroll_to_code: false,
            animation_frame: 0,
            popup,
            request_task: None,
            model_task: None,
            events,
            conversations_area: None,
            chat_area: None,
        };
        app.refresh_conversations();
        app
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    pub fn show_error(&mut self, title: &str, message: impl Into<String>) {
        self.popup = Some(Popup::Error {
            title: title.to_string(),
            message: message.into(),
        });
    }

    fn persist_config(&self) -> Result<(), ChatError> {
        self.settings.to_config().save_to(&self.config_path)?;
        info!(path = %self.config_path.display(), "settings saved");
        Ok(())
    }

    // Conversation list

    /// Re-read the ordering and move the highlight to the open conversation
    pub fn refresh_conversations(&mut self) {
        self.conversation_ids = self.session.conversation_ids();
        let current = self
            .conversation_ids
            .iter()
            .position(|id| id == self.session.current_id());
        self.conversation_state.select(current);
    }

    fn reset_view(&mut self) {
        self.chat_scroll = 0;
        self.follow_output = true;
        self.selected_code_block = None;
        self.scroll_to_code = false;
    }

    pub fn highlighted_conversation(&self) -> Option<&String> {
        self.conversation_state
            .selected()
            .and_then(|i| self.conversation_ids.get(i))
    }

    pub fn nav_down(&mut self) {
        let len = self.conversation_ids.len();
        if len > 0 {
            let i = self.conversation_state.selected().unwrap_or(0);
            self.conversation_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn nav_up(&mut self) {
        let i = self.conversation_state.selected().unwrap_or(0);
        self.conversation_state.select(Some(i.saturating_sub(1)));
    }

    pub fn nav_first(&mut self) {
        if !self.conversation_ids.is_empty() {
            self.conversation_state.select(Some(0));
        }
    }

    pub fn nav_last(&mut self) {
        if !self.conversation_ids.is_empty() {
            self.conversation_state.select(Some(self.conversation_ids.len() - 1));
        }
    }

    /// Open the highlighted conversation
    pub fn open_highlighted(&mut self) {
        let Some(id) = self.highlighted_conversation().cloned() else {
            return;
        };
        let was_busy = self.is_busy();
        if self.session.select(&id) {
            if was_busy {
                self.abort_request_task();
                self.status = Status::Ready;
            }
            self.reset_view();
            self.focus = FocusPane::Chat;
        }
    }

    pub fn new_conversation(&mut self) {
        self.abort_request_task();
        self.session.new_conversation();
        self.status = Status::Ready;
        self.refresh_conversations();
        self.reset_view();
        self.focus = FocusPane::Input;
        self.input_mode = InputMode::Editing;
    }

    pub fn open_rename(&mut self) {
        let Some(id) = self.highlighted_conversation().cloned() else {
            return;
        };
        let title = self
            .session
            .store()
            .get(&id)
            .map(|c| c.title.clone())
            .unwrap_or_default();
        self.popup = Some(Popup::Rename {
            id,
            input: TextInput::with_text(title),
        });
    }

    pub fn rename_conversation(&mut self, id: &str, title: &str) {
        if self.session.rename(id, title) {
            self.refresh_conversations();
        } else {
            self.notice = Some("Title must not be empty".to_string());
        }
    }

    pub fn request_delete(&mut self) {
        let Some(id) = self.highlighted_conversation().cloned() else {
            return;
        };
        let title = self
            .session
            .store()
            .get(&id)
            .map(|c| c.title.clone())
            .unwrap_or_default();
        self.popup = Some(Popup::Confirm(ConfirmDialog {
            title: "Delete conversation".to_string(),
            message: format!("Delete \"{}\"? This cannot be undone.", title),
            action: ConfirmAction::DeleteConversation(id),
            dont_ask_again: None,
        }));
    }

    pub fn request_clear_all(&mut self) {
        self.popup = Some(Popup::Confirm(ConfirmDialog {
            title: "Clear all history".to_string(),
            message: "Delete every conversation? This cannot be undone.".to_string(),
            action: ConfirmAction::ClearAll,
            dont_ask_again: None,
        }));
    }

    pub fn confirm(&mut self, dialog: ConfirmDialog) {
        match dialog.action {
            ConfirmAction::DeleteConversation(id) => {
                let is_current = id == self.session.current_id();
                if is_current {
                    self.abort_request_task();
                    self.status = Status::Ready;
                }
                if self.session.delete(&id) {
                    info!(conversation = %id, "conversation deleted");
                    if is_current {
                        self.reset_view();
                    }
                    self.refresh_conversations();
                }
            }
            ConfirmAction::ClearAll => {
                self.abort_request_task();
                self.status = Status::Ready;
                if let Err(e) = self.session.clear_all() {
                    error!(error = %e, "could not clear history");
                    self.show_error("Clear failed", format!("Could not clear history: {}", e));
                }
                self.reset_view();
                self.refresh_conversations();
            }
            ConfirmAction::SendWithImages => {
                if dialog.dont_ask_again == Some(true) {
                    self.settings.skip_vision_warning = true;
                    if let Err(e) = self.persist_config() {
                        warn!(error = %e, "could not persist vision warning choice");
                    }
                }
                self.send_now();
            }
        }
    }

    // Settings and model

    pub fn open_settings(&mut self) {
        self.popup = Some(Popup::Settings(SettingsForm::from_settings(&self.settings)));
    }

    pub fn save_settings(&mut self, form: &SettingsForm) {
        self.settings.apply_edit(
            form.api_key.text(),
            form.base_url.text(),
            form.model.text(),
            form.system_prompt.text(),
            form.supports_vision,
        );
        match self.persist_config() {
            Ok(()) => self.notice = Some("Settings saved".to_string()),
            Err(e) => {
                error!(error = %e, "could not save settings");
                self.show_error("Settings", format!("Could not save settings: {}", e));
            }
        }
    }

    pub fn open_model_picker(&mut self) {
        if let Err(e) = self.settings.validate() {
            self.show_error("Missing configuration", format!("{}. Press s to open settings.", e));
            return;
        }
        let client = match OpenAIClient::new(&self.settings.api_key, &self.settings.base_url) {
            Ok(client) => client,
            Err(e) => {
                self.show_error("Model list", e.to_string());
                return;
            }
        };

        self.popup = Some(Popup::ModelPicker(ModelPicker {
            loading: true,
            ..ModelPicker::default()
        }));

        if let Some(task) = self.model_task.take() {
            task.abort();
        }
        let events = self.events.clone();
        self.model_task = Some(tokio::spawn(async move {
            let result = client.list_models().await.map_err(|e| {
                warn!(error = %e, "could not list models");
                e.to_string()
            });
            let _ = events.send(AppEvent::Models(result));
        }));
    }

    pub fn handle_models(&mut self, result: Result<Vec<String>, String>) {
        self.model_task = None;
        let Some(Popup::ModelPicker(picker)) = self.popup.as_mut() else {
            return;
        };
        match result {
            Ok(models) if models.is_empty() => {
                self.show_error("Model list", "The server returned no models");
            }
            Ok(models) => {
                let current = models.iter().position(|m| *m == self.settings.model);
                picker.models = models;
                picker.state.select(Some(current.unwrap_or(0)));
                picker.loading = false;
            }
            Err(message) => {
                self.show_error("Model list", format!("Could not list models: {}", message));
            }
        }
    }

    pub fn choose_model(&mut self, model: &str) {
        self.settings.model = model.to_string();
        info!(model, "model selected");
        match self.persist_config() {
            Ok(()) => self.notice = Some(format!("Model set to {}", model)),
            Err(e) => self.show_error("Settings", format!("Could not save settings: {}", e)),
        }
    }

    // Attachments

    pub fn open_attach(&mut self) {
        self.popup = Some(Popup::Attach(TextInput::new()));
    }

    pub fn attach_file(&mut self, raw_path: &str) {
        let raw_path = raw_path.trim().trim_matches(|c| c == '"' || c == '\'');
        if raw_path.is_empty() {
            return;
        }
        let path = expand_home(raw_path);

        match load_attachment(&path) {
            Ok(Attachment::Image(image)) => {
                info!(file = %image.file_name, mime = %image.mime, "image attached");
                self.notice = Some(format!("Attached {}", image.file_name));
                self.pending_images.push(image);
            }
            Ok(Attachment::Text(text)) => {
                info!(path = %path.display(), "text file inserted");
                self.input.append(&text);
                self.focus = FocusPane::Input;
                self.input_mode = InputMode::Editing;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "attachment failed");
                self.show_error("Attach file", format!("Could not attach {}: {}", path.display(), e));
            }
        }
    }

    pub fn remove_last_image(&mut self) {
        if let Some(image) = self.pending_images.pop() {
            self.notice = Some(format!("Removed {}", image.file_name));
        }
    }

    // Sending

    /// Validate and send the composer contents, asking first when images go
    /// to a model that may not accept them
    pub fn submit(&mut self) {
        if self.is_busy() {
            self.notice = Some("Wait for the current reply or press S to stop it".to_string());
            return;
        }
        if self.input.text().trim().is_empty() && self.pending_images.is_empty() {
            return;
        }
        if let Err(e) = self.settings.validate() {
            self.show_error("Missing configuration", format!("{}. Press s to open settings.", e));
            return;
        }

        if !self.pending_images.is_empty()
            && !self.settings.supports_images()
            && !self.settings.skip_vision_warning
        {
            self.popup = Some(Popup::Confirm(ConfirmDialog {
                title: "Images may not be supported".to_string(),
                message: format!(
                    "The model \"{}\" may not accept images. Send anyway?",
                    self.settings.model
                ),
                action: ConfirmAction::SendWithImages,
                dont_ask_again: Some(false),
            }));
            return;
        }

        self.send_now();
    }

    fn send_now(&mut self) {
        let client = match OpenAIClient::new(&self.settings.api_key, &self.settings.base_url) {
            Ok(client) => client,
            Err(e) => {
                self.status = Status::Error;
                self.show_error("Request failed", e.to_string());
                return;
            }
        };

        let text = self.input.text().to_string();
        let outcome = self.session.begin_request(
            &text,
            &self.pending_images,
            self.settings.system_prompt.as_deref(),
        );
        let request = match outcome {
            BeginOutcome::Started(request) => request,
            BeginOutcome::NothingToSend | BeginOutcome::Busy => return,
        };

        self.input.clear();
        self.pending_images.clear();
        self.status = Status::Thinking;
        self.notice = None;
        self.animation_frame = 0;
        self.follow_output = true;
        self.refresh_conversations();

        self.request_task = Some(spawn_request(
            client,
            self.settings.model.clone(),
            request,
            self.events.clone(),
        ));
    }

    pub fn handle_stream_event(&mut self, request_id: u64, event: StreamEvent) {
        match event {
            StreamEvent::Delta(delta) => {
                self.session.apply_delta(request_id, &delta);
            }
            StreamEvent::Finished => {
                match self.session.finish_request(request_id) {
                    ReplyOutcome::Discarded => return,
                    ReplyOutcome::Empty => {
                        self.notice = Some("The model returned an empty reply".to_string());
                    }
                    ReplyOutcome::Appended => {}
                }
                self.request_task = None;
                self.status = Status::Ready;
            }
            StreamEvent::Failed(message) => {
                if self.session.fail_request(request_id) {
                    self.request_task = None;
                    self.status = Status::Error;
                    self.show_error("Request failed", message);
                }
            }
        }
    }

    fn abort_request_task(&mut self) {
        if let Some(task) = self.request_task.take() {
            task.abort();
        }
    }

    /// Stop the reply in progress; what has streamed so far is dropped
    pub fn stop_generation(&mut self) {
        if let Some(request_id) = self.session.cancel() {
            info!(request_id, "generation stopped");
            self.abort_request_task();
            self.status = Status::Ready;
            self.notice = Some("Generation stopped".to_string());
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Err(e) = self.session.save_if_due(now) {
            error!(error = %e, "could not save history");
            self.notice = Some(format!("Could not save history: {}", e));
        }
    }

    /// Abort background work and write any unsaved history
    pub fn shutdown(&mut self) {
        self.abort_request_task();
        if let Some(task) = self.model_task.take() {
            task.abort();
        }
        self.session.cancel();
        if let Err(e) = self.session.flush() {
            error!(error = %e, "could not save history on exit");
        }
    }

    // Code blocks and clipboard

    /// Code blocks of the open conversation, in display order
    pub fn code_blocks(&self) -> Vec<String> {
        self.session
            .current()
            .map(|conv| {
                conv.messages
                    .iter()
                    .flat_map(|m| markdown::code_blocks(m.text()))
                    .map(|(_, code)| code)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn select_next_code_block(&mut self) {
        let count = self.code_blocks().len();
        if count == 0 {
            self.notice = Some("No code blocks in this conversation".to_string());
            return;
        }
        self.selected_code_block = Some(match self.selected_code_block {
            None => 0,
            Some(i) => (i + 1).min(count - 1),
        });
        self.scroll_to_code = true;
    }

    pub fn select_prev_code_block(&mut self) {
        let count = self.code_blocks().len();
        if count == 0 {
            self.notice = Some("No code blocks in this conversation".to_string());
            return;
        }
        self.selected_code_block = Some(match self.selected_code_block {
            None => count - 1,
            Some(i) => i.saturating_sub(1).min(count - 1),
        });
        self.scroll_to_code = true;
    }

    pub fn copy_selected_code(&mut self) {
        let blocks = self.code_blocks();
        let Some(code) = self.selected_code_block.and_then(|i| blocks.get(i)) else {
            self.notice = Some("Select a code block with [ or ] first".to_string());
            return;
        };
        let code = code.trim_end_matches('\n').to_string();
        self.copy(&code, "Code copied");
    }

    pub fn copy_last_reply(&mut self) {
        let last = self.session.current().and_then(|conv| {
            conv.messages
                .iter()
                .rev()
                .find(|m| m.role == ChatRole::Assistant)
                .map(|m| m.text().to_string())
        });
        match last {
            Some(text) => self.copy(&text, "Reply copied"),
            None => self.notice = Some("No reply to copy yet".to_string()),
        }
    }

    fn copy(&mut self, text: &str, done: &str) {
        match copy_to_clipboard(text) {
            Ok(()) => self.notice = Some(done.to_string()),
            Err(e) => {
                warn!(error = %e, "clipboard unavailable");
                self.show_error("Clipboard", format!("Could not copy: {}", e));
            }
        }
    }

    // Transcript scrolling

    fn max_scroll(&self) -> u16 {
        self.total_chat_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.max_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
        self.follow_output = self.chat_scroll >= max_scroll;
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_output = false;
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_output = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
        self.follow_output = true;
    }
}

fn spawn_request(
    client: OpenAIClient,
    model: String,
    request: OutgoingRequest,
    events: UnboundedSender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let request_id = request.request_id;
        let send = |event: StreamEvent| events.send(AppEvent::Stream { request_id, event }).is_ok();

        let result = async {
            let mut stream = client.chat_stream(&model, &request.messages).await?;
            while let Some(delta) = stream.next_delta().await? {
                if !send(StreamEvent::Delta(delta)) {
                    break;
                }
            }
            Ok::<(), ChatError>(())
        }
        .await;

        let event = match result {
            Ok(()) => StreamEvent::Finished,
            Err(e) => {
                error!(request_id, error = %e, "request failed");
                StreamEvent::Failed(e.to_string())
            }
        };
        send(event);
    })
}

fn copy_to_clipboard(text: &str) -> Result<(), arboard::Error> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text.to_string())
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| Path::new(path).to_path_buf()),
        None => PathBuf::from(path),
    }
}
