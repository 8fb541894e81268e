//! Conversation store persisted as a single JSON file

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ChatResult;
use crate::state::{now_timestamp, Conversation};

pub const HISTORY_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    conversations: HashMap<String, Conversation>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// What happened when reading the history file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    Missing,
    Empty,
    Incompatible(u32),
    Corrupt(String),
}

pub struct ConversationStore {
    path: PathBuf,
    conversations: HashMap<String, Conversation>,
}

impl ConversationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conversations: HashMap::new(),
        }
    }

    /// `~/.aichat/conversations.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".aichat").join("conversations.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace in-memory conversations with the file contents. Unreadable
    /// content leaves the store empty rather than failing.
    pub fn load(&mut self) -> ChatResult<LoadOutcome> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(e) => return Err(e.into()),
        };

        let file: HistoryFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "history file is corrupt, starting fresh");
                return Ok(LoadOutcome::Corrupt(e.to_string()));
            }
        };

        if file.version != HISTORY_VERSION {
            warn!(version = file.version, "history file version is incompatible, starting fresh");
            return Ok(LoadOutcome::Incompatible(file.version));
        }

        self.conversations = file.conversations;
        // The map key is authoritative
        for (id, conv) in self.conversations.iter_mut() {
            if conv.id != *id {
                conv.id = id.clone();
            }
        }

        if self.conversations.is_empty() {
            return Ok(LoadOutcome::Empty);
        }

        info!(count = self.conversations.len(), "loaded conversation history");
        Ok(LoadOutcome::Loaded(self.conversations.len()))
    }

    /// Write via a temp file and rename so a crash never leaves a torn file
    pub fn save(&self) -> ChatResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = HistoryFile {
            version: HISTORY_VERSION,
            conversations: self.conversations.clone(),
            last_updated: Some(now_timestamp()),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Create an empty conversation and return its id
    pub fn create(&mut self) -> String {
        let conv = Conversation::new(self.conversations.len() + 1);
        let id = conv.id.clone();
        info!(id = %id, "created conversation");
        self.conversations.insert(id.clone(), conv);
        id
    }

    pub fn insert(&mut self, conversation: Conversation) {
        self.conversations.insert(conversation.id.clone(), conversation);
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    pub fn rename(&mut self, id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        match self.conversations.get_mut(id) {
            Some(conv) => {
                conv.title = title.to_string();
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let removed = self.conversations.remove(id).is_some();
        if removed {
            info!(id = %id, "deleted conversation");
        }
        removed
    }

    /// Drop every conversation and remove the history file
    pub fn clear(&mut self) -> ChatResult<()> {
        self.conversations.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("cleared all conversation history");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Conversation ids, newest first
    pub fn sorted_ids(&self) -> Vec<String> {
        let now = Local::now().naive_local();
        let mut entries: Vec<(NaiveDateTime, &Conversation)> = self
            .conversations
            .values()
            .map(|c| (parse_timestamp_for_sort(&c.created_at, now), c))
            .collect();

        entries.sort_by(|(ta, a), (tb, b)| {
            tb.cmp(ta)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });

        entries.into_iter().map(|(_, c)| c.id.clone()).collect()
    }
}

fn legacy_timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{1,2})\s+(\d{1,2}):(\d{2})$").expect("valid legacy timestamp regex")
    })
}

/// Parse a stored timestamp for ordering. Accepts ISO-8601 (naive or with an
/// offset) and the legacy `MM/DD HH:MM` display form. Anything else sorts
/// as the oldest possible time.
pub fn parse_timestamp_for_sort(timestamp: &str, now: NaiveDateTime) -> NaiveDateTime {
    let timestamp = timestamp.trim();
    if timestamp.is_empty() {
        return NaiveDateTime::MIN;
    }

    if let Some(dt) = parse_iso(timestamp) {
        return dt;
    }

    if let Some(caps) = legacy_timestamp_re().captures(timestamp) {
        let field = |i: usize| caps[i].parse::<u32>().ok();
        if let (Some(month), Some(day), Some(hour), Some(minute)) =
            (field(1), field(2), field(3), field(4))
        {
            let at_year = |year: i32| {
                NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(hour, minute, 0))
            };
            if let Some(dt) = at_year(now.year()) {
                if dt > now {
                    return at_year(now.year() - 1).unwrap_or(NaiveDateTime::MIN);
                }
                return dt;
            }
        }
    }

    NaiveDateTime::MIN
}

fn parse_iso(timestamp: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    // Date and time may be separated by `T` or a space
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(timestamp, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(timestamp, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// `MM/DD HH:MM` for list display, falling back to the raw string
pub fn format_timestamp(timestamp: &str) -> String {
    if timestamp.is_empty() {
        return String::new();
    }
    match parse_iso(timestamp) {
        Some(dt) => dt.format("%m/%d %H:%M").to_string(),
        None => timestamp.to_string(),
    }
}
