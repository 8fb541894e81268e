//! Chat session controller
//!
//! Owns the conversation store, tracks which conversation is on screen and
//! the single in-flight reply. Every request carries an id; events from a
//! request that has since been cancelled or superseded are dropped, so a
//! late reply can never land in the wrong conversation.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::attachment::ImageAttachment;
use crate::error::ChatResult;
use crate::history::ConversationStore;
use crate::state::{ChatMessage, Conversation};

/// Quiet period after the last change before history is written
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    pub request_id: u64,
    pub conversation_id: String,
    pub content: String,
}

/// Everything the network task needs to issue a request
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub request_id: u64,
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug)]
pub enum BeginOutcome {
    Started(OutgoingRequest),
    NothingToSend,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Appended,
    Empty,
    Discarded,
}

pub struct ChatSession {
    store: ConversationStore,
    current_id: String,
    pending: Option<PendingReply>,
    next_request_id: u64,
    changed_at: Option<Instant>,
}

impl ChatSession {
    /// Select the newest conversation, creating one if the store is empty
    pub fn open(mut store: ConversationStore) -> Self {
        let current_id = match store.sorted_ids().into_iter().next() {
            Some(id) => id,
            None => store.create(),
        };
        let fresh = store.len() == 1 && store.get(&current_id).is_some_and(|c| c.messages.is_empty());

        Self {
            store,
            current_id,
            pending: None,
            next_request_id: 1,
            changed_at: fresh.then(Instant::now),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn current_id(&self) -> &str {
        &self.current_id
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.store.get(&self.current_id)
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        self.store.sorted_ids()
    }

    pub fn pending(&self) -> Option<&PendingReply> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn touch(&mut self) {
        self.changed_at = Some(Instant::now());
    }

    pub fn new_conversation(&mut self) -> String {
        self.cancel();
        let id = self.store.create();
        self.current_id = id.clone();
        self.touch();
        id
    }

    /// Switch conversations. Returns false if `id` is unknown or already current.
    pub fn select(&mut self, id: &str) -> bool {
        if id == self.current_id || self.store.get(id).is_none() {
            return false;
        }
        self.cancel();
        self.current_id = id.to_string();
        true
    }

    pub fn rename(&mut self, id: &str, title: &str) -> bool {
        let renamed = self.store.rename(id, title);
        if renamed {
            self.touch();
        }
        renamed
    }

    pub fn delete(&mut self, id: &str) -> bool {
        if id == self.current_id {
            self.cancel();
        }
        if !self.store.delete(id) {
            return false;
        }
        if id == self.current_id {
            self.current_id = match self.store.sorted_ids().into_iter().next() {
                Some(next) => next,
                None => self.store.create(),
            };
        }
        self.touch();
        true
    }

    pub fn clear_all(&mut self) -> ChatResult<()> {
        self.cancel();
        self.store.clear()?;
        self.current_id = self.store.create();
        self.touch();
        Ok(())
    }

    /// Append the user's turn and hand back the transcript to send. The
    /// system prompt is only prepended to what goes over the wire.
    pub fn begin_request(
        &mut self,
        text: &str,
        images: &[ImageAttachment],
        system_prompt: Option<&str>,
    ) -> BeginOutcome {
        if self.pending.is_some() {
            return BeginOutcome::Busy;
        }
        let text = text.trim();
        if text.is_empty() && images.is_empty() {
            return BeginOutcome::NothingToSend;
        }
        if self.store.get(&self.current_id).is_none() {
            self.current_id = self.store.create();
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let conversation_id = self.current_id.clone();
        let Some(conv) = self.store.get_mut(&conversation_id) else {
            return BeginOutcome::NothingToSend;
        };
        conv.push(ChatMessage::user_with_images(text, images));

        let mut messages = Vec::with_capacity(conv.messages.len() + 1);
        if let Some(prompt) = system_prompt.map(str::trim).filter(|p| !p.is_empty()) {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(conv.messages.iter().cloned());

        self.pending = Some(PendingReply {
            request_id,
            conversation_id: conversation_id.clone(),
            content: String::new(),
        });
        self.touch();

        info!(request_id, conversation = %conversation_id, "request started");
        BeginOutcome::Started(OutgoingRequest {
            request_id,
            conversation_id,
            messages,
        })
    }

    /// Returns false when the delta belongs to a request that is no longer live
    pub fn apply_delta(&mut self, request_id: u64, delta: &str) -> bool {
        match self.pending.as_mut() {
            Some(pending) if pending.request_id == request_id => {
                pending.content.push_str(delta);
                true
            }
            _ => {
                debug!(request_id, "dropping stale delta");
                false
            }
        }
    }

    pub fn finish_request(&mut self, request_id: u64) -> ReplyOutcome {
        let pending = match self.pending.take() {
            Some(p) if p.request_id == request_id => p,
            other => {
                self.pending = other;
                debug!(request_id, "dropping stale completion");
                return ReplyOutcome::Discarded;
            }
        };

        if pending.content.is_empty() {
            return ReplyOutcome::Empty;
        }

        info!(request_id, chars = pending.content.chars().count(), "reply complete");
        match self.store.get_mut(&pending.conversation_id) {
            Some(conv) => {
                conv.push(ChatMessage::assistant(pending.content));
                self.touch();
                ReplyOutcome::Appended
            }
            None => ReplyOutcome::Discarded,
        }
    }

    /// Clear a failed request. Returns whether the failure concerns the live
    /// request and should be shown; the partial reply is not kept.
    pub fn fail_request(&mut self, request_id: u64) -> bool {
        match &self.pending {
            Some(p) if p.request_id == request_id => {
                self.pending = None;
                true
            }
            _ => {
                debug!(request_id, "dropping stale failure");
                false
            }
        }
    }

    /// Abandon the in-flight request, returning its id
    pub fn cancel(&mut self) -> Option<u64> {
        let cancelled = self.pending.take().map(|p| p.request_id);
        if let Some(id) = cancelled {
            debug!(request_id = id, "request cancelled");
        }
        cancelled
    }

    pub fn is_dirty(&self) -> bool {
        self.changed_at.is_some()
    }

    /// Save once the debounce window since the last change has passed
    pub fn save_if_due(&mut self, now: Instant) -> ChatResult<bool> {
        match self.changed_at {
            Some(changed) if now.duration_since(changed) >= SAVE_DEBOUNCE => {
                self.flush()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Save immediately if anything changed
    pub fn flush(&mut self) -> ChatResult<()> {
        if self.changed_at.is_some() {
            self.store.save()?;
            self.changed_at = None;
        }
        Ok(())
    }
}
