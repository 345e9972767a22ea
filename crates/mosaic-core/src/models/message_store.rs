use std::collections::HashMap;

use super::message::{Message, MessageId, Role};
use crate::error::{ChatError, ChatResult};

/// Ordered message log for the active conversation.
///
/// Keeps an id→index map alongside the log so entries can be addressed by
/// their stable id, and a dirty flag set by every mutation.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    positions: HashMap<MessageId, usize>,
    dirty: bool,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an existing log; the result starts clean.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut store = Self {
            messages,
            positions: HashMap::new(),
            dirty: false,
        };
        store.reindex(0);
        store
    }

    pub fn append(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.positions.insert(id, self.messages.len());
        self.messages.push(message);
        self.dirty = true;
        id
    }

    /// Drop `index..end`, then append `messages`.
    pub fn replace_from(
        &mut self,
        index: usize,
        messages: Vec<Message>,
    ) -> ChatResult<Vec<Message>> {
        if index > self.messages.len() {
            return Err(ChatError::not_found(format!(
                "message index {} out of bounds (len {})",
                index,
                self.messages.len()
            )));
        }

        let removed: Vec<Message> = self.messages.drain(index..).collect();
        for message in &removed {
            self.positions.remove(&message.id);
        }
        self.messages.extend(messages);
        self.reindex(index);
        self.dirty = true;
        Ok(removed)
    }

    /// Drop the entry at `index` and everything after it.
    pub fn truncate_from(&mut self, index: usize) -> ChatResult<Vec<Message>> {
        self.check_index(index)?;
        self.replace_from(index, Vec::new())
    }

    /// Remove exactly one entry.
    pub fn remove_at(&mut self, index: usize) -> ChatResult<Message> {
        self.check_index(index)?;
        let removed = self.messages.remove(index);
        self.positions.remove(&removed.id);
        self.reindex(index);
        self.dirty = true;
        Ok(removed)
    }

    /// Swap the parts of one entry in place, keeping its id and role.
    pub fn replace_parts(&mut self, index: usize, parts: Vec<super::Part>) -> ChatResult<()> {
        self.check_index(index)?;
        self.messages[index].parts = parts;
        self.dirty = true;
        Ok(())
    }

    /// Map "the Nth message of `role`" (0-based) to its logical index.
    ///
    /// Counting is strictly left-to-right over every entry; callers counting
    /// over a filtered view get undefined results.
    pub fn resolve_index(&self, role: Role, ordinal: usize) -> Option<usize> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == role)
            .nth(ordinal)
            .map(|(index, _)| index)
    }

    pub fn index_of(&self, id: MessageId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Fetch an entry and check it has the expected role.
    pub fn expect_role(&self, index: usize, role: Role) -> ChatResult<&Message> {
        let message = self.get(index).ok_or_else(|| {
            ChatError::not_found(format!(
                "message index {} out of bounds (len {})",
                index,
                self.messages.len()
            ))
        })?;
        if message.role != role {
            return Err(ChatError::not_found(format!(
                "message {} is a {} message, expected {}",
                index, message.role, role
            )));
        }
        Ok(message)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.messages.is_empty() {
            self.dirty = true;
        }
        self.messages.clear();
        self.positions.clear();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn check_index(&self, index: usize) -> ChatResult<()> {
        if index >= self.messages.len() {
            return Err(ChatError::not_found(format!(
                "message index {} out of bounds (len {})",
                index,
                self.messages.len()
            )));
        }
        Ok(())
    }

    fn reindex(&mut self, from: usize) {
        for (index, message) in self.messages.iter().enumerate().skip(from) {
            self.positions.insert(message.id, index);
        }
    }
}
