use std::collections::VecDeque;
use std::time::SystemTime;

use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A non-blocking, user-visible message
#[derive(Clone, Debug)]
pub struct Notice {
    pub timestamp: SystemTime,
    pub level: NoticeLevel,
    pub message: String,
    /// The user can retry the action that produced this notice
    pub retryable: bool,
}

/// Bounded FIFO of notices awaiting display
pub struct NotificationStore {
    entries: Mutex<VecDeque<Notice>>,
    max_entries: usize,
}

impl NotificationStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&self, level: NoticeLevel, message: impl Into<String>, retryable: bool) {
        let mut entries = self.entries.lock();
        entries.push_back(Notice {
            timestamp: SystemTime::now(),
            level,
            message: message.into(),
            retryable,
        });

        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Info, message, false);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Warning, message, false);
    }

    pub fn error(&self, message: impl Into<String>, retryable: bool) {
        self.push(NoticeLevel::Error, message, retryable);
    }

    pub fn all(&self) -> Vec<Notice> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Remove and return everything queued so far.
    pub fn drain(&self) -> Vec<Notice> {
        self.entries.lock().drain(..).collect()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.entries.lock().iter().filter(|n| n.level == level).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(100)
    }
}
