use std::sync::Mutex;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// User-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn info(&self, message: &str) {
        self.notify(NoticeLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.notify(NoticeLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => event!(target: "rustphantom::notice", Level::INFO, "{}", message),
            NoticeLevel::Warn => event!(target: "rustphantom::notice", Level::WARN, "{}", message),
            NoticeLevel::Error => {
                event!(target: "rustphantom::notice", Level::ERROR, "{}", message)
            }
        }
    }
}

/// Keeps every notification, e.g. for a dashboard feed.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices().into_iter().map(|n| n.message).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(Notice {
                level,
                message: message.to_string(),
            });
        }
    }
}
