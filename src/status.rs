use std::sync::Mutex;

/// `headline` carries the current phase, `detail` running counts. The scanner calls `detail`
/// from its hot loop.
pub trait StatusSink: Send + Sync {
    fn headline(&self, message: &str);
    fn detail(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Headline(String),
    Detail(String),
}

/// Keeps every update in order. Useful for front-ends that poll, and for tests.
#[derive(Debug, Default)]
pub struct StatusLog {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    pub fn headlines(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                StatusUpdate::Headline(m) => Some(m),
                StatusUpdate::Detail(_) => None,
            })
            .collect()
    }

    pub fn details(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                StatusUpdate::Detail(m) => Some(m),
                StatusUpdate::Headline(_) => None,
            })
            .collect()
    }

    fn push(&self, update: StatusUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }
}

impl StatusSink for StatusLog {
    fn headline(&self, message: &str) {
        self.push(StatusUpdate::Headline(message.to_string()));
    }

    fn detail(&self, message: &str) {
        self.push(StatusUpdate::Detail(message.to_string()));
    }
}

/// Formats a count with thousands separators: `1234567` -> `"1,234,567"`.
pub fn format_count(n: u64) -> String {
    let mut buf = itoa::Buffer::new();
    let digits = buf.format(n);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
