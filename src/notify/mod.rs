//! Progress notification sink
//!
//! User-facing progress goes through a write-only sink of typed messages so
//! the lifecycle engine stays decoupled from rendering. Messages are emitted
//! in stage order; the sink is single-threaded per invocation.

use std::time::Duration;

/// Kind of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Start of a stage.
    Title,
    /// Work in progress inside a stage.
    Activity,
    /// Stage completed; carries timings.
    Success,
    /// Non-fatal problem (best-effort cleanup failures and the like).
    Warning,
    /// Fatal problem; the intent will abort.
    Error,
}

/// A single progress message.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
    pub emoji: Option<&'static str>,
    /// `(total since start, since current stage)` durations.
    pub timing: Option<(Duration, Duration)>,
    /// Render both durations instead of just the total.
    pub multi_stage: bool,
}

impl Message {
    fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            emoji: None,
            timing: None,
            multi_stage: false,
        }
    }

    pub fn title(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Title, text)
    }

    pub fn activity(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Activity, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Success, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, text)
    }

    pub fn with_emoji(mut self, emoji: &'static str) -> Self {
        self.emoji = Some(emoji);
        self
    }

    pub fn with_timing(mut self, total: Duration, stage: Duration) -> Self {
        self.timing = Some((total, stage));
        self
    }

    pub fn multi_stage(mut self, multi: bool) -> Self {
        self.multi_stage = multi;
        self
    }
}

/// Write-only sink for progress messages.
pub trait Notify: Send + Sync {
    fn notify(&self, message: Message);
}

/// Renders messages to stdout.
///
/// Diagnostics go to stderr via `tracing`; this is the user-facing stream.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notify for ConsoleNotifier {
    fn notify(&self, message: Message) {
        println!("{}", render(&message));
    }
}

fn render(message: &Message) -> String {
    let mut line = String::new();
    match message.kind {
        MessageKind::Title => {
            if let Some(emoji) = message.emoji {
                line.push_str(emoji);
                line.push(' ');
            }
            line.push_str(&message.text);
        }
        MessageKind::Activity => {
            line.push_str("► ");
            line.push_str(&message.text);
        }
        MessageKind::Success => {
            line.push_str("✔ ");
            line.push_str(&message.text);
        }
        MessageKind::Warning => {
            line.push_str("⚠ ");
            line.push_str(&message.text);
        }
        MessageKind::Error => {
            line.push_str("✗ ");
            line.push_str(&message.text);
        }
    }

    if let Some((total, stage)) = message.timing {
        if message.multi_stage {
            line.push_str(&format!(
                " ({} total, {} stage)",
                format_duration(total),
                format_duration(stage)
            ));
        } else {
            line.push_str(&format!(" ({})", format_duration(total)));
        }
    }

    line
}

/// Compact human-readable duration: "350ms", "4.2s", "1m 5s".
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collects messages for assertions on emission order.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        messages: Mutex<Vec<Message>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<Message> {
            self.messages.lock().unwrap().clone()
        }

        /// Texts of all messages of the given kind, in emission order.
        pub fn texts(&self, kind: MessageKind) -> Vec<String> {
            self.messages()
                .into_iter()
                .filter(|m| m.kind == kind)
                .map(|m| m.text)
                .collect()
        }
    }

    impl Notify for RecordingNotifier {
        fn notify(&self, message: Message) {
            self.messages.lock().unwrap().push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(350)), "350ms");
        assert_eq!(format_duration(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }

    #[test]
    fn test_render_success_timings() {
        let single = Message::success("Cluster created")
            .with_timing(Duration::from_secs(65), Duration::from_secs(5));
        assert_eq!(render(&single), "✔ Cluster created (1m 5s)");

        let multi = Message::success("Cluster created")
            .with_timing(Duration::from_secs(65), Duration::from_secs(5))
            .multi_stage(true);
        assert_eq!(render(&multi), "✔ Cluster created (1m 5s total, 5.0s stage)");
    }

    #[test]
    fn test_render_title_emoji() {
        let msg = Message::title("Create cluster...").with_emoji("🚀");
        assert_eq!(render(&msg), "🚀 Create cluster...");
    }
}
