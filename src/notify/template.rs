//! Placeholder substitution for notification text.

use serde::{Deserialize, Serialize};

use super::StructuredMessage;

pub const DEFAULT_EVENT_FORMAT: &str = "[inotify] %TYPE% %EVENT%: %PATH%/%FILE%";

/// Text template with `%TYPE%`, `%EVENT%`, `%PATH%` and `%FILE%` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTemplate(String);

impl MessageTemplate {
    pub fn new(format: impl Into<String>) -> Self {
        Self(format.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute every placeholder with the message field, verbatim.
    ///
    /// Single pass: substituted values are never scanned for placeholders.
    pub fn render(&self, message: &StructuredMessage) -> String {
        let path = message.path.display().to_string();
        let fields = [
            ("%TYPE%", message.entry_kind.as_str()),
            ("%EVENT%", message.event_description.as_str()),
            ("%PATH%", path.as_str()),
            ("%FILE%", message.filename.as_str()),
        ];

        let mut out = String::with_capacity(self.0.len() + path.len());
        let mut rest = self.0.as_str();

        'scan: while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            rest = &rest[start..];

            for (placeholder, value) in fields {
                if let Some(tail) = rest.strip_prefix(placeholder) {
                    out.push_str(value);
                    rest = tail;
                    continue 'scan;
                }
            }

            out.push('%');
            rest = &rest[1..];
        }

        out.push_str(rest);
        out
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EntryKind;
    use std::path::PathBuf;

    fn message() -> StructuredMessage {
        StructuredMessage {
            entry_kind: EntryKind::Directory,
            event_description: "create and delete".to_string(),
            path: PathBuf::from("/srv/incoming"),
            filename: "batch-7".to_string(),
        }
    }

    #[test]
    fn test_default_format() {
        assert_eq!(
            MessageTemplate::default().render(&message()),
            "[inotify] directory create and delete: /srv/incoming/batch-7"
        );
    }

    #[test]
    fn test_custom_format_and_repeats() {
        let template = MessageTemplate::new("%FILE% (%TYPE%) in %PATH% -- %FILE%");
        assert_eq!(
            template.render(&message()),
            "batch-7 (directory) in /srv/incoming -- batch-7"
        );
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let mut msg = message();
        msg.filename = "%PATH%".to_string();
        msg.event_description = "%FILE%".to_string();
        assert_eq!(
            MessageTemplate::new("%EVENT% %FILE%").render(&msg),
            "%FILE% %PATH%"
        );
    }

    #[test]
    fn test_unknown_placeholders_kept() {
        assert_eq!(
            MessageTemplate::new("100% %NOPE% %FILE%").render(&message()),
            "100% %NOPE% batch-7"
        );
    }
}
