//! Inbound message envelope — body plus optional trailing link.

/// Literal delimiter separating body from link, and the sections of the
/// forwarded message. The value is a parsing contract with the message
/// authors, not a formatting nicety.
pub const PART_DELIMITER: &str = "1111\n\n";

/// Sentinel rendered when a message carries no link.
pub const NO_LINK: &str = "No link";

/// A single inbound message split into its parts. Transient — lives for
/// one pipeline run only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub body: String,
    pub link: Option<String>,
}

impl Envelope {
    /// Split raw text on the first occurrence of [`PART_DELIMITER`].
    ///
    /// A body that legitimately contains the delimiter is split anyway —
    /// that matches the wire contract, ambiguous as it is.
    pub fn parse(text: &str) -> Self {
        match text.split_once(PART_DELIMITER) {
            Some((body, link)) => Self {
                body: body.trim().to_string(),
                link: Some(link.trim().to_string()),
            },
            None => Self {
                body: text.trim().to_string(),
                link: None,
            },
        }
    }

    /// The link, or the "no link" sentinel for prompts and reports.
    pub fn link_or_sentinel(&self) -> &str {
        self.link.as_deref().unwrap_or(NO_LINK)
    }
}
