//! Chat callback payload parsing
//!
//! The transport sends the raw button payload strings of the chat client
//! (`subject_math`, `variant_free_subject_math`, ...). They are parsed and
//! validated exactly once here, at the boundary; everything behind it works
//! with the tagged [`CallbackAction`] variant.

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// A validated chat action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackAction {
    /// Show the main menu.
    Menu,
    /// Back to the subject list.
    Subjects,
    /// A subject was picked; the tier menu follows.
    Subject { subject: String },
    /// A tier was picked for a subject; triggers a delivery.
    Variant { subject: String, tier: String },
    /// Show the registered-user count.
    Subscribers,
}

impl CallbackAction {
    /// Parse a raw callback payload.
    ///
    /// Payload grammar, as emitted by the chat keyboards:
    /// - `main_menu`, `back_subjects`, `show_subscribers`
    /// - `subject_<code>`
    /// - `variant_<tier>_subject_<code>` (the tier may itself contain
    ///   underscores, e.g. `special_with_answers`)
    pub fn parse(data: &str) -> Result<Self> {
        match data {
            "main_menu" => return Ok(CallbackAction::Menu),
            "back_subjects" => return Ok(CallbackAction::Subjects),
            "show_subscribers" => return Ok(CallbackAction::Subscribers),
            _ => {}
        }

        if let Some(rest) = data.strip_prefix("variant_") {
            let (tier, subject) = rest.split_once("_subject_").ok_or_else(|| malformed(data))?;
            if tier.is_empty() || subject.is_empty() {
                return Err(malformed(data));
            }
            return Ok(CallbackAction::Variant {
                subject: subject.to_string(),
                tier: tier.to_string(),
            });
        }

        if let Some(subject) = data.strip_prefix("subject_") {
            if subject.is_empty() {
                return Err(malformed(data));
            }
            return Ok(CallbackAction::Subject {
                subject: subject.to_string(),
            });
        }

        Err(malformed(data))
    }
}

fn malformed(data: &str) -> ProbeError {
    ProbeError::InvalidArgument(format!("unrecognized callback payload: {}", data))
}
