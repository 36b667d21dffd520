//! Output truncation and error rendering helpers for external commands.

use std::borrow::Cow;

use color_eyre::eyre::eyre;

use crate::error::{ProvisionError, ProvisionErrorKind};

use super::CommandOutput;

pub(super) const OUTPUT_CHAR_LIMIT: usize = 8_192;
pub(super) const TRUNCATION_PREFIX: &str = "[truncated] … ";

/// Builds an error naming the failed step, with the captured output attached.
pub(super) fn render_failure(
    kind: ProvisionErrorKind,
    context: &str,
    output: &CommandOutput,
) -> ProvisionError {
    let text = truncate_output(String::from_utf8_lossy(output.combined()));
    ProvisionError::new(kind, eyre!("{context}\noutput:\n{text}"))
}

/// Keeps the last [`OUTPUT_CHAR_LIMIT`] characters; build tools report the
/// failing step at the end.
pub(super) fn truncate_output(text: Cow<'_, str>) -> String {
    let total = text.chars().count();
    if total <= OUTPUT_CHAR_LIMIT {
        return text.into_owned();
    }

    let mut out = String::with_capacity(OUTPUT_CHAR_LIMIT + TRUNCATION_PREFIX.len());
    out.push_str(TRUNCATION_PREFIX);
    out.extend(text.chars().skip(total - OUTPUT_CHAR_LIMIT));
    out
}
