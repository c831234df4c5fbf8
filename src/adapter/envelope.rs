//! Outbound message formatting shared by every adapter.
//!
//! Mirrored messages look the same on every destination platform:
//! `<adapter>/<channel>/<author>: <text>`.

/// Render the envelope for a mirrored message.
///
/// The `: text` suffix is left out entirely when there is no text.
pub fn format_envelope(adapter_id: &str, channel_name: &str, author: &str, text: Option<&str>) -> String {
    match text {
        Some(text) => format!("{}/{}/{}: {}", adapter_id, channel_name, author, text),
        None => format!("{}/{}/{}", adapter_id, channel_name, author),
    }
}

/// Describe a sticker as text.
pub fn describe_sticker(name: &str) -> String {
    format!("[sticker: {}]", name)
}

/// Join message body parts with single spaces, skipping empty ones.
///
/// Returns `None` when nothing is left, so the envelope has no text suffix.
pub fn join_body<I, S>(parts: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .filter(|part| !part.as_ref().trim().is_empty())
        .map(|part| part.as_ref().trim().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    (!joined.is_empty()).then_some(joined)
}
