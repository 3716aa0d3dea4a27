/// Mattermost renders text between single backticks in a fixed-width font.
pub fn wrap_code(text: &str) -> String {
    format!("`{text}`")
}

pub fn mention_prefix(bot_name: &str) -> String {
    format!("@{bot_name} ")
}

/// Returns the command text when `message` starts with the exact mention
/// prefix, case-sensitive and including the trailing space.
pub fn strip_mention<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    message.strip_prefix(prefix)
}
