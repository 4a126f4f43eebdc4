/// If the line ends in a comment, remove it. If the
/// result contains any non-whitespace characters,
/// return it trimmed as Some. Otherwise, return None.
/// (Covers empty lines and comment-only lines).
pub fn get_non_comment(line: &str) -> Option<&str> {
    let without_comment = &line[0..line.find('#').unwrap_or(line.len())];
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
