pub const MAX_PROMPT_CHARS: usize = 5000;

pub struct PromptSanitizer;

impl PromptSanitizer {
    /// Replaces line breaks with spaces, drops a single trailing `/` and keeps
    /// the first [`MAX_PROMPT_CHARS`] characters. Nothing else is touched.
    pub fn sanitize(prompt: &str) -> String {
        let flattened: String = prompt
            .chars()
            .map(|c| if is_line_break(c) { ' ' } else { c })
            .collect();

        let trimmed = flattened.strip_suffix('/').unwrap_or(&flattened);

        trimmed.chars().take(MAX_PROMPT_CHARS).collect()
    }
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}
