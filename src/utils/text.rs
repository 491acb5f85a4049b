/// Removes a surrounding markdown code fence (```json or ```), if any.
pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json").trim_end_matches("```").trim().to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

/// Last `n` characters of `s`, on a char boundary.
pub fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// File-name friendly form of a character name.
pub fn slug(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Short single-line preview for logs.
pub fn preview(s: &str, n: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= n {
        flat
    } else {
        format!("{}...", flat.chars().take(n).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("json"), "json");
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  ```json  \n  {}  \n  ```  "), "{}");
    }

    #[test]
    fn test_tail_chars_respects_char_boundaries() {
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("coração", 3), "ção");
        assert_eq!(tail_chars("", 3), "");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Maria  da Silva"), "Maria_da_Silva");
        assert_eq!(slug("Ana"), "Ana");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("a\nb", 10), "a b");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
