use crate::THREAD_NAME_MAX_CHARS;

/// Derives a thread's display name from its first-message preview.
/// Blank previews yield `None`; long ones are clipped with an ellipsis.
pub fn derive_thread_name(preview: &str) -> Option<String> {
    let trimmed = preview.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > THREAD_NAME_MAX_CHARS {
        let clipped: String = trimmed.chars().take(THREAD_NAME_MAX_CHARS).collect();
        return Some(format!("{clipped}…"));
    }
    Some(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_previews_produce_no_name() {
        assert_eq!(derive_thread_name(""), None);
        assert_eq!(derive_thread_name("   \n\t"), None);
    }

    #[test]
    fn short_previews_pass_through_trimmed() {
        assert_eq!(
            derive_thread_name("  Fix the login bug  "),
            Some("Fix the login bug".to_owned())
        );
    }

    #[test]
    fn previews_at_the_limit_keep_their_full_text() {
        let preview = "a".repeat(THREAD_NAME_MAX_CHARS);
        assert_eq!(derive_thread_name(&preview), Some(preview.clone()));

        let one_over = "a".repeat(THREAD_NAME_MAX_CHARS + 1);
        let derived = derive_thread_name(&one_over).expect("name for long preview");
        assert_eq!(derived.chars().count(), THREAD_NAME_MAX_CHARS + 1);
        assert!(derived.ends_with('…'));
    }

    #[test]
    fn long_previews_clip_whole_characters() {
        let derived = derive_thread_name("Fix the login bug across all auth providers now")
            .expect("name for long preview");
        assert_eq!(derived, "Fix the login bug across all auth prov…");
    }

    #[test]
    fn clipping_counts_characters_not_bytes() {
        let preview = "é".repeat(THREAD_NAME_MAX_CHARS + 5);
        let derived = derive_thread_name(&preview).expect("name for long preview");
        assert_eq!(derived.chars().count(), THREAD_NAME_MAX_CHARS + 1);
    }
}
