//! File names for contact documents.

const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '#', '^', '[', ']'];

pub const FALLBACK_NAME: &str = "Unnamed Contact";

/// A file stem derived from a display name.
///
/// Characters that are unsafe in paths or wiki links are removed and runs of
/// whitespace collapse to one space.
pub fn slugify(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !FORBIDDEN.contains(c)).collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches('.').trim();
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Path of the document for `name` inside `folder`.
pub fn document_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        format!("{}.md", slugify(name))
    } else {
        format!("{folder}/{}.md", slugify(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Jane  Doe"), "Jane Doe");
        assert_eq!(slugify("A/B: C?"), "AB C");
        assert_eq!(slugify("[[Bob]]"), "Bob");
        assert_eq!(slugify("Dr. J."), "Dr. J");
        assert_eq!(slugify("???"), FALLBACK_NAME);
    }

    #[test]
    fn test_document_path() {
        assert_eq!(document_path("Contacts/", "Jane Doe"), "Contacts/Jane Doe.md");
        assert_eq!(document_path("", "Bob"), "Bob.md");
    }
}
