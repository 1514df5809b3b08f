//! The human-editable "Related" section.
//!
//! ```markdown
//! ## Related
//! - mother [[Jane Doe]]
//! - friend [[Bob|Bobby]]
//! ```
//!
//! The section runs from its heading to the next heading of the same or a
//! higher level. Headings inside fenced code blocks do not count. Only
//! bullet lines of the form `- <kind> [[<name>]]` are relationships; any
//! other line in the section is ignored when decoding and dropped when the
//! section is rewritten. A multi-word kind is read as one word joined by
//! `-`, which is also how it is written back.

use kinship_core::{ContactId, Reference, Relationship, SyncOperation};
use kinship_graph::ContactGraph;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::diff::{diff_relations, DecodedRelation};

const SECTION_TITLE: &str = "related";

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-*+]\s+(\S.*?)\s+\[\[([^\]]+)\]\]\s*$").expect("valid relationship line pattern")
});

/// Byte offsets of a located Related section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub heading_start: usize,
    /// End of the heading line, including its newline.
    pub heading_end: usize,
    /// Start of the next same-or-higher heading, or the end of the text.
    pub content_end: usize,
    pub level: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MarkdownCodec {
    /// Heading level used when a section has to be created.
    pub heading_level: usize,
}

impl Default for MarkdownCodec {
    fn default() -> Self {
        Self { heading_level: 2 }
    }
}

impl MarkdownCodec {
    pub fn new(heading_level: usize) -> Self {
        Self {
            heading_level: heading_level.clamp(1, 6),
        }
    }

    /// Locate the first Related section.
    pub fn find_section(text: &str) -> Option<Section> {
        let mut in_fence = false;
        let mut offset = 0;
        let mut open: Option<(usize, usize, usize)> = None;

        for line in text.split_inclusive('\n') {
            let start = offset;
            offset += line.len();
            if is_fence(line) {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            let Some((level, title)) = parse_heading(line) else {
                continue;
            };
            match open {
                Some((heading_start, heading_end, open_level)) if level <= open_level => {
                    return Some(Section {
                        heading_start,
                        heading_end,
                        content_end: start,
                        level: open_level,
                    });
                }
                Some(_) => {}
                None if title.eq_ignore_ascii_case(SECTION_TITLE) => {
                    open = Some((start, offset, level));
                }
                None => {}
            }
        }

        open.map(|(heading_start, heading_end, level)| Section {
            heading_start,
            heading_end,
            content_end: text.len(),
            level,
        })
    }

    /// Relationships listed in the section, or `None` when there is no section.
    pub fn decode(text: &str) -> Option<Vec<DecodedRelation>> {
        let section = Self::find_section(text)?;
        let mut in_fence = false;
        let mut decoded = Vec::new();
        for line in text[section.heading_end..section.content_end].lines() {
            if is_fence(line) {
                in_fence = !in_fence;
                continue;
            }
            if in_fence || line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(rel) => decoded.push(rel),
                None => tracing::debug!(line, "Ignoring non-relationship line in Related section"),
            }
        }
        Some(decoded)
    }

    /// Section content for `relationships`, one bullet per edge.
    pub fn encode(relationships: &[Relationship]) -> String {
        let mut lines: Vec<(&str, &str)> = relationships
            .iter()
            .map(|r| (r.display_kind.as_str(), r.target_name.as_str()))
            .collect();
        lines.sort();
        lines.dedup();
        lines
            .into_iter()
            .map(|(kind, name)| format!("- {kind} [[{name}]]\n"))
            .collect()
    }

    /// Replace the section's content, appending a new section when absent.
    ///
    /// An absent section is only created for non-empty content or when
    /// `force` is set. Text outside the section is preserved byte for byte.
    pub fn replace_section(&self, text: &str, content: &str, force: bool) -> String {
        match Self::find_section(text) {
            Some(section) => {
                let mut out = String::with_capacity(text.len() + content.len());
                out.push_str(&text[..section.heading_start]);
                push_heading(&mut out, section.level);
                out.push_str(content);
                if section.content_end < text.len() {
                    out.push('\n');
                }
                out.push_str(&text[section.content_end..]);
                out
            }
            None if content.is_empty() && !force => text.to_string(),
            None => {
                let mut out = text.to_string();
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                if !out.trim().is_empty() && !out.ends_with("\n\n") {
                    out.push('\n');
                }
                push_heading(&mut out, self.heading_level);
                out.push_str(content);
                out
            }
        }
    }

    /// Render `relationships` into `text`.
    pub fn render_into(&self, text: &str, relationships: &[Relationship], force: bool) -> String {
        self.replace_section(text, &Self::encode(relationships), force)
    }

    /// Operations that bring the graph in line with the section for
    /// `source_id`. `None` when the text has no Related section.
    pub fn diff(
        source_id: &ContactId,
        text: &str,
        current: &[Relationship],
        graph: &ContactGraph,
    ) -> Option<Vec<SyncOperation>> {
        let mut decoded = Self::decode(text)?;
        for rel in &mut decoded {
            strip_heading_anchor(rel, graph);
        }
        Some(diff_relations(source_id, &decoded, current, graph))
    }
}

/// `[[Note#Heading]]` links to `Note`, unless a contact's name contains the `#`.
fn strip_heading_anchor(rel: &mut DecodedRelation, graph: &ContactGraph) {
    if !rel.target.is_name() || graph.resolve_name(&rel.target.value).is_some() {
        return;
    }
    if let Some((name, _)) = rel.target.value.split_once('#') {
        let name = name.trim();
        if !name.is_empty() {
            rel.target = Reference::name(name);
        }
    }
}

fn push_heading(out: &mut String, level: usize) {
    out.push_str(&"#".repeat(level));
    out.push_str(" Related\n");
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// `(level, title)` of an ATX heading line.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let level = line.bytes().take_while(|b| *b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
        return None;
    }
    let title = rest.trim();
    let title = match title.trim_end_matches('#') {
        stripped if stripped.len() < title.len() && (stripped.is_empty() || stripped.ends_with([' ', '\t'])) => {
            stripped.trim_end()
        }
        _ => title,
    };
    Some((level, title))
}

fn parse_line(line: &str) -> Option<DecodedRelation> {
    let caps = LINE_RE.captures(line)?;
    let kind = caps.get(1)?.as_str().to_lowercase();
    let link = caps.get(2)?.as_str();
    let name = link.split('|').next().unwrap_or(link).trim();
    if name.is_empty() {
        return None;
    }
    Some(DecodedRelation {
        kind,
        target: Reference::name(name),
    })
}
