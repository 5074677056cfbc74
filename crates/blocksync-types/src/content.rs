//! Block content payload.
//!
//! The engine treats content as opaque and only ever compares it for
//! structural equality, which the derived `PartialEq` provides. The variants
//! exist so callers can build and inspect common payloads without going
//! through raw JSON; anything else rides in [`Content::Opaque`].

use serde::{Deserialize, Serialize};

use crate::props::Props;

/// Content of one block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Content {
    #[default]
    Empty,
    /// Rich inline text.
    Inline(Vec<InlineNode>),
    Table(TableContent),
    /// Any other payload, kept verbatim.
    Opaque(serde_json::Value),
}

impl Content {
    /// Single unstyled text run. Empty text yields `Content::Empty`.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Content::Empty;
        }
        Content::Inline(vec![InlineNode::Text {
            text,
            styles: Props::new(),
        }])
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    /// Concatenated text of inline runs, ignoring styles and links targets.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        match self {
            Content::Empty | Content::Opaque(_) => {}
            Content::Inline(nodes) => push_inline_text(nodes, &mut out),
            Content::Table(table) => {
                for (i, row) in table.rows.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    for (j, cell) in row.cells.iter().enumerate() {
                        if j > 0 {
                            out.push('\t');
                        }
                        push_inline_text(cell, &mut out);
                    }
                }
            }
        }
        out
    }
}

fn push_inline_text(nodes: &[InlineNode], out: &mut String) {
    for node in nodes {
        match node {
            InlineNode::Text { text, .. } => out.push_str(text),
            InlineNode::Link { content, .. } => push_inline_text(content, out),
            InlineNode::Custom { .. } => {}
        }
    }
}

/// One inline run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InlineNode {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Props::is_empty")]
        styles: Props,
    },
    Link {
        href: String,
        #[serde(default)]
        content: Vec<InlineNode>,
    },
    /// Mentions, inline images and other editor-specific runs.
    Custom {
        kind: String,
        #[serde(default, skip_serializing_if = "Props::is_empty")]
        props: Props,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableContent {
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// One inline sequence per cell.
    #[serde(default)]
    pub cells: Vec<Vec<InlineNode>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::PropValue;

    #[test]
    fn test_structural_equality_sees_styles() {
        let plain = Content::text("hello");
        let mut styles = Props::new();
        styles.insert("bold".into(), PropValue::Bool(true));
        let bold = Content::Inline(vec![InlineNode::Text {
            text: "hello".into(),
            styles,
        }]);
        assert_ne!(plain, bold);
        assert_eq!(plain.plain_text(), bold.plain_text());
        assert_eq!(plain, Content::text("hello"));
    }

    #[test]
    fn test_empty_text_is_empty_content() {
        assert!(Content::text("").is_empty());
        assert_eq!(Content::default(), Content::Empty);
    }

    #[test]
    fn test_table_plain_text() {
        let cell = |s: &str| vec![InlineNode::Text { text: s.into(), styles: Props::new() }];
        let table = Content::Table(TableContent {
            rows: vec![
                TableRow { cells: vec![cell("a"), cell("b")] },
                TableRow { cells: vec![cell("c"), cell("d")] },
            ],
        });
        assert_eq!(table.plain_text(), "a\tb\nc\td");
    }

    #[test]
    fn test_opaque_content_round_trips() {
        let json = r#"{"kind":"opaque","value":{"src":"cat.png","width":320}}"#;
        let content: Content = serde_json::from_str(json).unwrap();
        assert!(matches!(content, Content::Opaque(_)));
        let back = serde_json::to_string(&content).unwrap();
        let again: Content = serde_json::from_str(&back).unwrap();
        assert_eq!(content, again);
    }

    #[test]
    fn test_link_text_is_included() {
        let content = Content::Inline(vec![
            InlineNode::Text { text: "see ".into(), styles: Props::new() },
            InlineNode::Link {
                href: "https://example.com".into(),
                content: vec![InlineNode::Text { text: "here".into(), styles: Props::new() }],
            },
        ]);
        assert_eq!(content.plain_text(), "see here");
    }
}
