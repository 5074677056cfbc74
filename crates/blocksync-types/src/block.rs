//! Block model: editor tree nodes, persisted flat records and patches.
//!
//! ## Two shapes, one document
//!
//! The editor owns a nested tree of [`Node`]s. Storage owns a flat list of
//! [`FlatBlock`]s where nesting is expressed by `parent_id` and sibling order
//! by `rank`. Every block's `children` list is its own rank scope, so
//! containers (`columnList` → `column`, `table`) need no special casing.
//!
//! ## Patches
//!
//! A [`BlockPatch`] carries only the fields that changed. `parent_id` and
//! `rank` are bundled as [`Position`]: a rank is only meaningful among the
//! siblings of one parent, so the two always travel together.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::EnumString;

use crate::content::Content;
use crate::ids::BlockId;
use crate::props::Props;

/// Maximum nesting depth walked by the flattener and builder.
///
/// Deeper subtrees are truncated with a warning rather than overflowing the
/// stack on a corrupted document.
pub const MAX_TREE_DEPTH: usize = 512;

// ============================================================================
// BlockKind
// ============================================================================

/// Block type tag.
///
/// Open enumeration: the engine never interprets it beyond literal equality.
/// Unknown tags round-trip through [`BlockKind::Custom`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum BlockKind {
    #[default]
    Paragraph,
    Heading,
    BulletListItem,
    NumberedListItem,
    CheckListItem,
    CodeBlock,
    Quote,
    Table,
    Image,
    /// Horizontal container of `Column` blocks.
    ColumnList,
    Column,
    /// Any tag this crate does not name.
    #[strum(default)]
    Custom(String),
}

impl BlockKind {
    /// Parse a type tag. Never fails: unknown tags become `Custom`.
    pub fn from_name(s: &str) -> Self {
        <Self as FromStr>::from_str(s).unwrap_or_else(|_| BlockKind::Custom(s.to_string()))
    }

    /// The wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading => "heading",
            BlockKind::BulletListItem => "bulletListItem",
            BlockKind::NumberedListItem => "numberedListItem",
            BlockKind::CheckListItem => "checkListItem",
            BlockKind::CodeBlock => "codeBlock",
            BlockKind::Quote => "quote",
            BlockKind::Table => "table",
            BlockKind::Image => "image",
            BlockKind::ColumnList => "columnList",
            BlockKind::Column => "column",
            BlockKind::Custom(s) => s,
        }
    }

    /// Kinds whose children are laid out as a nested container rather than
    /// as indented list content. Informational only; the engine scopes every
    /// children list the same way.
    pub fn is_layout_container(&self) -> bool {
        matches!(self, BlockKind::ColumnList | BlockKind::Column | BlockKind::Table)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BlockKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_name(&s))
    }
}

// ============================================================================
// Node (editor tree)
// ============================================================================

/// One node of the editor's document tree.
///
/// A document is the ordered list of its root nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable id. Nodes without one are skipped by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BlockId>,
    #[serde(rename = "type", default)]
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Props::is_empty")]
    pub props: Props,
    #[serde(default, skip_serializing_if = "Content::is_empty")]
    pub content: Content,
    /// Rank hint, typically the stored rank this node was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(id: impl Into<BlockId>, kind: BlockKind) -> Self {
        Self {
            id: Some(id.into()),
            kind,
            props: Props::new(),
            content: Content::Empty,
            rank: None,
            children: Vec::new(),
        }
    }

    /// A paragraph holding plain text.
    pub fn paragraph(id: impl Into<BlockId>, text: impl Into<String>) -> Self {
        Self::new(id, BlockKind::Paragraph).with_content(Content::text(text))
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = Some(rank.into());
        self
    }

    /// Number of nodes in this subtree, including self.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }
}

// ============================================================================
// FlatBlock (persisted record)
// ============================================================================

/// One persisted block record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatBlock {
    pub id: BlockId,
    /// `None` for root-level blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<BlockId>,
    #[serde(rename = "type", default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub content: Content,
    /// Sibling ordering key, unique among blocks sharing `parent_id`.
    pub rank: String,
}

impl FlatBlock {
    /// Record for `node` placed at `(parent_id, rank)`.
    ///
    /// Returns `None` if the node has no id.
    pub fn from_node(node: &Node, parent_id: Option<BlockId>, rank: String) -> Option<Self> {
        let id = node.id.clone()?;
        Some(Self {
            id,
            parent_id,
            kind: node.kind.clone(),
            props: node.props.clone(),
            content: node.content.clone(),
            rank,
        })
    }

    /// Tree node for this record, without children.
    pub fn to_node(&self) -> Node {
        Node {
            id: Some(self.id.clone()),
            kind: self.kind.clone(),
            props: self.props.clone(),
            content: self.content.clone(),
            rank: Some(self.rank.clone()),
            children: Vec::new(),
        }
    }

    pub fn position(&self) -> Position {
        Position {
            parent_id: self.parent_id.clone(),
            rank: self.rank.clone(),
        }
    }
}

// ============================================================================
// Patches
// ============================================================================

/// Structural placement of a block: parent plus rank within that parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(default)]
    pub parent_id: Option<BlockId>,
    pub rank: String,
}

/// Partial update for one block. `None` fields are left untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    pub id: BlockId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BlockKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

impl BlockPatch {
    /// Empty patch for `id`.
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            position: None,
            kind: None,
            props: None,
            content: None,
        }
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.kind.is_none() && self.props.is_none() && self.content.is_none()
    }

    /// True if the patch moves the block (parent or rank).
    pub fn touches_structure(&self) -> bool {
        self.position.is_some()
    }

    /// Wire names of the fields this patch sets, for logs and tests.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.position.is_some() {
            fields.push("parentId");
            fields.push("rank");
        }
        if self.kind.is_some() {
            fields.push("type");
        }
        if self.props.is_some() {
            fields.push("props");
        }
        if self.content.is_some() {
            fields.push("content");
        }
        fields
    }

    /// Apply to a stored record. Ids must match; a mismatched patch is ignored.
    ///
    /// Returns whether the record was touched.
    pub fn apply_to(&self, block: &mut FlatBlock) -> bool {
        if block.id != self.id {
            return false;
        }
        if let Some(position) = &self.position {
            block.parent_id = position.parent_id.clone();
            block.rank = position.rank.clone();
        }
        if let Some(kind) = &self.kind {
            block.kind = kind.clone();
        }
        if let Some(props) = &self.props {
            block.props = props.clone();
        }
        if let Some(content) = &self.content {
            block.content = content.clone();
        }
        true
    }
}
