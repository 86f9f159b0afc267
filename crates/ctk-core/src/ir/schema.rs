use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Index of a node inside its [`SchemaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// The canonical shape of a schema node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaKind {
    Object {
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        properties: IndexMap<String, NodeId>,
        #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
        required: IndexSet<String>,
    },
    Array {
        items: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<u64>,
    },
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
        enum_values: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<u64>,
    },
    Number {
        integer: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Boolean,
    OneOf {
        variants: Vec<NodeId>,
    },
    Unknown,
}

impl SchemaKind {
    pub fn string() -> Self {
        SchemaKind::String {
            format: None,
            pattern: None,
            enum_values: Vec::new(),
            min_length: None,
            max_length: None,
        }
    }

    pub fn number(integer: bool) -> Self {
        SchemaKind::Number {
            integer,
            minimum: None,
            maximum: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::Object { .. } => "object",
            SchemaKind::Array { .. } => "array",
            SchemaKind::String { .. } => "string",
            SchemaKind::Number { integer: true, .. } => "integer",
            SchemaKind::Number { integer: false, .. } => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::OneOf { .. } => "one_of",
            SchemaKind::Unknown => "unknown",
        }
    }

    /// Child links, in declaration order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            SchemaKind::Object { properties, .. } => properties.values().copied().collect(),
            SchemaKind::Array { items, .. } => vec![*items],
            SchemaKind::OneOf { variants } => variants.clone(),
            _ => Vec::new(),
        }
    }
}

/// A canonical schema node: the tagged shape plus node-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    #[serde(flatten)]
    pub kind: SchemaKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

impl SchemaNode {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            example: None,
            description: None,
            nullable: false,
        }
    }

    pub fn unknown() -> Self {
        Self::new(SchemaKind::Unknown)
    }

    pub fn with_example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }
}

/// An owned schema: an arena of nodes reachable from `root`.
///
/// Nodes are stored in depth-first pre-order. A recursive schema is an edge
/// back to an ancestor's [`NodeId`]; nothing is shared between trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTree {
    pub root: NodeId,
    pub nodes: Vec<SchemaNode>,
}

impl SchemaTree {
    /// A tree holding exactly one node.
    pub fn single(node: SchemaNode) -> Self {
        Self {
            root: NodeId(0),
            nodes: vec![node],
        }
    }

    pub fn unknown() -> Self {
        Self::single(SchemaNode::unknown())
    }

    pub fn node(&self, id: NodeId) -> Option<&SchemaNode> {
        self.nodes.get(id.0)
    }

    pub fn root_node(&self) -> Option<&SchemaNode> {
        self.node(self.root)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when some node can reach itself again, i.e. the schema recurses.
    pub fn is_recursive(&self) -> bool {
        let mut on_path = vec![false; self.nodes.len()];
        let mut done = vec![false; self.nodes.len()];
        self.has_back_edge(self.root, &mut on_path, &mut done)
    }

    fn has_back_edge(&self, id: NodeId, on_path: &mut [bool], done: &mut [bool]) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if on_path[id.0] {
            return true;
        }
        if done[id.0] {
            return false;
        }
        on_path[id.0] = true;
        let found = node
            .kind
            .children()
            .into_iter()
            .any(|child| self.has_back_edge(child, on_path, done));
        on_path[id.0] = false;
        done[id.0] = true;
        found
    }

    /// Every child link points inside the arena.
    pub fn is_well_formed(&self) -> bool {
        self.node(self.root).is_some()
            && self
                .nodes
                .iter()
                .flat_map(|n| n.kind.children())
                .all(|child| child.0 < self.nodes.len())
    }
}

/// Incremental arena builder. Slots may be reserved before their contents
/// are known so that descendants can link back to them.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<SchemaNode>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot, initially `Unknown`.
    pub fn reserve(&mut self) -> NodeId {
        self.nodes.push(SchemaNode::unknown());
        NodeId(self.nodes.len() - 1)
    }

    pub fn push(&mut self, node: SchemaNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn set(&mut self, id: NodeId, node: SchemaNode) {
        self.nodes[id.0] = node;
    }

    pub fn get(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn finish(self, root: NodeId) -> SchemaTree {
        SchemaTree {
            root,
            nodes: self.nodes,
        }
    }
}
