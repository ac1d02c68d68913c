use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::markup::{
    MarkupError, MarkupNode, escape_attribute, escape_text, is_void_tag, parse_fragment,
};

pub const BODY_TAG: &str = "body";

/// Arena handle. The generation changes whenever a slot is reused, so a
/// handle to a freed node never resolves to its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementData {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    generation: u32,
    live: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    /// Attributes dropped from every serialized element.
    pub skip_attributes: Vec<String>,
}

impl SerializeOptions {
    pub fn skipping<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skip_attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Arena-backed node tree of one realm.
///
/// A detached node keeps its id and data but reports `is_connected() ==
/// false`. Content dropped by [`Document::set_inner_markup`] is freed and its
/// slots reused. Text offsets are counted in chars.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<usize>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let body = Slot {
            data: NodeData::Element(ElementData {
                tag: BODY_TAG.to_string(),
                attrs: BTreeMap::new(),
            }),
            parent: None,
            children: Vec::new(),
            generation: 0,
            live: true,
        };
        Self {
            slots: vec![body],
            free: Vec::new(),
            body: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.live && slot.generation == id.generation)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.live && slot.generation == id.generation)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of live nodes, the body included.
    pub fn live_nodes(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.slot(id).map(|slot| &slot.data)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.node(id)? {
            NodeData::Element(el) => Some(el.tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id), Some(NodeData::Element(_)))
    }

    pub fn has_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id).is_some_and(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id), Some(NodeData::Text(_)))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.node(id)? {
            NodeData::Text(text) => Some(text.as_str()),
            NodeData::Element(_) => None,
        }
    }

    pub fn text_len(&self, id: NodeId) -> usize {
        self.text(id).map_or(0, |text| text.chars().count())
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> bool {
        match self.slot_mut(id).map(|slot| &mut slot.data) {
            Some(NodeData::Text(existing)) => {
                *existing = text.into();
                true
            }
            _ => false,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.node(id)? {
            NodeData::Element(el) => el.attrs.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        match self.slot_mut(id).map(|slot| &mut slot.data) {
            Some(NodeData::Element(el)) => el.attrs.insert(name.into(), value.into()),
            _ => None,
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        match self.slot_mut(id).map(|slot| &mut slot.data) {
            Some(NodeData::Element(el)) => el.attrs.remove(name),
            _ => None,
        }
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push_slot(NodeData::Element(ElementData {
            tag: tag.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_slot(NodeData::Text(text.into()))
    }

    fn push_slot(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.data = data;
            slot.live = true;
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            data,
            parent: None,
            children: Vec::new(),
            generation: 0,
            live: true,
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Releases a detached subtree. Returns how many nodes were freed.
    fn free_subtree(&mut self, root: NodeId) -> usize {
        if root == self.body || self.parent(root).is_some() || !self.contains(root) {
            return 0;
        }
        let mut nodes = self.descendants(root);
        nodes.push(root);
        for node in &nodes {
            let slot = &mut self.slots[node.index];
            slot.live = false;
            slot.generation = slot.generation.wrapping_add(1);
            slot.parent = None;
            slot.children.clear();
            slot.data = NodeData::Text(String::new());
            self.free.push(node.index);
        }
        nodes.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id)
            .map_or(&[][..], |slot| slot.children.as_slice())
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let ix = self.index_in_parent(id)?;
        ix.checked_sub(1)
            .and_then(|prev| self.children(parent).get(prev).copied())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let ix = self.index_in_parent(id)?;
        self.children(parent).get(ix + 1).copied()
    }

    /// Nearest preceding sibling that is an element, skipping text nodes.
    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.previous_sibling(id);
        while let Some(sibling) = current {
            if self.is_element(sibling) {
                return Some(sibling);
            }
            current = self.previous_sibling(sibling);
        }
        None
    }

    /// Nearest following sibling that is an element, skipping text nodes.
    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.next_sibling(id);
        while let Some(sibling) = current {
            if self.is_element(sibling) {
                return Some(sibling);
            }
            current = self.next_sibling(sibling);
        }
        None
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        id == self.body || self.is_ancestor_of(self.body, id)
    }

    /// `id` itself or its nearest ancestor with `tag`.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.has_tag(node, tag) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Pre-order descendants of `root`, excluding `root`.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Connected elements with `tag`, in document order.
    pub fn query_all(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|node| self.has_tag(*node, tag))
            .collect()
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let index = self.child_count(parent);
        self.insert_child(parent, index, child)
    }

    /// Moves `child` under `parent` at `index` (clamped). Refuses to create a
    /// cycle or to nest under a text node.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> bool {
        if !self.is_element(parent)
            || !self.contains(child)
            || child == parent
            || self.is_ancestor_of(child, parent)
            || child == self.body
        {
            return false;
        }
        self.detach(child);
        let children = &mut self.slots[parent.index].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.slots[child.index].parent = Some(parent);
        true
    }

    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        self.slots[parent.index].children.retain(|child| *child != id);
        self.slots[id.index].parent = None;
        true
    }

    pub fn clear_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children: Vec<NodeId> = self.children(id).to_vec();
        for child in &children {
            self.detach(*child);
        }
        children
    }

    /// Splits a text node at a char offset; the tail becomes a new following
    /// sibling (possibly empty) and is returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Option<NodeId> {
        let text = self.text(id)?.to_string();
        let byte = text
            .char_indices()
            .nth(offset)
            .map_or(text.len(), |(ix, _)| ix);
        let (head, tail) = text.split_at(byte);
        let head = head.to_string();
        let tail = self.create_text(tail);
        self.set_text(id, head);
        if let (Some(parent), Some(ix)) = (self.parent(id), self.index_in_parent(id)) {
            self.insert_child(parent, ix + 1, tail);
        }
        Some(tail)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(NodeData::Text(text)) => text.clone(),
            Some(NodeData::Element(_)) => self
                .children(id)
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
            None => String::new(),
        }
    }

    /// Builds detached nodes from parsed markup.
    pub fn build(&mut self, nodes: &[MarkupNode]) -> Vec<NodeId> {
        nodes.iter().map(|node| self.build_one(node)).collect()
    }

    fn build_one(&mut self, node: &MarkupNode) -> NodeId {
        match node {
            MarkupNode::Text(text) => self.create_text(text.clone()),
            MarkupNode::Element {
                tag,
                attrs,
                children,
            } => {
                let id = self.create_element(tag.clone());
                for (name, value) in attrs {
                    self.set_attribute(id, name.clone(), value.clone());
                }
                for child in children {
                    let child = self.build_one(child);
                    self.append_child(id, child);
                }
                id
            }
        }
    }

    /// Parses `markup` and inserts the resulting nodes under `parent` starting
    /// at `index`.
    pub fn insert_markup(
        &mut self,
        parent: NodeId,
        index: usize,
        markup: &str,
    ) -> Result<Vec<NodeId>, MarkupError> {
        let fragment = parse_fragment(markup)?;
        let nodes = self.build(&fragment);
        let mut at = index.min(self.child_count(parent));
        for node in &nodes {
            self.insert_child(parent, at, *node);
            at += 1;
        }
        Ok(nodes)
    }

    /// Replaces every child of `parent` with the parsed `markup` and frees the
    /// old children. On a parse error the existing children are left untouched.
    pub fn set_inner_markup(
        &mut self,
        parent: NodeId,
        markup: &str,
    ) -> Result<Vec<NodeId>, MarkupError> {
        let fragment = parse_fragment(markup)?;
        for old in self.clear_children(parent) {
            self.free_subtree(old);
        }
        let nodes = self.build(&fragment);
        for node in &nodes {
            self.append_child(parent, *node);
        }
        Ok(nodes)
    }

    pub fn inner_markup(&self, id: NodeId, options: &SerializeOptions) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_markup(*child, options, &mut out);
        }
        out
    }

    pub fn outer_markup(&self, id: NodeId, options: &SerializeOptions) -> String {
        let mut out = String::new();
        self.write_markup(id, options, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, options: &SerializeOptions, out: &mut String) {
        match self.node(id) {
            Some(NodeData::Text(text)) => out.push_str(&escape_text(text)),
            Some(NodeData::Element(el)) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attrs {
                    if options.skip_attributes.iter().any(|skip| skip == name) {
                        continue;
                    }
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if is_void_tag(&el.tag) {
                    return;
                }
                for child in self.children(id) {
                    self.write_markup(*child, options, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
            None => {}
        }
    }
}
