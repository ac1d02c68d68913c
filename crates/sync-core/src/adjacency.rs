use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::widget::WidgetContract;

/// A boundary point in standard text-range terms: a char offset when
/// `container` is a text node, a child index when it is an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub container: NodeId,
    pub offset: usize,
}

impl Position {
    pub fn new(container: NodeId, offset: usize) -> Self {
        Self { container, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: Position,
    pub end: Position,
}

impl SelectionRange {
    pub fn collapsed(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Before,
    After,
}

/// The widget `node` sits in or on, if any.
pub fn widget_at(doc: &Document, node: NodeId, tag: &str) -> Option<NodeId> {
    doc.closest(node, tag)
}

/// The widget immediately before or after a cursor that is not inside one.
///
/// In a text run, `Before` only applies at offset 0 and looks at the nearest
/// preceding element sibling; `After` only applies at the end of the run and
/// looks at the nearest following element sibling. In an element, the child
/// on the relevant side of the offset is checked.
pub fn find_adjacent_widget(
    doc: &Document,
    position: Position,
    direction: Direction,
    tag: &str,
) -> Option<NodeId> {
    let Position { container, offset } = position;
    let candidate = if doc.is_text(container) {
        match direction {
            Direction::Before if offset == 0 => doc.previous_element_sibling(container),
            Direction::After if offset == doc.text_len(container) => {
                doc.next_element_sibling(container)
            }
            _ => None,
        }
    } else if doc.is_element(container) {
        let children = doc.children(container);
        match direction {
            Direction::Before => offset
                .checked_sub(1)
                .and_then(|ix| children.get(ix).copied()),
            Direction::After => children.get(offset).copied(),
        }
    } else {
        None
    };
    candidate.filter(|node| doc.has_tag(*node, tag))
}

/// A widget containing the cursor wins; otherwise the adjacent one.
pub fn resolve_target(
    doc: &Document,
    position: Position,
    direction: Direction,
    tag: &str,
) -> Option<NodeId> {
    widget_at(doc, position.container, tag)
        .or_else(|| find_adjacent_widget(doc, position, direction, tag))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    /// Would be removed by Backspace.
    pub backspace: Option<NodeId>,
    /// Would be removed by Delete.
    pub delete: Option<NodeId>,
}

impl Highlight {
    pub fn is_empty(&self) -> bool {
        self.backspace.is_none() && self.delete.is_none()
    }
}

pub fn deletable_candidates(doc: &Document, position: Position, tag: &str) -> Highlight {
    Highlight {
        backspace: find_adjacent_widget(doc, position, Direction::Before, tag),
        delete: find_adjacent_widget(doc, position, Direction::After, tag),
    }
}

/// Clears stale highlight attributes on every widget, then marks the current
/// candidates.
pub fn apply_highlight(doc: &mut Document, contract: &WidgetContract, highlight: &Highlight) {
    for node in doc.query_all(&contract.tag) {
        doc.remove_attribute(node, &contract.deletable_attribute);
        doc.remove_attribute(node, &contract.tooltip_attribute);
    }
    if let Some(node) = highlight.backspace {
        doc.set_attribute(node, contract.deletable_attribute.clone(), "backspace");
        doc.set_attribute(
            node,
            contract.tooltip_attribute.clone(),
            contract.labels.backspace_hint.clone(),
        );
    }
    if let Some(node) = highlight.delete {
        doc.set_attribute(node, contract.deletable_attribute.clone(), "delete");
        doc.set_attribute(
            node,
            contract.tooltip_attribute.clone(),
            contract.labels.delete_hint.clone(),
        );
    }
}
