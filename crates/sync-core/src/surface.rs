use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info};
use thiserror::Error;

use crate::activator::FrameSlot;
use crate::adjacency::{Position, SelectionRange};
use crate::bus::EventBus;
use crate::dom::{Document, NodeId, SerializeOptions};
use crate::event_loop::EventLoop;
use crate::markup::MarkupError;
use crate::port::FramePort;
use crate::realm::RealmHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Initialized,
    /// The whole body was replaced; `content` is the serialized result.
    ContentSet { content: String },
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("rich-text surface is not initialized")]
    NotInitialized,
    #[error("markup produced no nodes")]
    NothingInserted,
    #[error(transparent)]
    Markup(#[from] MarkupError),
}

/// The slice of a rich-text editor the synchronizer talks to. The editor
/// owns the embedded frame; everything else goes through these commands.
pub trait RichTextSurface {
    /// Creates the embedded frame (idempotent) and returns its realm.
    fn initialize(&mut self) -> RealmHandle;
    fn frame(&self) -> Option<RealmHandle>;
    fn frame_slot(&self) -> FrameSlot;
    fn set_content(&mut self, markup: &str) -> Result<(), SurfaceError>;
    fn content(&self) -> String;
    /// Inserts markup at the cursor. Instances are not materialized here.
    fn insert_content(&mut self, markup: &str) -> Result<Vec<NodeId>, SurfaceError>;
    fn selection(&self) -> Option<SelectionRange>;
    fn set_selection(&mut self, range: SelectionRange);
    /// The node a selection covers exactly, or the element holding the cursor.
    fn selected_node(&self) -> Option<NodeId>;
    fn selection_contains_tag(&self, tag: &str) -> bool;
    fn remove_node(&mut self, node: NodeId) -> bool;
    fn events(&self) -> EventBus<SurfaceEvent>;
}

/// In-memory editor over the frame realm's document.
pub struct DocumentSurface {
    scheduler: EventLoop,
    serialize: SerializeOptions,
    frame: FrameSlot,
    selection: Option<SelectionRange>,
    events: EventBus<SurfaceEvent>,
}

impl DocumentSurface {
    pub fn new(scheduler: EventLoop, serialize: SerializeOptions) -> Self {
        Self {
            scheduler,
            serialize,
            frame: Rc::new(RefCell::new(None)),
            selection: None,
            events: EventBus::new(),
        }
    }

    fn require_frame(&self) -> Result<RealmHandle, SurfaceError> {
        self.frame.borrow().clone().ok_or(SurfaceError::NotInitialized)
    }

    fn end_of_body(doc: &Document) -> Position {
        Position::new(doc.body(), doc.child_count(doc.body()))
    }

    /// Parent element and child index where content lands for `position`.
    fn insertion_point(doc: &mut Document, position: Position) -> (NodeId, usize) {
        if !doc.is_connected(position.container) {
            let end = Self::end_of_body(doc);
            return (end.container, end.offset);
        }
        if doc.is_element(position.container) {
            return (position.container, position.offset);
        }

        let text = position.container;
        let (Some(parent), Some(index)) = (doc.parent(text), doc.index_in_parent(text)) else {
            let end = Self::end_of_body(doc);
            return (end.container, end.offset);
        };
        if position.offset == 0 {
            (parent, index)
        } else if position.offset >= doc.text_len(text) {
            (parent, index + 1)
        } else {
            doc.split_text(text, position.offset);
            (parent, index + 1)
        }
    }

    /// Pre-order boundary index of a position. Nodes whose index falls in
    /// `[start, end)` lie inside the range.
    fn boundary_index(doc: &Document, order: &[NodeId], position: Position) -> usize {
        let index_of = |node: NodeId| order.iter().position(|n| *n == node);
        let container = position.container;
        if doc.is_element(container) {
            if let Some(child) = doc.children(container).get(position.offset) {
                return index_of(*child).unwrap_or(order.len());
            }
            let first_after = index_of(container).map_or(0, |ix| ix + 1)
                + doc.descendants(container).len();
            return first_after;
        }
        index_of(container).map_or(order.len(), |ix| ix + 1)
    }
}

impl RichTextSurface for DocumentSurface {
    fn initialize(&mut self) -> RealmHandle {
        if let Some(frame) = self.frame.borrow().clone() {
            return frame;
        }
        let frame = RealmHandle::frame(FramePort::new(), self.scheduler.clone());
        frame.set_ready(true);
        *self.frame.borrow_mut() = Some(frame.clone());
        info!("event=surface_init module=surface status=ok");
        self.events.emit(&SurfaceEvent::Initialized);
        frame
    }

    fn frame(&self) -> Option<RealmHandle> {
        self.frame.borrow().clone()
    }

    fn frame_slot(&self) -> FrameSlot {
        self.frame.clone()
    }

    fn set_content(&mut self, markup: &str) -> Result<(), SurfaceError> {
        let frame = self.require_frame()?;
        frame.replace_content(markup)?;
        self.selection = Some(SelectionRange::collapsed(Self::end_of_body(
            frame.borrow().document(),
        )));
        let content = self.content();
        debug!(
            "event=set_content module=surface bytes={}",
            content.len()
        );
        self.events.emit(&SurfaceEvent::ContentSet { content });
        Ok(())
    }

    fn content(&self) -> String {
        match self.frame() {
            Some(frame) => {
                let realm = frame.borrow();
                let doc = realm.document();
                doc.inner_markup(doc.body(), &self.serialize)
            }
            None => String::new(),
        }
    }

    fn insert_content(&mut self, markup: &str) -> Result<Vec<NodeId>, SurfaceError> {
        let frame = self.require_frame()?;
        let mut realm = frame.borrow_mut();
        let doc = realm.document_mut();

        let position = self
            .selection
            .map(|range| range.start)
            .unwrap_or_else(|| Self::end_of_body(doc));
        let (parent, index) = Self::insertion_point(doc, position);
        let nodes = doc.insert_markup(parent, index, markup)?;
        self.selection = Some(SelectionRange::collapsed(Position::new(
            parent,
            index + nodes.len(),
        )));
        debug!(
            "event=insert_content module=surface nodes={} index={index}",
            nodes.len()
        );
        Ok(nodes)
    }

    fn selection(&self) -> Option<SelectionRange> {
        self.selection
    }

    fn set_selection(&mut self, range: SelectionRange) {
        self.selection = Some(range);
    }

    fn selected_node(&self) -> Option<NodeId> {
        let range = self.selection?;
        let frame = self.frame()?;
        let realm = frame.borrow();
        let doc = realm.document();

        let (start, end) = (range.start, range.end);
        if start.container == end.container
            && doc.is_element(start.container)
            && end.offset == start.offset + 1
        {
            return doc.children(start.container).get(start.offset).copied();
        }
        if doc.is_text(start.container) {
            doc.parent(start.container)
        } else {
            Some(start.container)
        }
    }

    fn selection_contains_tag(&self, tag: &str) -> bool {
        let Some(range) = self.selection.filter(|range| !range.is_collapsed()) else {
            return false;
        };
        let Some(frame) = self.frame() else {
            return false;
        };
        let realm = frame.borrow();
        let doc = realm.document();
        let order = doc.descendants(doc.body());
        let start = Self::boundary_index(doc, &order, range.start);
        let end = Self::boundary_index(doc, &order, range.end);
        order
            .iter()
            .enumerate()
            .any(|(ix, node)| ix >= start && ix < end && doc.has_tag(*node, tag))
    }

    fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(frame) = self.frame() else {
            return false;
        };
        let (parent, index) = {
            let realm = frame.borrow();
            let doc = realm.document();
            match (doc.parent(node), doc.index_in_parent(node)) {
                (Some(parent), Some(index)) => (parent, index),
                _ => return false,
            }
        };
        if !frame.remove_node(node) {
            return false;
        }

        if let Some(range) = self.selection {
            let realm = frame.borrow();
            let doc = realm.document();
            let fix = |position: Position| {
                if !doc.is_connected(position.container) {
                    Position::new(parent, index)
                } else if position.container == parent && position.offset > index {
                    Position::new(parent, position.offset - 1)
                } else {
                    position
                }
            };
            self.selection = Some(SelectionRange::new(fix(range.start), fix(range.end)));
        }
        debug!("event=remove_node module=surface node={}", node.index());
        true
    }

    fn events(&self) -> EventBus<SurfaceEvent> {
        self.events.clone()
    }
}
