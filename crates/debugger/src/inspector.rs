//! Stack and variable inspection for the current stop.
//!
//! Handles are opaque integers pointing into the stack tree of the latest
//! break event (or into an evaluation result received during that stop).
//! They are minted lazily as the host expands nodes, never reused, and all
//! of them stop resolving as soon as the next stop is recorded.

use std::collections::HashMap;

use dap::types::{StackFrameId, VariablesReference};
use wire::{FrameNode, StackNode};

/// Zero means "no children" on the host side.
pub const NO_HANDLE: VariablesReference = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Frame(usize),
    Evaluation(usize),
}

/// A node addressed by its root and the child indices leading to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodePath {
    root: Root,
    path: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableView {
    pub name: String,
    pub value: String,
    pub type_name: Option<String>,
    pub handle: VariablesReference,
}

impl VariableView {
    fn placeholder() -> Self {
        Self {
            name: String::new(),
            value: String::new(),
            type_name: None,
            handle: NO_HANDLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedValue {
    pub value: String,
    pub type_name: Option<String>,
    pub handle: VariablesReference,
}

#[derive(Debug, Default)]
pub struct Inspector {
    last_handle: VariablesReference,
    /// Call frames of the current stop, innermost first.
    frames: Vec<FrameNode>,
    evaluations: Vec<StackNode>,
    handles: HashMap<VariablesReference, NodePath>,
}

impl Inspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stack with the tree of a new break event.
    ///
    /// Every handle minted before this call stops resolving.
    pub fn record_stop(&mut self, nodes: Vec<StackNode>) {
        self.clear();
        for node in nodes {
            match node {
                StackNode::Frame(frame) => self.frames.push(frame),
                StackNode::Container { children } => {
                    for child in children {
                        match child {
                            StackNode::Frame(frame) => self.frames.push(frame),
                            other => {
                                tracing::warn!(node = ?other, "ignoring non-frame node in stack")
                            }
                        }
                    }
                }
                StackNode::Value(value) => {
                    tracing::warn!(name = %value.name, "ignoring value node at stack root")
                }
            }
        }
        tracing::debug!(frames = self.frames.len(), "recorded stop");
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.evaluations.clear();
        self.handles.clear();
    }

    pub fn frames(&self) -> &[FrameNode] {
        &self.frames
    }

    /// Frame ids are 1-based positions in [`Inspector::frames`].
    pub fn frame(&self, id: StackFrameId) -> Option<&FrameNode> {
        self.frame_position(id).map(|pos| &self.frames[pos])
    }

    /// Zero-based stack level the agent uses to address a frame.
    pub fn stack_level(&self, id: StackFrameId) -> Option<i32> {
        self.frame_position(id)
            .and_then(|pos| i32::try_from(pos).ok())
    }

    fn frame_position(&self, id: StackFrameId) -> Option<usize> {
        let pos = usize::try_from(id).ok()?.checked_sub(1)?;
        (pos < self.frames.len()).then_some(pos)
    }

    /// Handle of the single "Local" scope of a frame.
    pub fn scope_handle(&mut self, id: StackFrameId) -> Option<VariablesReference> {
        let pos = self.frame_position(id)?;
        Some(self.mint(NodePath {
            root: Root::Frame(pos),
            path: Vec::new(),
        }))
    }

    /// Children of the node behind `handle`, or `None` if the handle is
    /// unknown or belongs to an earlier stop.
    pub fn variables(&mut self, handle: VariablesReference) -> Option<Vec<VariableView>> {
        let target = self.handles.get(&handle)?.clone();
        let children = self.children(&target)?;

        let shapes: Vec<_> = children
            .iter()
            .enumerate()
            .map(|(index, child)| match child {
                StackNode::Value(value) => Some((
                    index,
                    VariableView {
                        name: value.name.clone(),
                        value: value.value.clone(),
                        type_name: non_empty(&value.type_name),
                        handle: NO_HANDLE,
                    },
                    !value.children.is_empty(),
                )),
                other => {
                    tracing::warn!(node = ?other, "unexpected node among variables");
                    None
                }
            })
            .collect();

        let views = shapes
            .into_iter()
            .map(|shape| match shape {
                Some((index, mut view, expandable)) => {
                    if expandable {
                        let mut path = target.path.clone();
                        path.push(index);
                        view.handle = self.mint(NodePath {
                            root: target.root,
                            path,
                        });
                    }
                    view
                }
                None => VariableView::placeholder(),
            })
            .collect();
        Some(views)
    }

    /// Keep an evaluation result for this stop, minting a handle if it can
    /// be expanded.
    pub fn evaluation_result(&mut self, node: StackNode) -> EvaluatedValue {
        let (value, type_name) = match &node {
            StackNode::Value(value) => (value.value.clone(), non_empty(&value.type_name)),
            StackNode::Frame(frame) => (frame.function_name.clone(), None),
            StackNode::Container { .. } => (String::new(), None),
        };

        let handle = if node.children().is_empty() {
            NO_HANDLE
        } else {
            self.evaluations.push(node);
            self.mint(NodePath {
                root: Root::Evaluation(self.evaluations.len() - 1),
                path: Vec::new(),
            })
        };

        EvaluatedValue {
            value,
            type_name,
            handle,
        }
    }

    fn mint(&mut self, target: NodePath) -> VariablesReference {
        self.last_handle += 1;
        self.handles.insert(self.last_handle, target);
        self.last_handle
    }

    fn children(&self, target: &NodePath) -> Option<&[StackNode]> {
        let mut children: &[StackNode] = match target.root {
            Root::Frame(pos) => &self.frames.get(pos)?.children,
            Root::Evaluation(pos) => self.evaluations.get(pos)?.children(),
        };
        for &index in &target.path {
            children = children.get(index)?.children();
        }
        Some(children)
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use wire::ValueNode;

    use super::*;

    fn value(name: &str, value: &str, children: Vec<StackNode>) -> StackNode {
        StackNode::Value(ValueNode {
            name: name.to_string(),
            value: value.to_string(),
            type_name: "table".to_string(),
            children,
        })
    }

    fn frame(function_name: &str, children: Vec<StackNode>) -> StackNode {
        StackNode::Frame(FrameNode {
            script_index: 1,
            function_name: function_name.to_string(),
            line: 10,
            children,
        })
    }

    #[test]
    fn frames_keep_agent_order_with_synthetic_ids() {
        let mut inspector = Inspector::new();
        inspector.record_stop(vec![frame("inner", vec![]), frame("outer", vec![])]);

        assert_eq!(inspector.frame(1).unwrap().function_name, "inner");
        assert_eq!(inspector.frame(2).unwrap().function_name, "outer");
        assert_eq!(inspector.stack_level(2), Some(1));
        assert!(inspector.frame(0).is_none());
        assert!(inspector.frame(3).is_none());
    }

    #[test]
    fn container_root_is_flattened() {
        let mut inspector = Inspector::new();
        inspector.record_stop(vec![StackNode::Container {
            children: vec![frame("a", vec![]), value("stray", "1", vec![]), frame("b", vec![])],
        }]);

        let names: Vec<_> = inspector
            .frames()
            .iter()
            .map(|f| f.function_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn nested_values_expand_through_handles() {
        let mut inspector = Inspector::new();
        inspector.record_stop(vec![frame(
            "main",
            vec![
                value("t", "table: 0x1", vec![value("x", "1", vec![])]),
                value("n", "5", vec![]),
            ],
        )]);

        let scope = inspector.scope_handle(1).unwrap();
        let locals = inspector.variables(scope).unwrap();
        assert_eq!(locals.len(), 2);
        assert_eq!(locals[1].handle, NO_HANDLE);
        assert_ne!(locals[0].handle, NO_HANDLE);

        let fields = inspector.variables(locals[0].handle).unwrap();
        assert_eq!(fields[0].name, "x");
        assert_eq!(fields[0].value, "1");
    }

    #[test]
    fn unknown_children_render_as_placeholders() {
        let mut inspector = Inspector::new();
        inspector.record_stop(vec![frame(
            "main",
            vec![frame("nested", vec![]), value("ok", "1", vec![])],
        )]);

        let scope = inspector.scope_handle(1).unwrap();
        let vars = inspector.variables(scope).unwrap();
        assert_eq!(vars[0], VariableView::placeholder());
        assert_eq!(vars[1].name, "ok");
    }

    #[test]
    fn handles_expire_on_next_stop() {
        let mut inspector = Inspector::new();
        inspector.record_stop(vec![frame("main", vec![value("a", "1", vec![])])]);
        let old = inspector.scope_handle(1).unwrap();
        assert!(inspector.variables(old).is_some());

        inspector.record_stop(vec![frame("main", vec![value("a", "2", vec![])])]);
        assert!(inspector.variables(old).is_none());

        let fresh = inspector.scope_handle(1).unwrap();
        assert!(fresh > old);
        assert_eq!(inspector.variables(fresh).unwrap()[0].value, "2");
    }

    #[test]
    fn evaluation_results_are_expandable_until_next_stop() {
        let mut inspector = Inspector::new();
        inspector.record_stop(vec![frame("main", vec![])]);

        let scalar = inspector.evaluation_result(value("x", "42", vec![]));
        assert_eq!(scalar.handle, NO_HANDLE);
        assert_eq!(scalar.value, "42");

        let table = inspector.evaluation_result(value("t", "table", vec![value("k", "v", vec![])]));
        assert_eq!(inspector.variables(table.handle).unwrap()[0].name, "k");

        inspector.record_stop(vec![]);
        assert!(inspector.variables(table.handle).is_none());
    }
}
