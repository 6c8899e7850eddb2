//! Model registry: the named tree of models exposed by the server
//!
//! Nodes live in an arena and refer to each other by index; a hash map
//! resolves names to indices. The root node `sim` always exists, and every
//! other node hangs off a parent that was registered before it, so the
//! structure is a tree by construction.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::model::{InterfaceType, ModelId};

/// Name of the root node representing the simulation itself
pub const ROOT_ID: &str = "sim";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Model name is not path-safe: {0:?}")]
    InvalidName(String),
    #[error("A model named {0} is already registered")]
    DuplicateName(String),
    #[error("Parent model {parent} of {name} is not registered")]
    UnknownParent { name: String, parent: String },
    #[error("No model named {0}")]
    NotFound(String),
}

type NodeIndex = usize;

/// A model registered in the namespace
#[derive(Debug, Clone)]
pub struct Node {
    pub id: ModelId,
    /// Hint to clients about what kind of object this is
    pub prototype: String,
    pub interface: InterfaceType,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

/// Nested view of a node and all of its descendants
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeView {
    pub name: String,
    pub prototype: String,
    #[serde(rename = "type")]
    pub interface: InterfaceType,
    pub children: Vec<TreeView>,
}

/// Hierarchical store of all registered models
#[derive(Debug, Clone)]
pub struct Registry {
    nodes: Vec<Node>,
    index: HashMap<String, NodeIndex>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry holding only the `sim` root
    pub fn new() -> Self {
        let root = Node {
            id: ModelId(ROOT_ID.to_string()),
            prototype: ROOT_ID.to_string(),
            interface: InterfaceType::Sim,
            parent: None,
            children: Vec::new(),
        };
        let mut index = HashMap::new();
        index.insert(ROOT_ID.to_string(), 0);
        Self {
            nodes: vec![root],
            index,
        }
    }

    /// Insert a model under `parent`, or under the root when no parent is
    /// given. Nothing is modified when an error is returned.
    pub fn insert(
        &mut self,
        id: &ModelId,
        prototype: &str,
        interface: InterfaceType,
        parent: Option<&str>,
    ) -> Result<&Node, RegistryError> {
        if self.index.contains_key(id.as_str()) {
            return Err(RegistryError::DuplicateName(id.to_string()));
        }

        let parent_idx = match parent {
            Some(name) => *self.index.get(name).ok_or_else(|| RegistryError::UnknownParent {
                name: id.to_string(),
                parent: name.to_string(),
            })?,
            None => 0,
        };

        let idx = self.nodes.len();
        self.nodes.push(Node {
            id: id.clone(),
            prototype: prototype.to_string(),
            interface,
            parent: Some(parent_idx),
            children: Vec::new(),
        });
        self.index.insert(id.to_string(), idx);
        self.nodes[parent_idx].children.push(idx);

        debug!(
            model = %id,
            parent = %self.nodes[parent_idx].id,
            interface = %interface,
            "Inserted model into registry"
        );
        Ok(&self.nodes[idx])
    }

    /// Get a node by name
    pub fn lookup(&self, name: &str) -> Result<&Node, RegistryError> {
        self.index
            .get(name)
            .map(|&idx| &self.nodes[idx])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Get the root node
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Get the parent of a node (`None` for the root)
    pub fn parent(&self, node: &Node) -> Option<&Node> {
        node.parent.map(|idx| &self.nodes[idx])
    }

    /// Get the children of a node in registration order
    pub fn children<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Node> + 'a {
        node.children.iter().map(move |&idx| &self.nodes[idx])
    }

    /// All nodes in registration order, root first
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Number of nodes, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether any model besides the root has been registered
    pub fn has_models(&self) -> bool {
        self.nodes.len() > 1
    }

    /// Nested view of `name` and its descendants, defaulting to the root
    pub fn subtree_view(&self, name: Option<&str>) -> Result<TreeView, RegistryError> {
        let idx = match name {
            Some(name) => *self
                .index
                .get(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?,
            None => 0,
        };
        Ok(self.view_of(idx))
    }

    fn view_of(&self, idx: NodeIndex) -> TreeView {
        let node = &self.nodes[idx];
        TreeView {
            name: node.id.to_string(),
            prototype: node.prototype.clone(),
            interface: node.interface,
            children: node.children.iter().map(|&c| self.view_of(c)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ModelId {
        ModelId::new(name).unwrap()
    }

    #[test]
    fn test_root_always_present() {
        let registry = Registry::new();
        assert!(!registry.has_models());
        assert_eq!(registry.len(), 1);

        let view = registry.subtree_view(None).unwrap();
        assert_eq!(view.name, "sim");
        assert_eq!(view.interface, InterfaceType::Sim);
        assert!(view.children.is_empty());
    }

    #[test]
    fn test_insert_nests_under_parent_in_order() {
        let mut registry = Registry::new();
        registry.insert(&id("robot1"), "pioneer", InterfaceType::Generic, None).unwrap();
        registry.insert(&id("robot2"), "pioneer", InterfaceType::Generic, Some("sim")).unwrap();
        registry.insert(&id("sonar"), "ranger", InterfaceType::Ranger, Some("robot1")).unwrap();
        registry.insert(&id("laser"), "ranger", InterfaceType::Ranger, Some("robot1")).unwrap();
        assert!(registry.has_models());
        assert_eq!(registry.len(), 5);

        let view = registry.subtree_view(None).unwrap();
        let names: Vec<_> = view.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["robot1", "robot2"]);

        let robot1 = &view.children[0];
        let sensors: Vec<_> = robot1.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(sensors, vec!["sonar", "laser"]);
        assert!(view.children[1].children.is_empty());

        let laser = registry.lookup("laser").unwrap();
        assert_eq!(registry.parent(laser).unwrap().id.as_str(), "robot1");
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_unknown_parent_leaves_no_trace() {
        let mut registry = Registry::new();
        let err = registry
            .insert(&id("orphan"), "box", InterfaceType::Generic, Some("nowhere"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownParent {
                name: "orphan".to_string(),
                parent: "nowhere".to_string()
            }
        );
        assert!(registry.lookup("orphan").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = Registry::new();
        registry.insert(&id("robot1"), "a", InterfaceType::Generic, None).unwrap();
        registry.insert(&id("arm"), "b", InterfaceType::Generic, Some("robot1")).unwrap();

        // Uniqueness is global, not per parent
        let err = registry
            .insert(&id("robot1"), "c", InterfaceType::Ranger, Some("arm"))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("robot1".to_string()));

        let err = registry.insert(&id("sim"), "d", InterfaceType::Sim, None).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("sim".to_string()));

        let robot1 = registry.lookup("robot1").unwrap();
        assert_eq!(robot1.prototype, "a");
        assert_eq!(robot1.interface, InterfaceType::Generic);
        assert_eq!(registry.children(registry.lookup("arm").unwrap()).count(), 0);
    }

    #[test]
    fn test_subtree_view_of_named_node() {
        let mut registry = Registry::new();
        registry.insert(&id("robot1"), "pioneer", InterfaceType::Position2d, None).unwrap();
        registry.insert(&id("ranger1"), "sick", InterfaceType::Ranger, Some("robot1")).unwrap();

        let view = registry.subtree_view(Some("robot1")).unwrap();
        assert_eq!(view.name, "robot1");
        assert_eq!(view.children.len(), 1);
        assert_eq!(view.children[0].name, "ranger1");
        assert_eq!(view.children[0].prototype, "sick");

        assert_eq!(
            registry.subtree_view(Some("ghost")).unwrap_err(),
            RegistryError::NotFound("ghost".to_string())
        );
    }

    #[test]
    fn test_tree_view_serialization() {
        let mut registry = Registry::new();
        registry.insert(&id("robot1"), "pioneer", InterfaceType::Generic, None).unwrap();

        let json = serde_json::to_value(registry.subtree_view(None).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "sim",
                "prototype": "sim",
                "type": "sim",
                "children": [
                    { "name": "robot1", "prototype": "pioneer", "type": "generic", "children": [] }
                ]
            })
        );
    }
}
