use std::collections::HashMap;

use super::*;

/// Opaque handle to a node in the page arena. Stable for the page lifetime;
/// nodes are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) attrs: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Dom {
    nodes: Vec<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
}

impl Dom {
    pub(crate) fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    /// First element child of the document node (the `<html>` element for a
    /// full page, the first top-level element for a fragment).
    pub(crate) fn root_element(&self) -> Option<NodeId> {
        self.nodes[self.root.0]
            .children
            .iter()
            .copied()
            .find(|child| self.is_element(*child))
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: String,
        attrs: HashMap<String, String>,
    ) -> NodeId {
        let id = self.create_node(Some(parent), NodeType::Element(Element { tag_name, attrs }));
        if let Some(id_attr) = self.attr(id, "id") {
            if !id_attr.is_empty() {
                self.id_index.insert(id_attr, id);
            }
        }
        id
    }

    pub(crate) fn create_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.create_node(Some(parent), NodeType::Text(text))
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn is_element(&self, node_id: NodeId) -> bool {
        self.element(node_id).is_some()
    }

    pub(crate) fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    pub(crate) fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0)?.parent
    }

    pub(crate) fn parent_element(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        self.is_element(parent).then_some(parent)
    }

    pub(crate) fn children(&self, node_id: NodeId) -> &[NodeId] {
        self.nodes
            .get(node_id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn attr(&self, node_id: NodeId, name: &str) -> Option<String> {
        self.element(node_id)
            .and_then(|e| e.attrs.get(name).cloned())
    }

    pub(crate) fn has_attr(&self, node_id: NodeId, name: &str) -> bool {
        self.element(node_id)
            .map(|e| e.attrs.contains_key(name))
            .unwrap_or(false)
    }

    pub(crate) fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        let old_id = if lowered == "id" {
            self.attr(node_id, "id")
        } else {
            None
        };

        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Runtime("set_attr target is not an element".into()))?;
        element.attrs.insert(lowered.clone(), value.to_string());

        if lowered == "id" {
            if let Some(old) = old_id {
                self.id_index.remove(&old);
            }
            if !value.is_empty() {
                self.id_index.insert(value.to_string(), node_id);
            }
        }
        Ok(())
    }

    pub(crate) fn remove_attr(&mut self, node_id: NodeId, name: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Runtime("remove_attr target is not an element".into()))?;
        let removed = element.attrs.remove(&lowered);
        if lowered == "id" {
            if let Some(old) = removed {
                self.id_index.remove(&old);
            }
        }
        Ok(())
    }

    pub(crate) fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    /// Element nodes in document order, the whole tree.
    pub(crate) fn all_elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements(self.root, &mut out);
        out
    }

    /// Element descendants of `root` in document order, `root` excluded.
    pub(crate) fn descendant_elements(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for child in self.children(root).to_vec() {
            self.collect_elements(child, &mut out);
        }
        out
    }

    fn collect_elements(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        if self.is_element(node_id) {
            out.push(node_id);
        }
        for child in self.children(node_id) {
            self.collect_elements(*child, out);
        }
    }

    pub(crate) fn elements_with_attr(&self, name: &str) -> Vec<NodeId> {
        self.all_elements()
            .into_iter()
            .filter(|node| self.has_attr(*node, name))
            .collect()
    }

    pub(crate) fn elements_with_class(&self, class_name: &str) -> Vec<NodeId> {
        self.all_elements()
            .into_iter()
            .filter(|node| self.has_class(*node, class_name))
            .collect()
    }

    pub(crate) fn has_class(&self, node_id: NodeId, class_name: &str) -> bool {
        self.element(node_id)
            .map(|element| has_class(element, class_name))
            .unwrap_or(false)
    }

    pub(crate) fn add_class(&mut self, node_id: NodeId, class_name: &str) {
        let Some(element) = self.element_mut(node_id) else {
            return;
        };
        let mut tokens = class_tokens(element.attrs.get("class").map(String::as_str));
        if !tokens.iter().any(|token| token == class_name) {
            tokens.push(class_name.to_string());
        }
        set_class_attr(element, &tokens);
    }

    pub(crate) fn remove_class(&mut self, node_id: NodeId, class_name: &str) {
        let Some(element) = self.element_mut(node_id) else {
            return;
        };
        let mut tokens = class_tokens(element.attrs.get("class").map(String::as_str));
        tokens.retain(|token| token != class_name);
        set_class_attr(element, &tokens);
    }

    /// Concatenated text of the subtree, leading/trailing whitespace trimmed.
    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node_id, &mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, node_id: NodeId, out: &mut String) {
        if let Some(node) = self.nodes.get(node_id.0) {
            if let NodeType::Text(text) = &node.node_type {
                out.push_str(text);
            }
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Replaces the subtree below `node_id` with a single text node.
    /// Detached elements are dropped from the id index.
    pub(crate) fn set_text(&mut self, node_id: NodeId, text: &str) {
        let children = std::mem::take(&mut self.nodes[node_id.0].children);
        for child in children {
            self.forget_subtree_ids(child);
        }
        self.create_text(node_id, text.to_string());
    }

    fn forget_subtree_ids(&mut self, node_id: NodeId) {
        if let Some(id_attr) = self.attr(node_id, "id") {
            if self.id_index.get(&id_attr) == Some(&node_id) {
                self.id_index.remove(&id_attr);
            }
        }
        for child in self.children(node_id).to_vec() {
            self.forget_subtree_ids(child);
        }
    }

    /// Short "#id" or "<tag>" description for violation and trace text.
    pub(crate) fn describe(&self, node_id: NodeId) -> String {
        match self.attr(node_id, "id") {
            Some(id) if !id.is_empty() => format!("#{id}"),
            _ => format!("<{}>", self.tag_name(node_id).unwrap_or("?")),
        }
    }

    /// Renders the subtree as an indented snippet for assertion failures.
    pub(crate) fn dump(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.dump_node(node_id, 0, &mut out);
        out.trim_end().to_string()
    }

    fn dump_node(&self, node_id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.nodes.get(node_id.0) else {
            return;
        };
        let indent = "  ".repeat(depth);
        match &node.node_type {
            NodeType::Document => {
                for child in &node.children {
                    self.dump_node(*child, depth, out);
                }
                return;
            }
            NodeType::Element(element) => {
                let mut attrs: Vec<_> = element.attrs.iter().collect();
                attrs.sort();
                out.push_str(&indent);
                out.push('<');
                out.push_str(&element.tag_name);
                for (name, value) in attrs {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                out.push_str(">\n");
            }
            NodeType::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push_str(&indent);
                    out.push_str(trimmed);
                    out.push('\n');
                }
            }
        }
        for child in &node.children {
            self.dump_node(*child, depth + 1, out);
        }
    }
}

pub(crate) fn has_class(element: &Element, class_name: &str) -> bool {
    element
        .attrs
        .get("class")
        .map(|classes| classes.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

pub(crate) fn class_tokens(class_attr: Option<&str>) -> Vec<String> {
    class_attr
        .map(|value| {
            value
                .split_whitespace()
                .filter(|token| !token.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

pub(crate) fn set_class_attr(element: &mut Element, classes: &[String]) {
    if classes.is_empty() {
        element.attrs.remove("class");
    } else {
        element.attrs.insert("class".to_string(), classes.join(" "));
    }
}
