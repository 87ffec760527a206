//! ASCII rendering of a conversation graph for terminal display.

use forky_core::node::Node;

use crate::graph::ConversationGraph;

const PREVIEW_LEN: usize = 30;

impl ConversationGraph {
    /// Render the graph as an indented ASCII tree, children oldest-first.
    ///
    /// Merge nodes appear once per parent; the duplicate occurrence is
    /// marked instead of recursing again.
    pub fn ascii_tree(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(self.len());
        let root = match self.get(self.root_id()) {
            Some(root) => root,
            None => return String::new(),
        };
        let mut rendered: std::collections::HashSet<String> = std::collections::HashSet::new();
        self.tree_lines(root, "", true, &mut rendered, &mut lines);
        lines.join("\n")
    }

    fn tree_lines(
        &self,
        node: &Node,
        prefix: &str,
        is_last: bool,
        rendered: &mut std::collections::HashSet<String>,
        lines: &mut Vec<String>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let marker = if node.id == *self.current_node_id() { " *" } else { "" };
        if !rendered.insert(node.id.as_str().to_string()) {
            lines.push(format!("{prefix}{connector}[{}] (see above){marker}", node.role));
            return;
        }
        lines.push(format!("{prefix}{connector}[{}] {}{marker}", node.role, preview(&node.content)));

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let mut children = self.children_of(&node.id);
        children.reverse(); // children_of is newest-first; render oldest-first
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.tree_lines(child, &child_prefix, i == count - 1, rendered, lines);
        }
    }
}

fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > PREVIEW_LEN {
        let cut: String = flat.chars().take(PREVIEW_LEN).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
