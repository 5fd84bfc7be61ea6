use super::parse::is_void_element;
use super::{Dom, NodeId, NodeKind};

impl Dom {
    /// Markup for the children of `node`
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Markup for `node` itself and its subtree
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            NodeKind::Document | NodeKind::Fragment => {
                for &child in self.children(node) {
                    self.write_node(child, out);
                }
            }
            NodeKind::Text(data) => {
                let raw = self.parent(node).is_some_and(|parent| self.is_rawtext(parent));
                if raw {
                    out.push_str(data);
                } else {
                    out.push_str(&html_escape::encode_text(data));
                }
            }
            NodeKind::Comment(data) => {
                out.push_str("<!--");
                out.push_str(data);
                out.push_str("-->");
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if is_void_element(&element.name) {
                    return;
                }
                for &child in self.children(node) {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
        }
    }
}
