//! Lenient HTML fragment parser for email bodies.
//!
//! This is not an HTML5 tree builder. It understands start/end/self-closing
//! tags, quoted, unquoted and boolean attributes, comments, void elements and
//! rawtext `script`/`style`, and applies a handful of implied end tags
//! (`p`, `li`, table cells, `option`). Anything it does not understand is
//! either kept as text or skipped; parsing never fails.
//!
//! Consecutive text is always emitted as a single text node, so a freshly
//! parsed tree never contains adjacent or empty text nodes.

use std::borrow::Cow;

use super::{Dom, Element, NodeId, NodeKind};

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";

pub(crate) fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

pub(crate) fn is_rawtext_element(name: &str) -> bool {
    matches!(name, "script" | "style")
}

/// Block-level starts that implicitly close an open `<p>`
fn closes_paragraph(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "div"
            | "dl"
            | "fieldset"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "ul"
    )
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

/// Parse `html` and append the resulting nodes to `parent`
pub fn parse_fragment(dom: &mut Dom, parent: NodeId, html: &str) {
    let mut builder = Builder {
        dom,
        open: vec![parent],
        text: String::new(),
    };
    let bytes = html.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            builder.text.push_str(&html[start..i]);
            continue;
        }

        let rest = &html[i..];
        if rest.starts_with(COMMENT_START) {
            let body_start = i + COMMENT_START.len();
            let (body, next) = match html[body_start..].find(COMMENT_END) {
                Some(end) => (
                    &html[body_start..body_start + end],
                    body_start + end + COMMENT_END.len(),
                ),
                None => (&html[body_start..], html.len()),
            };
            builder.comment(body);
            i = next;
            continue;
        }

        // Doctype, CDATA and processing instructions carry no content
        if rest.starts_with("<!") || rest.starts_with("<?") {
            i = skip_past(bytes, i, b'>');
            continue;
        }

        if rest.starts_with("</") {
            let name_start = i + 2;
            let mut j = name_start;
            while j < bytes.len() && is_name_byte(bytes[j]) {
                j += 1;
            }
            if j == name_start {
                // `</>` or `</ ...`: not a tag
                builder.text.push('<');
                i += 1;
                continue;
            }
            let name = html[name_start..j].to_ascii_lowercase();
            builder.end_tag(&name);
            i = skip_past(bytes, j, b'>');
            continue;
        }

        if i + 1 < bytes.len() && bytes[i + 1].is_ascii_alphabetic() {
            let (tag, next) = read_start_tag(html, i + 1);
            i = next;
            let name = tag.element.name.clone();
            let element = builder.start_tag(tag.element, tag.self_closing);
            if is_rawtext_element(&name) && !tag.self_closing {
                let (content, next) = read_rawtext(html, i, &name);
                if !content.is_empty() {
                    let text = builder.dom.create_text(content);
                    builder.dom.append_child(element, text);
                }
                builder.pop_to(element);
                i = next;
            }
            continue;
        }

        builder.text.push('<');
        i += 1;
    }

    builder.flush_text();
}

struct StartTag {
    element: Element,
    self_closing: bool,
}

struct Builder<'a> {
    dom: &'a mut Dom,
    /// Open elements; index 0 is the fragment parent and is never popped
    open: Vec<NodeId>,
    text: String,
}

impl Builder<'_> {
    fn current(&self) -> NodeId {
        self.open[self.open.len() - 1]
    }

    fn current_name(&self) -> Option<&str> {
        if self.open.len() <= 1 {
            return None;
        }
        self.dom
            .element(self.current())
            .map(|element| element.name.as_str())
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.text);
        let decoded: Cow<str> = html_escape::decode_html_entities(&raw);
        let parent = self.current();
        let last = self.dom.children(parent).last().copied();
        match last {
            Some(node) if self.dom.is_text(node) => {
                let length = self.dom.node_length(node);
                self.dom.replace_data(node, length, 0, &decoded);
            }
            _ => {
                let node = self.dom.create_text(&decoded);
                self.dom.append_child(parent, node);
            }
        }
    }

    fn comment(&mut self, body: &str) {
        self.flush_text();
        let node = self.dom.create_comment(body);
        let parent = self.current();
        self.dom.append_child(parent, node);
    }

    fn start_tag(&mut self, element: Element, self_closing: bool) -> NodeId {
        self.flush_text();
        self.close_implied(&element.name);
        let name = element.name.clone();
        let node = self.dom.create_element_with(element);
        let parent = self.current();
        self.dom.append_child(parent, node);
        if !self_closing && !is_void_element(&name) {
            self.open.push(node);
        }
        node
    }

    fn close_implied(&mut self, name: &str) {
        if closes_paragraph(name) && self.has_open("p") {
            self.close("p");
        }
        match name {
            "li" => self.close_sibling(&["li"], &["ul", "ol"]),
            "dt" | "dd" => self.close_sibling(&["dt", "dd"], &["dl"]),
            "tr" => self.close_sibling(&["tr"], &["table", "tbody", "thead", "tfoot"]),
            "td" | "th" => self.close_sibling(&["td", "th"], &["tr", "table"]),
            "option" => self.close_sibling(&["option"], &["select"]),
            _ => {}
        }
    }

    /// Close an open sibling of the same family unless a scope boundary
    /// sits in between
    fn close_sibling(&mut self, family: &[&str], scope: &[&str]) {
        let mut target = None;
        for &node in self.open.iter().skip(1).rev() {
            let Some(element) = self.dom.element(node) else {
                continue;
            };
            if scope.contains(&element.name.as_str()) {
                break;
            }
            if family.contains(&element.name.as_str()) {
                target = Some(node);
                break;
            }
        }
        if let Some(node) = target {
            self.pop_to(node);
        }
    }

    fn has_open(&self, name: &str) -> bool {
        self.open
            .iter()
            .skip(1)
            .any(|&node| self.dom.element(node).is_some_and(|e| e.name == name))
    }

    fn close(&mut self, name: &str) {
        let found = self
            .open
            .iter()
            .skip(1)
            .rev()
            .find(|&&node| self.dom.element(node).is_some_and(|e| e.name == name))
            .copied();
        if let Some(node) = found {
            self.pop_to(node);
        }
    }

    /// Pop open elements up to and including `node`
    fn pop_to(&mut self, node: NodeId) {
        if let Some(position) = self.open.iter().rposition(|&open| open == node)
            && position > 0
        {
            self.open.truncate(position);
        }
    }

    fn end_tag(&mut self, name: &str) {
        self.flush_text();
        if name == "p" && !self.has_open("p") {
            // `</p>` without a start produces an empty paragraph
            let node = self.dom.create_element("p");
            let parent = self.current();
            self.dom.append_child(parent, node);
            return;
        }
        if self.current_name() == Some(name) {
            self.open.pop();
            return;
        }
        // Stray end tags are ignored
        self.close(name);
    }
}

fn skip_past(bytes: &[u8], from: usize, byte: u8) -> usize {
    match bytes[from.min(bytes.len())..]
        .iter()
        .position(|&b| b == byte)
    {
        Some(offset) => from + offset + 1,
        None => bytes.len(),
    }
}

fn read_start_tag(html: &str, name_start: usize) -> (StartTag, usize) {
    let bytes = html.as_bytes();
    let mut i = name_start;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let mut element = Element::new(&html[name_start..i]);
    let mut self_closing = false;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        match bytes[i] {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                i += 1;
                if i < bytes.len() && bytes[i] == b'>' {
                    self_closing = true;
                    i += 1;
                    break;
                }
                continue;
            }
            _ => {}
        }

        let attr_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        if i == attr_start {
            // Lone `=`: skip it
            i += 1;
            continue;
        }
        let attr_name = html[attr_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                let value_start = i + 1;
                let value_end = bytes[value_start..]
                    .iter()
                    .position(|&b| b == quote)
                    .map(|offset| value_start + offset)
                    .unwrap_or(bytes.len());
                value = html_escape::decode_html_entities(&html[value_start..value_end])
                    .into_owned();
                i = (value_end + 1).min(bytes.len());
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                value = html_escape::decode_html_entities(&html[value_start..i]).into_owned();
            }
        }
        // First occurrence wins
        if !element.has_attr(&attr_name) {
            element.attrs.push((attr_name, value));
        }
    }

    (
        StartTag {
            element,
            self_closing,
        },
        i,
    )
}

/// Raw content up to the matching close tag, and the index just past it
fn read_rawtext<'a>(html: &'a str, from: usize, name: &str) -> (&'a str, usize) {
    let close = format!("</{name}");
    let lower = html[from..].to_ascii_lowercase();
    match lower.find(&close) {
        Some(offset) => {
            let content_end = from + offset;
            let next = skip_past(html.as_bytes(), content_end + close.len(), b'>');
            (&html[from..content_end], next)
        }
        None => (&html[from..], html.len()),
    }
}

impl Dom {
    /// True when `node` was produced from markup that is never rendered as text
    pub(crate) fn is_rawtext(&self, node: NodeId) -> bool {
        matches!(self.kind(node), NodeKind::Element(element) if is_rawtext_element(&element.name))
    }
}
