//! Finalize Module
//!
//! Page-level assembly after directive resolution: normalize the tree to a
//! single `<html>` root with `<head>` and `<body>`, inject collected style
//! bindings, then format.

use tracing::warn;

use crate::document::{Attributes, Document, FindOptions, NodeId, NodeKind};
use crate::error::Result;

/// Tags moved into `<head>` when they appear outside `<html>`.
const HEAD_TAGS: &[&str] = &["title", "meta", "link", "style", "base"];

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub path: String,
    pub document: Document,
    pub markup: String,
}

/// Styles bound to the page being compiled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleBindings {
    /// Compiled CSS emitted as `<style>` blocks, one per distinct text.
    pub inline: Vec<String>,
    /// Stylesheet paths emitted as `<link>`, one per distinct path.
    pub links: Vec<String>,
    /// Link-mode CSS not yet turned into a created resource.
    pub pending: Vec<PendingLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    pub css: String,
    pub source_path: String,
}

impl StyleBindings {
    pub fn push_inline(&mut self, css: String) {
        if !self.inline.contains(&css) {
            self.inline.push(css);
        }
    }

    pub fn push_link(&mut self, path: String) {
        if !self.links.contains(&path) {
            self.links.push(path);
        }
    }

    pub fn push_pending(&mut self, css: String, source_path: &str) {
        let link = PendingLink {
            css,
            source_path: source_path.to_string(),
        };
        if !self.pending.contains(&link) {
            self.pending.push(link);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inline.is_empty() && self.links.is_empty() && self.pending.is_empty()
    }
}

pub trait Formatter {
    /// Structural normalization before serialization.
    fn format_tree(&self, document: &mut Document) -> Result<()>;
    /// Textual formatting of serialized markup.
    fn format_text(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn format_tree(&self, document: &mut Document) -> Result<()> {
        let containers = document.find_children(
            document.root(),
            FindOptions::recursive().tags_only(),
            &|k: &NodeKind| matches!(k.tag_name(), Some("html") | Some("head")),
        );
        for container in containers {
            for child in document.children(container).to_vec() {
                if document.kind(child).is_whitespace_text() {
                    document.detach(child)?;
                }
            }
        }
        Ok(())
    }

    fn format_text(&self, text: &str) -> String {
        let mut out = text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string();
        out.push('\n');
        out
    }
}

fn is_tag(document: &Document, id: NodeId, name: &str) -> bool {
    document.kind(id).tag_name() == Some(name)
}

fn child_tag(document: &Document, parent: NodeId, name: &str) -> Option<NodeId> {
    document.find_child(parent, FindOptions::direct().tags_only(), &|k: &NodeKind| {
        k.tag_name() == Some(name)
    })
}

fn move_children(document: &mut Document, from: NodeId, to: NodeId) -> Result<()> {
    for child in document.children(from).to_vec() {
        document.append_child(to, child)?;
    }
    Ok(())
}

/// Route a node found outside its proper place to `head` or `body`.
fn place(document: &mut Document, node: NodeId, head: NodeId, body: NodeId) -> Result<()> {
    if is_tag(document, node, "head") {
        move_children(document, node, head)?;
        document.detach(node)?;
    } else if is_tag(document, node, "body") {
        move_children(document, node, body)?;
        document.detach(node)?;
    } else if document.kind(node).is_whitespace_text() {
        document.detach(node)?;
    } else if HEAD_TAGS.iter().any(|t| is_tag(document, node, t)) {
        document.append_child(head, node)?;
    } else {
        document.append_child(body, node)?;
    }
    Ok(())
}

/// Normalize `document` into a single `<html><head/><body/></html>` root and
/// inject `bindings` into the head. Returns a compacted copy.
pub fn assemble_page(mut document: Document, bindings: &StyleBindings) -> Result<Document> {
    let root = document.root();
    let roots: Vec<NodeId> = document.children(root).to_vec();
    let mut htmls: Vec<NodeId> = roots
        .iter()
        .copied()
        .filter(|&id| is_tag(&document, id, "html"))
        .collect();

    let html = if htmls.is_empty() {
        let html = document.create(NodeKind::tag("html"));
        document.append_child(root, html)?;
        html
    } else {
        htmls.remove(0)
    };
    let extra_htmls = htmls;
    if !extra_htmls.is_empty() {
        warn!(count = extra_htmls.len(), "merging nested <html> roots");
    }

    let head = match child_tag(&document, html, "head") {
        Some(head) => head,
        None => {
            let head = document.create(NodeKind::tag("head"));
            document.prepend_child(html, head)?;
            head
        }
    };
    let body = match child_tag(&document, html, "body") {
        Some(body) => body,
        None => {
            let body = document.create(NodeKind::tag("body"));
            document.append_child(html, body)?;
            body
        }
    };

    for child in document.children(html).to_vec() {
        if child != head && child != body {
            place(&mut document, child, head, body)?;
        }
    }
    for extra in extra_htmls {
        for child in document.children(extra).to_vec() {
            place(&mut document, child, head, body)?;
        }
        document.detach(extra)?;
    }
    for child in roots {
        let stays = child == html
            || !document.is_attached(child)
            || matches!(
                document.kind(child),
                NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. }
            );
        if !stays {
            place(&mut document, child, head, body)?;
        }
    }

    for css in &bindings.inline {
        let style = document.create(NodeKind::tag("style"));
        let text = document.create(NodeKind::text(css.clone()));
        document.append_child(style, text)?;
        document.append_child(head, style)?;
    }
    for href in &bindings.links {
        let attributes: Attributes = [("rel", "stylesheet"), ("href", href.as_str())]
            .into_iter()
            .collect();
        let link = document.create(NodeKind::Tag {
            name: "link".into(),
            attributes,
        });
        document.append_child(head, link)?;
    }

    Ok(document.deep_clone(&mut |_, _| {}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{HtmlSyntax, Serializer};
    use pretty_assertions::assert_eq;

    fn parse(html: &str) -> Document {
        HtmlSyntax.parse_document("page.html", html).unwrap()
    }

    #[test]
    fn bare_content_gets_a_full_skeleton() {
        let document = assemble_page(parse("<title>T</title><p>hi</p>"), &StyleBindings::default())
            .unwrap();
        assert_eq!(
            HtmlSyntax.serialize(&document),
            "<html><head><title>T</title></head><body><p>hi</p></body></html>"
        );
    }

    #[test]
    fn existing_skeleton_is_kept_and_bindings_injected() {
        let mut bindings = StyleBindings::default();
        bindings.push_inline("p{color:red}".into());
        bindings.push_inline("p{color:red}".into());
        bindings.push_link("/card.css".into());

        let document = assemble_page(
            parse("<html><head><title>T</title></head><body><p>x</p></body></html>"),
            &bindings,
        )
        .unwrap();
        assert_eq!(
            HtmlSyntax.serialize(&document),
            "<html><head><title>T</title><style>p{color:red}</style>\
             <link rel=\"stylesheet\" href=\"/card.css\"></head><body><p>x</p></body></html>"
        );
    }

    #[test]
    fn default_formatter_trims_lines_and_head_whitespace() {
        let mut document = parse("<html><head>\n  <title>T</title>\n</head><body>\n<p>x</p></body></html>");
        DefaultFormatter.format_tree(&mut document).unwrap();
        assert_eq!(
            HtmlSyntax.serialize(&document),
            "<html><head><title>T</title></head><body>\n<p>x</p></body></html>"
        );
        assert_eq!(DefaultFormatter.format_text("a  \nb\t\n\n"), "a\nb\n");
    }
}
