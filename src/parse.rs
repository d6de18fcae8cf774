//! Parse Module
//!
//! Turns resource text into [`Document`] trees and back. The default
//! [`HtmlSyntax`] parses with html5ever and maps the directive vocabulary
//! (`fragment`, `component`, `slot`, `content`, `var`, `import`) onto directive
//! node kinds.

use std::collections::HashMap;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;

use crate::component::{Component, Fragment, ScriptSource, Style, StyleMode, DEFAULT_SLOT};
use crate::document::{Attributes, Document, ImportTarget, NodeId, NodeKind};
use crate::error::{PipelineError, Result};
use crate::evaluator::delimited_spans;

pub trait ResourceParser {
    fn parse_fragment(&self, path: &str, text: &str) -> Result<Fragment>;
    fn parse_component(&self, path: &str, text: &str) -> Result<Component>;
}

pub trait Serializer {
    fn serialize(&self, document: &Document) -> String;
}

lazy_static! {
    /// Elements that never have content or a closing tag.
    static ref VOID_ELEMENTS: Vec<&'static str> = vec![
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
        "param", "source", "track", "wbr",
    ];

    /// Script and style blocks, whose bodies are raw text.
    static ref RAW_BLOCK_RE: Regex =
        Regex::new(r"(?is)<(script|style)\b([^>]*)>([\s\S]*?)</(?:script|style)>").unwrap();

    /// Attribute regex for script and style block attributes
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"(?i)([a-z0-9-]+)(?:=(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();

    /// `<tag attr="…" />`. Quoted values may contain `<`, `>` and `/`.
    static ref SELF_CLOSING_RE: Regex = Regex::new(
        r#"<([a-zA-Z][a-zA-Z0-9-]*)((?:\s+[^\s"'<>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'<>]+))?)*)\s*/>"#
    )
    .unwrap();

    static ref EXPR_PLACEHOLDER_RE: Regex = Regex::new(r"__TRELLIS_EXPR_(\d+)__").unwrap();
}

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

pub(crate) fn is_raw_text(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("script") || tag.eq_ignore_ascii_case("style")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PASSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Apply `f` to every stretch of `html` outside script and style blocks.
fn outside_raw_blocks(html: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in RAW_BLOCK_RE.find_iter(html) {
        out.push_str(&f(&html[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&html[last..]));
    out
}

/// html5ever treats `<fragment src="a" />` as an opening tag, so following
/// siblings would be nested inside it. Expand self-closing non-void tags.
fn expand_self_closing(html: &str) -> String {
    outside_raw_blocks(html, |chunk| {
        SELF_CLOSING_RE
            .replace_all(chunk, |caps: &regex::Captures| {
                let name = &caps[1];
                let attrs = caps.get(2).map_or("", |m| m.as_str());
                if is_void(name) {
                    format!("<{}{}>", name, attrs)
                } else {
                    format!("<{}{}></{}>", name, attrs, name)
                }
            })
            .to_string()
    })
}

/// Swap `{{ … }}` for placeholders so expression text (`a < b`) never reaches
/// the HTML tokenizer.
fn normalize_expressions(html: &str) -> (String, Vec<String>) {
    let mut expressions = Vec::new();
    let mut normalized = String::with_capacity(html.len());
    let mut last = 0;
    for span in delimited_spans(html) {
        normalized.push_str(&html[last..span.start]);
        normalized.push_str(&format!("__TRELLIS_EXPR_{}__", expressions.len()));
        expressions.push(html[span.clone()].to_string());
        last = span.end;
    }
    normalized.push_str(&html[last..]);
    (normalized, expressions)
}

fn restore_expressions(text: &str, expressions: &[String]) -> String {
    if expressions.is_empty() {
        return text.to_string();
    }
    EXPR_PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| expressions.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

fn block_attributes(attr_string: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for attr_caps in ATTR_REGEX.captures_iter(attr_string) {
        if let Some(name) = attr_caps.get(1) {
            let value = attr_caps
                .get(2)
                .or_else(|| attr_caps.get(3))
                .or_else(|| attr_caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "true".to_string());
            attributes.insert(name.as_str().to_ascii_lowercase(), value);
        }
    }
    attributes
}

struct ComponentBlocks {
    template: String,
    scripts: Vec<ScriptSource>,
    style: Option<Style>,
}

/// Pull instance scripts and style blocks out of component source.
fn split_component(path: &str, html: &str) -> Result<ComponentBlocks> {
    let mut scripts = Vec::new();
    let mut styles: Vec<String> = Vec::new();
    let mut mode = None;

    for caps in RAW_BLOCK_RE.captures_iter(html) {
        let attributes = block_attributes(caps.get(2).map_or("", |m| m.as_str()));
        let content = caps.get(3).map_or("", |m| m.as_str());
        if caps[1].eq_ignore_ascii_case("script") {
            match attributes.get("src") {
                Some(src) => scripts.push(ScriptSource::External(src.clone())),
                None if !content.trim().is_empty() => {
                    scripts.push(ScriptSource::Inline(content.trim().to_string()))
                }
                None => {}
            }
        } else {
            if let Some(value) = attributes.get("mode") {
                let parsed = StyleMode::parse(value).ok_or_else(|| PipelineError::InvalidDirective {
                    directive: "style",
                    path: path.to_string(),
                    reason: format!("unknown mode `{}`", value),
                })?;
                mode = Some(parsed);
            }
            if !content.trim().is_empty() {
                styles.push(content.trim().to_string());
            }
        }
    }

    Ok(ComponentBlocks {
        template: RAW_BLOCK_RE.replace_all(html, "").to_string(),
        scripts,
        style: if styles.is_empty() {
            None
        } else {
            Some(Style {
                text: styles.join("\n"),
                mode,
            })
        },
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML SYNTAX
// ═══════════════════════════════════════════════════════════════════════════════

/// Default parser and serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSyntax;

impl HtmlSyntax {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_document(&self, path: &str, html: &str) -> Result<Document> {
        let (normalized, expressions) = normalize_expressions(html);
        let normalized = expand_self_closing(&normalized);

        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut normalized.as_bytes())
            .map_err(|e| PipelineError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let mut builder = TreeBuilder {
            path,
            expressions: &expressions,
            document: Document::new(),
            // html5ever always synthesizes html/head/body; keep them only when
            // the source wrote them.
            keep_wrappers: html.to_ascii_lowercase().contains("<html"),
        };
        let root = builder.document.root();
        for child in dom.document.children.borrow().iter() {
            builder.convert(child, root)?;
        }
        Ok(builder.document)
    }
}

impl ResourceParser for HtmlSyntax {
    fn parse_fragment(&self, path: &str, text: &str) -> Result<Fragment> {
        Ok(Fragment::new(path, self.parse_document(path, text)?))
    }

    fn parse_component(&self, path: &str, text: &str) -> Result<Component> {
        let blocks = split_component(path, text)?;
        let mut component = Component::new(path, self.parse_document(path, &blocks.template)?);
        component.scripts = blocks.scripts;
        component.style = blocks.style;
        Ok(component)
    }
}

struct TreeBuilder<'a> {
    path: &'a str,
    expressions: &'a [String],
    document: Document,
    keep_wrappers: bool,
}

impl<'a> TreeBuilder<'a> {
    fn attach(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        let id = self.document.create(kind);
        self.document.append_child(parent, id)?;
        Ok(id)
    }

    fn convert(&mut self, handle: &Handle, parent: NodeId) -> Result<()> {
        match &handle.data {
            NodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.convert(child, parent)?;
                }
            }
            // Doctypes are emitted by page assembly.
            NodeData::Doctype { .. } => {}
            NodeData::Text { contents } => {
                let text = restore_expressions(&contents.borrow(), self.expressions);
                self.attach(parent, NodeKind::Text(text))?;
            }
            NodeData::Comment { contents } => {
                let text = restore_expressions(contents, self.expressions);
                self.attach(parent, NodeKind::Comment(text))?;
            }
            NodeData::ProcessingInstruction { target, contents } => {
                self.attach(
                    parent,
                    NodeKind::ProcessingInstruction {
                        target: target.to_string(),
                        data: contents.to_string(),
                    },
                )?;
            }
            NodeData::Element {
                name,
                attrs,
                template_contents,
                ..
            } => {
                let tag = name.local.to_string().to_ascii_lowercase();
                let children: Vec<Handle> = match template_contents.borrow().as_ref() {
                    Some(contents) => contents.children.borrow().iter().cloned().collect(),
                    None => handle.children.borrow().iter().cloned().collect(),
                };

                let is_wrapper = tag == "html" || tag == "head" || tag == "body";
                if is_wrapper && !self.keep_wrappers {
                    for child in &children {
                        self.convert(child, parent)?;
                    }
                    return Ok(());
                }

                let attributes: Attributes = attrs
                    .borrow()
                    .iter()
                    .map(|attr| {
                        (
                            attr.name.local.to_string(),
                            restore_expressions(&attr.value, self.expressions),
                        )
                    })
                    .collect();
                let kind = self.element_kind(tag, attributes)?;
                let id = self.attach(parent, kind)?;
                for child in &children {
                    self.convert(child, id)?;
                }
            }
        }
        Ok(())
    }

    fn required(&self, directive: &'static str, attributes: &mut Attributes, name: &str) -> Result<String> {
        match attributes.remove(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(PipelineError::InvalidDirective {
                directive,
                path: self.path.to_string(),
                reason: format!("missing `{}` attribute", name),
            }),
        }
    }

    fn element_kind(&self, tag: String, mut attributes: Attributes) -> Result<NodeKind> {
        let named = |attributes: &mut Attributes| {
            attributes
                .remove("name")
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SLOT.to_string())
        };
        Ok(match tag.as_str() {
            "fragment" => NodeKind::FragmentRef {
                src: self.required("fragment", &mut attributes, "src")?,
                attributes,
            },
            "component" => NodeKind::ComponentRef {
                src: self.required("component", &mut attributes, "src")?,
                attributes,
            },
            "slot" => NodeKind::Slot {
                name: named(&mut attributes),
                required: attributes.contains("required"),
            },
            "content" => NodeKind::Content {
                name: named(&mut attributes),
            },
            "var" => NodeKind::VarDecl { attributes },
            "import" => {
                let src = self.required("import", &mut attributes, "src")?;
                let alias = self.required("import", &mut attributes, "as")?;
                let target = match attributes.get("kind").map(str::to_ascii_lowercase).as_deref() {
                    None | Some("fragment") => ImportTarget::Fragment,
                    Some("component") => ImportTarget::Component,
                    Some(other) => {
                        return Err(PipelineError::InvalidDirective {
                            directive: "import",
                            path: self.path.to_string(),
                            reason: format!("unknown kind `{}`", other),
                        })
                    }
                };
                NodeKind::ImportDecl {
                    src,
                    alias: alias.to_ascii_lowercase(),
                    target,
                }
            }
            _ => NodeKind::Tag {
                name: tag,
                attributes,
            },
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn write_attributes<'i>(out: &mut String, attributes: impl Iterator<Item = (&'i str, &'i str)>) {
    for (name, value) in attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
}

impl HtmlSyntax {
    fn write_node(&self, document: &Document, id: NodeId, raw: bool, out: &mut String) {
        let children = |out: &mut String, raw: bool| {
            for &child in document.children(id) {
                self.write_node(document, child, raw, out);
            }
        };
        match document.kind(id) {
            NodeKind::Document => children(out, false),
            NodeKind::Text(text) if raw => out.push_str(text),
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Cdata(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            NodeKind::ProcessingInstruction { target, data } => {
                out.push_str("<?");
                out.push_str(target);
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
            NodeKind::Tag { name, attributes } => {
                out.push('<');
                out.push_str(name);
                write_attributes(out, attributes.iter());
                out.push('>');
                if is_void(name) {
                    return;
                }
                children(out, is_raw_text(name));
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            // Uncompiled directives serialize back to their markup form.
            directive => {
                let (tag, mut attrs): (&str, Vec<(String, String)>) = match directive {
                    NodeKind::FragmentRef { src, attributes } => (
                        "fragment",
                        std::iter::once(("src".to_string(), src.clone()))
                            .chain(attributes.iter().map(|(k, v)| (k.to_string(), v.to_string())))
                            .collect(),
                    ),
                    NodeKind::ComponentRef { src, attributes } => (
                        "component",
                        std::iter::once(("src".to_string(), src.clone()))
                            .chain(attributes.iter().map(|(k, v)| (k.to_string(), v.to_string())))
                            .collect(),
                    ),
                    NodeKind::Slot { name, .. } => ("slot", vec![("name".into(), name.clone())]),
                    NodeKind::Content { name } => ("content", vec![("name".into(), name.clone())]),
                    NodeKind::VarDecl { attributes } => (
                        "var",
                        attributes
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    ),
                    NodeKind::ImportDecl { src, alias, target } => (
                        "import",
                        vec![
                            ("src".into(), src.clone()),
                            ("as".into(), alias.clone()),
                            (
                                "kind".into(),
                                match target {
                                    ImportTarget::Fragment => "fragment".into(),
                                    ImportTarget::Component => "component".into(),
                                },
                            ),
                        ],
                    ),
                    _ => return,
                };
                if let NodeKind::Slot { required: true, .. } = directive {
                    attrs.push(("required".into(), String::new()));
                }
                out.push('<');
                out.push_str(tag);
                write_attributes(out, attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                out.push('>');
                children(out, false);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl Serializer for HtmlSyntax {
    fn serialize(&self, document: &Document) -> String {
        let mut out = String::new();
        self.write_node(document, document.root(), false, &mut out);
        out
    }
}
