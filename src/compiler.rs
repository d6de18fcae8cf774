//! # Directive Compiler
//!
//! Depth-first rewrite of a cloned fragment tree. Directive nodes are resolved
//! and removed; text and attribute expressions are evaluated in place.
//!
//! ## Resolution Rules
//!
//! 1. **Declaration Order**: `<var>` bindings are visible to later siblings
//!    and their descendants only. Every child list compiles against its own
//!    copy of the scope.
//! 2. **Local Imports**: each compile starts with an empty import table.
//! 3. **Explicit Context**: a nested include sees its parameters and supplied
//!    content, never the caller's scope.
//! 4. **Compiled Once**: nested compile output and substituted slot content are
//!    already resolved and are not scanned again. Slot fallback children and
//!    alias-rewritten tags are.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::trace;

use crate::component::{Fragment, FragmentContext, ResolutionContext, DEFAULT_SLOT};
use crate::document::{Attributes, Document, ImportTarget, NodeId, NodeKind};
use crate::error::{PipelineError, Result};
use crate::parse::is_raw_text;
use crate::pipeline::Pipeline;
use crate::scope::{compose_scope, Scope};
use crate::static_eval::stringify;

#[derive(Debug, Clone)]
struct Import {
    src: String,
    target: ImportTarget,
}

/// Resolve every directive in `fragment` under `resolution`.
pub fn compile(
    pipeline: &mut Pipeline,
    mut fragment: Fragment,
    resolution: ResolutionContext<'_>,
) -> Result<Fragment> {
    check_unique_slots(&fragment)?;
    let mut compiler = DirectiveCompiler {
        pipeline,
        fragment: resolution.fragment,
        context: resolution.context,
        imports: HashMap::new(),
    };
    let root = fragment.document.root();
    compiler.compile_children(&mut fragment.document, root, &resolution.context.scope)?;
    Ok(fragment)
}

fn check_unique_slots(fragment: &Fragment) -> Result<()> {
    let mut seen = HashSet::new();
    for name in fragment.slot_names() {
        if !seen.insert(name.clone()) {
            return Err(PipelineError::DuplicateSlot {
                name,
                path: fragment.path.clone(),
            });
        }
    }
    Ok(())
}

struct DirectiveCompiler<'a> {
    pipeline: &'a mut Pipeline,
    fragment: &'a str,
    context: &'a FragmentContext,
    imports: HashMap<String, Import>,
}

impl<'a> DirectiveCompiler<'a> {
    fn compile_children(&mut self, doc: &mut Document, parent: NodeId, scope: &Scope) -> Result<()> {
        let mut scope = scope.clone();
        let mut index = 0;
        while let Some(&id) = doc.children(parent).get(index) {
            index += self.compile_node(doc, id, &mut scope)?;
        }
        Ok(())
    }

    /// Resolve the node at one position. Returns how many nodes now standing
    /// at that position are finished; zero means look at the position again.
    fn compile_node(&mut self, doc: &mut Document, id: NodeId, scope: &mut Scope) -> Result<usize> {
        match doc.kind(id).clone() {
            NodeKind::Tag { name, attributes } => {
                let lowered = name.to_ascii_lowercase();
                if let Some(import) = self.imports.get(&lowered) {
                    trace!(alias = %lowered, src = %import.src, "rewriting alias tag");
                    doc.set_kind(id, reference(import.target, lowered, attributes));
                    return Ok(0);
                }
                let attributes = self.interpolate_attributes(&attributes, scope)?;
                let raw = is_raw_text(&name);
                doc.set_kind(id, NodeKind::Tag { name, attributes });
                if !raw {
                    self.compile_children(doc, id, scope)?;
                }
                Ok(1)
            }
            NodeKind::Text(text) => {
                if self.pipeline.detect_expression(&text) {
                    let value = self.evaluate(&text, scope)?;
                    doc.set_kind(id, NodeKind::Text(stringify(&value)));
                }
                Ok(1)
            }
            NodeKind::ImportDecl { src, alias, target } => {
                trace!(alias = %alias, src = %src, "registering import");
                self.pipeline.preload(target, &src)?;
                self.imports.insert(alias.to_ascii_lowercase(), Import { src, target });
                doc.unwrap_node(id)?;
                Ok(0)
            }
            NodeKind::VarDecl { attributes } => {
                for (name, expression) in attributes.iter() {
                    let value = self.evaluate(expression, scope)?;
                    trace!(name, "declared variable");
                    scope.declare(name, value);
                }
                // Content an unterminated <var> swallowed becomes later siblings.
                doc.unwrap_node(id)?;
                Ok(0)
            }
            NodeKind::FragmentRef { src, attributes } => {
                self.include(doc, id, ImportTarget::Fragment, &src, &attributes, scope)
            }
            NodeKind::ComponentRef { src, attributes } => {
                self.include(doc, id, ImportTarget::Component, &src, &attributes, scope)
            }
            NodeKind::Slot { name, required } => self.fill_slot(doc, id, &name, required),
            NodeKind::Content { name } => Err(PipelineError::StrayContent {
                name,
                path: self.fragment.to_string(),
            }),
            NodeKind::Document
            | NodeKind::Comment(_)
            | NodeKind::Cdata(_)
            | NodeKind::ProcessingInstruction { .. } => Ok(1),
        }
    }

    fn evaluate(&mut self, text: &str, scope: &Scope) -> Result<Value> {
        let unit = self.pipeline.compile_expression(text)?;
        Ok(unit.invoke(scope)?)
    }

    fn interpolate_attributes(&mut self, attributes: &Attributes, scope: &Scope) -> Result<Attributes> {
        let mut out = Attributes::new();
        for (name, value) in attributes.iter() {
            if self.pipeline.detect_expression(value) {
                let evaluated = self.evaluate(value, scope)?;
                out.set(name, stringify(&evaluated));
            } else {
                out.set(name, value);
            }
        }
        Ok(out)
    }

    /// Reference attributes become parameters. A lone `{{ expr }}` keeps its
    /// value; anything else is a string.
    fn parameters(&mut self, attributes: &Attributes, scope: &Scope) -> Result<Map<String, Value>> {
        let mut params = Map::new();
        for (name, value) in attributes.iter() {
            let param = if self.pipeline.detect_expression(value) {
                self.evaluate(value, scope)?
            } else {
                Value::String(value.to_string())
            };
            params.insert(name.to_string(), param);
        }
        Ok(params)
    }

    fn include(
        &mut self,
        doc: &mut Document,
        id: NodeId,
        kind: ImportTarget,
        src: &str,
        attributes: &Attributes,
        scope: &Scope,
    ) -> Result<usize> {
        let (target, path) = match self.imports.get(&src.to_ascii_lowercase()) {
            Some(import) => (import.target, import.src.clone()),
            None => (kind, src.to_string()),
        };
        trace!(target = ?target, src = %path, from = %self.fragment, "resolving include");

        let params = self.parameters(attributes, scope)?;
        let slots = self.collect_content(doc, id, &path, scope)?;
        let context = FragmentContext {
            scope: compose_scope(&params, Scope::new()),
            params,
            slots,
        };
        let compiled = match target {
            ImportTarget::Fragment => self.pipeline.compile_fragment(&path, Some(&context))?,
            ImportTarget::Component => self.pipeline.compile_component(&path, &context)?,
        };
        splice(doc, id, &compiled.document)
    }

    /// Partition the children of a reference into named slot content, each
    /// compiled here in the caller's scope.
    fn collect_content(
        &mut self,
        doc: &mut Document,
        id: NodeId,
        target: &str,
        scope: &Scope,
    ) -> Result<HashMap<String, Document>> {
        let mut slots = HashMap::new();
        for child in doc.children(id).to_vec() {
            let NodeKind::Content { name } = doc.kind(child).clone() else {
                continue;
            };
            if slots.contains_key(&name) {
                return Err(PipelineError::DuplicateContent {
                    name,
                    target: target.to_string(),
                });
            }
            let mut content = doc.create_subtree_from_children(child)?;
            doc.detach(child)?;
            let root = content.root();
            self.compile_children(&mut content, root, scope)?;
            slots.insert(name, content);
        }

        let loose = doc
            .children(id)
            .iter()
            .any(|&child| !doc.kind(child).is_whitespace_text());
        if loose {
            if slots.contains_key(DEFAULT_SLOT) {
                return Err(PipelineError::DuplicateContent {
                    name: DEFAULT_SLOT.to_string(),
                    target: target.to_string(),
                });
            }
            let mut content = doc.create_subtree_from_children(id)?;
            let root = content.root();
            self.compile_children(&mut content, root, scope)?;
            slots.insert(DEFAULT_SLOT.to_string(), content);
        }
        Ok(slots)
    }

    fn fill_slot(&mut self, doc: &mut Document, id: NodeId, name: &str, required: bool) -> Result<usize> {
        let context = self.context;
        if let Some(content) = context.slots.get(name) {
            trace!(slot = name, fragment = %self.fragment, "substituting supplied content");
            return splice(doc, id, content);
        }
        let has_fallback = doc
            .children(id)
            .iter()
            .any(|&child| !doc.kind(child).is_whitespace_text());
        if required && !has_fallback {
            return Err(PipelineError::SlotResolution {
                name: name.to_string(),
                path: self.fragment.to_string(),
            });
        }
        doc.unwrap_node(id)?;
        Ok(0)
    }
}

fn reference(target: ImportTarget, src: String, attributes: Attributes) -> NodeKind {
    match target {
        ImportTarget::Fragment => NodeKind::FragmentRef { src, attributes },
        ImportTarget::Component => NodeKind::ComponentRef { src, attributes },
    }
}

/// Replace `id` with copies of the root children of `source`. Returns how many
/// nodes were inserted.
fn splice(doc: &mut Document, id: NodeId, source: &Document) -> Result<usize> {
    let inserted = doc.import_children(source, source.root())?;
    if inserted.is_empty() {
        doc.detach(id)?;
    } else {
        doc.replace_self(id, &inserted)?;
    }
    Ok(inserted.len())
}
