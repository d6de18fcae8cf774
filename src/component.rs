//! Fragments, components and the per-compile context handed to the compiler.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{Document, NodeKind};
use crate::scope::Scope;

/// Slot and content name used when none is given.
pub const DEFAULT_SLOT: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub path: String,
    pub document: Document,
}

impl Fragment {
    pub fn new(path: impl Into<String>, document: Document) -> Self {
        Self {
            path: path.into(),
            document,
        }
    }

    /// A compacted, fully independent deep copy.
    pub fn duplicate(&self) -> Self {
        Self {
            path: self.path.clone(),
            document: self.document.deep_clone(&mut |_, _| {}),
        }
    }

    /// Names of every slot declared anywhere in the fragment, in document order.
    pub fn slot_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.document.walk(self.document.root(), &mut |doc, id| {
            if let NodeKind::Slot { name, .. } = doc.kind(id) {
                names.push(name.clone());
            }
        });
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleMode {
    /// Emitted as a `<style>` block in the page head.
    #[default]
    Inline,
    /// Written out as a created stylesheet and referenced with `<link>`.
    Link,
}

impl StyleMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Some(StyleMode::Inline),
            "link" => Some(StyleMode::Link),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    pub text: String,
    /// `None` defers to the pipeline's configured default.
    pub mode: Option<StyleMode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    /// Path of a script resource, loaded through the store.
    External(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub path: String,
    pub template: Fragment,
    /// Instance script blocks in source order.
    pub scripts: Vec<ScriptSource>,
    pub style: Option<Style>,
}

impl Component {
    pub fn new(path: impl Into<String>, template: Document) -> Self {
        let path = path.into();
        Self {
            template: Fragment::new(path.clone(), template),
            path,
            scripts: Vec::new(),
            style: None,
        }
    }

    pub fn duplicate(&self) -> Self {
        Self {
            path: self.path.clone(),
            template: self.template.duplicate(),
            scripts: self.scripts.clone(),
            style: self.style.clone(),
        }
    }
}

/// What a single compile sees: caller-supplied slot content, parameters and
/// the scope expressions are evaluated against.
#[derive(Debug, Clone, Default)]
pub struct FragmentContext {
    pub slots: HashMap<String, Document>,
    pub params: Map<String, Value>,
    pub scope: Scope,
}

impl FragmentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose scope is exactly `params`.
    pub fn with_params(params: Map<String, Value>) -> Self {
        Self {
            scope: crate::scope::compose_scope(&params, Scope::new()),
            params,
            slots: HashMap::new(),
        }
    }

    pub fn with_slot(mut self, name: impl Into<String>, content: Document) -> Self {
        self.slots.insert(name.into(), content);
        self
    }
}

/// The fragment being compiled and the context it is compiled under.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub fragment: &'a str,
    pub context: &'a FragmentContext,
}
