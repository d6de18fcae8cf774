//! Evaluation scope: an ordered stack of named layers.
//!
//! Lookups walk the layers from the top down, so a later layer shadows an
//! earlier one. A compiled fragment sees only the layers its context carries;
//! nothing is inherited implicitly from the caller.

use serde_json::{Map, Value};

pub const PARAMS: &str = "params";
pub const INSTANCE: &str = "instance";
pub const LOCALS: &str = "locals";
pub const CONTEXT: &str = "context";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopeLayer {
    pub name: String,
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scope {
    layers: Vec<ScopeLayer>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, name: &str, values: Map<String, Value>) -> Self {
        self.push_layer(name, values);
        self
    }

    pub fn push_layer(&mut self, name: &str, values: Map<String, Value>) {
        self.layers.push(ScopeLayer {
            name: name.to_string(),
            values,
        });
    }

    pub fn layers(&self) -> &[ScopeLayer] {
        &self.layers
    }

    /// Topmost layer with the given name.
    pub fn layer(&self, name: &str) -> Option<&ScopeLayer> {
        self.layers.iter().rev().find(|l| l.name == name)
    }

    pub fn lookup(&self, ident: &str) -> Option<&Value> {
        self.layers.iter().rev().find_map(|l| l.values.get(ident))
    }

    pub fn contains(&self, ident: &str) -> bool {
        self.lookup(ident).is_some()
    }

    /// Bind `ident` in the top `locals` layer, opening one if the top layer is
    /// something else.
    pub fn declare(&mut self, ident: impl Into<String>, value: Value) {
        let needs_layer = self.layers.last().map_or(true, |l| l.name != LOCALS);
        if needs_layer {
            self.push_layer(LOCALS, Map::new());
        }
        if let Some(top) = self.layers.last_mut() {
            top.values.insert(ident.into(), value);
        }
    }

    /// Overwrite the topmost existing binding of `ident`. Returns false when
    /// `ident` is not bound anywhere.
    pub fn assign(&mut self, ident: &str, value: Value) -> bool {
        match self
            .layers
            .iter_mut()
            .rev()
            .find(|l| l.values.contains_key(ident))
        {
            Some(layer) => {
                layer.values.insert(ident.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// All visible bindings with precedence applied.
    pub fn flatten(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for layer in &self.layers {
            for (k, v) in &layer.values {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.values.is_empty())
    }
}

/// Layer `overlay` on top of the parameter mapping `base`; overlay keys win.
pub fn compose_scope(base: &Map<String, Value>, overlay: Scope) -> Scope {
    let mut scope = Scope::new().with_layer(PARAMS, base.clone());
    scope.layers.extend(overlay.layers);
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn overlay_takes_precedence() {
        let params = map(json!({"title": "param", "only_param": 1}));
        let overlay = Scope::new().with_layer(INSTANCE, map(json!({"title": "instance"})));
        let scope = compose_scope(&params, overlay);

        assert_eq!(scope.lookup("title"), Some(&json!("instance")));
        assert_eq!(scope.lookup("only_param"), Some(&json!(1)));
        assert_eq!(scope.layers()[0].name, PARAMS);
        assert_eq!(scope.flatten().get("title"), Some(&json!("instance")));
    }

    #[test]
    fn declare_opens_a_locals_layer_once() {
        let mut scope = Scope::new().with_layer(PARAMS, map(json!({"x": 1})));
        scope.declare("x", json!(2));
        scope.declare("y", json!(3));
        assert_eq!(scope.layers().len(), 2);
        assert_eq!(scope.lookup("x"), Some(&json!(2)));
        assert_eq!(scope.layer(PARAMS).unwrap().values.get("x"), Some(&json!(1)));
    }

    #[test]
    fn assign_updates_the_visible_binding() {
        let mut scope = Scope::new().with_layer(PARAMS, map(json!({"n": 1})));
        assert!(scope.assign("n", json!(5)));
        assert!(!scope.assign("missing", json!(0)));
        assert_eq!(scope.lookup("n"), Some(&json!(5)));
    }
}
