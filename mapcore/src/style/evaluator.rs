use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;

use crate::style::{
    expr::{Env, Expr, LAYER_BINDING},
    technique::{Technique, TechniqueAttributes, TechniqueKind},
    StyleError,
};

/// A rule of a style set. A rule matches a feature if its `layer` equals the feature layer and
/// its `when` condition evaluates truthy.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRule {
    #[serde(default)]
    pub when: Option<Expr>,
    pub technique: TechniqueKind,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub render_order: i32,
    #[serde(default)]
    pub kind: Option<String>,
    /// Stops the evaluation of the following rules once this rule matched.
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub attr: TechniqueAttributes,
}

impl StyleRule {
    fn matches(&self, env: &Env) -> bool {
        if let Some(layer) = &self.layer {
            let feature_layer = env.lookup(LAYER_BINDING).and_then(|v| v.as_str());
            if feature_layer != Some(layer.as_str()) {
                return false;
            }
        }
        self.when
            .as_ref()
            .map_or(true, |when| when.evaluate(env).is_truthy())
    }
}

/// An ordered list of style rules.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct StyleSet {
    rules: Vec<StyleRule>,
}

impl StyleSet {
    pub fn new(rules: Vec<StyleRule>) -> Self {
        Self { rules }
    }

    pub fn from_json(json: &str) -> Result<Self, StyleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }
}

/// Matches features against a [`StyleSet`] and keeps the catalog of techniques produced during
/// one decode.
pub struct StyleSetEvaluator {
    style_set: Arc<StyleSet>,
    techniques: Vec<Arc<Technique>>,
    technique_keys: HashMap<String, usize>,
}

impl StyleSetEvaluator {
    pub fn new(style_set: Arc<StyleSet>) -> Self {
        Self {
            style_set,
            techniques: Vec::new(),
            technique_keys: HashMap::new(),
        }
    }

    /// Returns the techniques of all rules which match `env`, in rule order.
    ///
    /// Rules which resolve to the same attributes share one technique, so the `index` of a
    /// technique identifies it within this evaluator.
    pub fn get_matching_techniques(&mut self, env: &Env) -> Vec<Arc<Technique>> {
        let style_set = self.style_set.clone();
        let mut result = Vec::new();
        for (rule_index, rule) in style_set.rules().iter().enumerate() {
            if !rule.matches(env) {
                continue;
            }

            let attrs = rule.attr.resolve(env);
            let key = format!("{rule_index}:{attrs:?}");
            let technique = match self.technique_keys.get(&key) {
                Some(index) => self.techniques[*index].clone(),
                None => {
                    let index = self.techniques.len();
                    let technique = Arc::new(Technique {
                        index,
                        name: rule.technique,
                        render_order: rule.render_order,
                        kind: rule.kind.clone(),
                        attrs,
                    });
                    self.technique_keys.insert(key, index);
                    self.techniques.push(technique.clone());
                    technique
                }
            };
            result.push(technique);

            if rule.is_final {
                break;
            }
        }
        result
    }

    pub fn technique(&self, index: usize) -> Option<&Arc<Technique>> {
        self.techniques.get(index)
    }

    pub fn techniques(&self) -> &[Arc<Technique>] {
        &self.techniques
    }

    pub fn into_techniques(self) -> Vec<Arc<Technique>> {
        self.techniques
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::style::{
        evaluator::{StyleSet, StyleSetEvaluator},
        expr::{AttributeMap, Env, Value, LAYER_BINDING},
        technique::TechniqueKind,
    };

    const STYLE: &str = r##"[
        { "layer": "roads", "when": ["==", ["get", "kind"], "highway"],
          "technique": "solid-line", "renderOrder": 10,
          "attr": { "color": "#ff8800", "lineWidth": 20 } },
        { "layer": "roads", "technique": "line", "renderOrder": 5,
          "attr": { "color": ["match", ["get", "kind"], "path", "#999999", "#555555"] } },
        { "layer": "roads", "technique": "text", "final": true,
          "attr": { "text": ["get", "name"] } },
        { "layer": "roads", "technique": "line" }
    ]"##;

    fn env(layer: &str, kind: &str) -> Env {
        let mut entries = AttributeMap::new();
        entries.insert(LAYER_BINDING.to_owned(), Value::from(layer));
        entries.insert("kind".to_owned(), Value::from(kind));
        Env::new(entries)
    }

    #[test]
    fn matches_in_rule_order() {
        let style_set = Arc::new(StyleSet::from_json(STYLE).unwrap());
        let mut evaluator = StyleSetEvaluator::new(style_set);

        let techniques = evaluator.get_matching_techniques(&env("roads", "highway"));
        let names: Vec<_> = techniques.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                TechniqueKind::SolidLine,
                TechniqueKind::Line,
                TechniqueKind::Text
            ]
        );
        assert_eq!(techniques[0].render_order, 10);

        assert!(evaluator
            .get_matching_techniques(&env("water", "highway"))
            .is_empty());
    }

    #[test]
    fn indices_are_unique_and_shared() {
        let style_set = Arc::new(StyleSet::from_json(STYLE).unwrap());
        let mut evaluator = StyleSetEvaluator::new(style_set);

        let first = evaluator.get_matching_techniques(&env("roads", "path"));
        let second = evaluator.get_matching_techniques(&env("roads", "path"));
        let other = evaluator.get_matching_techniques(&env("roads", "residential"));

        assert!(Arc::ptr_eq(&first[0], &second[0]));
        // Differently resolved colors result in distinct techniques.
        assert_ne!(first[0].index, other[0].index);
        // The text technique is shared, its text is evaluated per feature.
        assert_eq!(first[1].index, other[1].index);

        let mut indices: Vec<_> = evaluator.techniques().iter().map(|t| t.index).collect();
        indices.dedup();
        assert_eq!(indices, (0..evaluator.techniques().len()).collect::<Vec<_>>());
    }

    #[test]
    fn invalid_style_is_an_error() {
        assert!(StyleSet::from_json(r#"[{ "technique": "spaceship" }]"#).is_err());
        assert!(StyleSet::from_json(r#"[{ "technique": "fill", "when": ["nope"] }]"#).is_err());
    }
}
