//! Native evaluator for gradient-boosted tree ensembles saved in the
//! booster's model format, either as JSON or as its UBJSON binary encoding.
//!
//! Only the binary logistic objective is supported. Traversal mirrors the
//! reference implementation: inputs are compared as `f32`, `x < condition`
//! goes left, a NaN input follows the node's default direction, and the
//! margin is accumulated tree by tree in file order, so the output is
//! bit-reproducible.

use super::Classifier;
use crate::error::{InferenceError, LoadError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ModelDocument {
    learner: LearnerDocument,
}

#[derive(Debug, Deserialize)]
struct LearnerDocument {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: BoosterDocument,
    learner_model_param: LearnerParams,
    objective: ObjectiveDocument,
}

#[derive(Debug, Deserialize)]
struct BoosterDocument {
    model: ForestDocument,
}

#[derive(Debug, Deserialize)]
struct ForestDocument {
    trees: Vec<TreeDocument>,
}

#[derive(Debug, Deserialize)]
struct LearnerParams {
    base_score: String,
    #[serde(default)]
    num_feature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectiveDocument {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
}

/// Older dumps store `default_left` as 0/1, newer ones as booleans.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: i32,
    right: i32,
    split_index: u32,
    /// Split threshold for internal nodes, leaf value for leaves
    condition: f32,
    default_left: bool,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_document(index: usize, doc: TreeDocument) -> Result<Self, LoadError> {
        let n = doc.left_children.len();
        if n == 0
            || doc.right_children.len() != n
            || doc.split_indices.len() != n
            || doc.split_conditions.len() != n
            || doc.default_left.len() != n
        {
            return Err(LoadError::CorruptModel(format!(
                "tree {} has inconsistent node arrays",
                index
            )));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let node = Node {
                left: doc.left_children[i],
                right: doc.right_children[i],
                split_index: doc.split_indices[i],
                condition: doc.split_conditions[i],
                default_left: doc.default_left[i].is_set(),
            };

            // Children always come after their parent, which also rules out cycles.
            if node.left != -1 {
                let valid = |child: i32| child > i as i32 && (child as usize) < n;
                if !valid(node.left) || !valid(node.right) {
                    return Err(LoadError::CorruptModel(format!(
                        "tree {} node {} has invalid children",
                        index, i
                    )));
                }
            }
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut i = 0usize;
        loop {
            let node = &self.nodes[i];
            if node.left == -1 {
                return node.condition;
            }
            let x = features
                .get(node.split_index as usize)
                .copied()
                .unwrap_or(f32::NAN);
            let go_left = if x.is_nan() {
                node.default_left
            } else {
                x < node.condition
            };
            let next = if go_left { node.left } else { node.right };
            i = next as usize;
        }
    }
}

/// Tree ensemble with a logistic output transform
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    trees: Vec<Tree>,
    base_margin: f32,
    num_features: Option<usize>,
    feature_names: Vec<String>,
}

impl TreeEnsemble {
    pub fn from_json(bytes: &[u8]) -> Result<Self, LoadError> {
        let doc: ModelDocument =
            serde_json::from_slice(bytes).map_err(|e| LoadError::CorruptModel(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Binary model save (`.ubj`), same document as the JSON form
    pub fn from_ubjson(bytes: &[u8]) -> Result<Self, LoadError> {
        let value = super::ubjson::decode(bytes)?;
        let doc: ModelDocument =
            serde_json::from_value(value).map_err(|e| LoadError::CorruptModel(e.to_string()))?;
        Self::from_document(doc)
    }

    fn from_document(doc: ModelDocument) -> Result<Self, LoadError> {
        let learner = doc.learner;

        match learner.objective.name.as_str() {
            "binary:logistic" | "reg:logistic" => {}
            other => {
                return Err(LoadError::UnsupportedFormat(format!("objective '{}'", other)));
            }
        }

        let base_score = parse_param(&learner.learner_model_param.base_score)
            .filter(|b| *b > 0.0 && *b < 1.0)
            .ok_or_else(|| {
                LoadError::CorruptModel(format!(
                    "invalid base_score '{}'",
                    learner.learner_model_param.base_score
                ))
            })?;

        let num_features = learner
            .learner_model_param
            .num_feature
            .as_deref()
            .and_then(parse_param)
            .map(|n| n as usize)
            .filter(|n| *n > 0);

        let trees = learner
            .gradient_booster
            .model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_document(i, t))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            base_margin: (base_score / (1.0 - base_score)).ln(),
            num_features,
            feature_names: learner.feature_names,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Feature names recorded by the trainer, if any
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Raw margin before the logistic transform
    pub fn margin(&self, features: &[f32]) -> f32 {
        self.trees
            .iter()
            .fold(self.base_margin, |acc, tree| acc + tree.leaf_value(features))
    }
}

impl Classifier for TreeEnsemble {
    fn predict_proba(&self, features: &[f32]) -> Result<f64, InferenceError> {
        if let Some(expected) = self.num_features {
            if features.len() != expected {
                return Err(InferenceError::ShapeMismatch {
                    expected,
                    actual: features.len(),
                });
            }
        }
        let margin = self.margin(features) as f64;
        Ok(1.0 / (1.0 + (-margin).exp()))
    }

    fn expected_features(&self) -> Option<usize> {
        self.num_features
    }

    fn backend(&self) -> &'static str {
        "tree_ensemble"
    }
}

/// Scalar params are stored as strings, sometimes wrapped in brackets
/// (`"5E-1"`, `"[5E-1]"`).
fn parse_param(raw: &str) -> Option<f32> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .parse()
        .ok()
}
