//! Speech emotion classifier: a standard scaler followed by an SVM, both
//! loaded from a JSON export of the trained scikit-learn estimators.
//!
//! Export layout (attribute names follow scikit-learn):
//!
//! ```json
//! {
//!   "classes": ["angry", "calm", ...],
//!   "scaler": { "mean": [...], "scale": [...] },
//!   "svm": { "kernel": "rbf", "gamma": 0.025, "support_vectors": [[...]],
//!            "dual_coef": [[...]], "intercept": [...], "n_support": [...] }
//! }
//! ```
//!
//! A linear model is `{ "kernel": "linear", "coef": [[...]], "intercept": [...] }`
//! with one row per class (one-vs-rest) or a single row for two classes.

use super::EmotionError;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

pub trait SpeechEmotionModel: Send + Sync {
    /// Classifies a time-averaged MFCC vector.
    fn classify(&self, features: &[f32]) -> Result<String, EmotionError>;
}

#[derive(Deserialize, Debug)]
struct Scaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "kernel", rename_all = "lowercase")]
enum Svm {
    Linear {
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    },
    Rbf {
        gamma: f32,
        support_vectors: Vec<Vec<f32>>,
        dual_coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
        n_support: Vec<usize>,
    },
}

#[derive(Deserialize, Debug)]
pub struct SvmSpeechModel {
    classes: Vec<String>,
    scaler: Scaler,
    svm: Svm,
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn rbf(gamma: f32, a: &[f32], b: &[f32]) -> f32 {
    let squared: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * squared).exp()
}

impl SvmSpeechModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read speech model {:?}", path))?;
        Self::from_json(&content).with_context(|| format!("Invalid speech model {:?}", path))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let model: SvmSpeechModel = serde_json::from_str(content)?;
        model.validate()?;
        Ok(model)
    }

    pub fn n_features(&self) -> usize {
        self.scaler.mean.len()
    }

    fn validate(&self) -> Result<()> {
        let n_classes = self.classes.len();
        let n_features = self.n_features();
        if n_classes < 2 {
            bail!("At least two classes are required");
        }
        if self.scaler.scale.len() != n_features {
            bail!("Scaler mean and scale lengths differ");
        }
        match &self.svm {
            Svm::Linear { coef, intercept } => {
                let rows = if n_classes == 2 { 1 } else { n_classes };
                if coef.len() != rows || intercept.len() != rows {
                    bail!("Expected {} linear decision functions", rows);
                }
                if coef.iter().any(|row| row.len() != n_features) {
                    bail!("Linear coefficients do not match {} features", n_features);
                }
            }
            Svm::Rbf {
                support_vectors,
                dual_coef,
                intercept,
                n_support,
                ..
            } => {
                if n_support.len() != n_classes {
                    bail!("n_support must have one entry per class");
                }
                let total: usize = n_support.iter().sum();
                if support_vectors.len() != total
                    || support_vectors.iter().any(|sv| sv.len() != n_features)
                {
                    bail!("Support vectors do not match n_support/features");
                }
                if dual_coef.len() != n_classes - 1 || dual_coef.iter().any(|r| r.len() != total)
                {
                    bail!("dual_coef must be (n_classes - 1) x n_support_vectors");
                }
                if intercept.len() != n_classes * (n_classes - 1) / 2 {
                    bail!("Expected one intercept per class pair");
                }
            }
        }
        Ok(())
    }

    fn standardize(&self, features: &[f32]) -> Vec<f32> {
        features
            .iter()
            .zip(self.scaler.mean.iter().zip(&self.scaler.scale))
            .map(|(x, (mean, scale))| {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect()
    }

    fn predict_index(&self, x: &[f32]) -> usize {
        let n_classes = self.classes.len();
        match &self.svm {
            Svm::Linear { coef, intercept } => {
                if n_classes == 2 {
                    return usize::from(dot(&coef[0], x) + intercept[0] > 0.0);
                }
                coef.iter()
                    .zip(intercept)
                    .map(|(row, b)| dot(row, x) + b)
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, score)| {
                        if score > best.1 {
                            (i, score)
                        } else {
                            best
                        }
                    })
                    .0
            }
            Svm::Rbf {
                gamma,
                support_vectors,
                dual_coef,
                intercept,
                n_support,
            } => {
                let kernel: Vec<f32> = support_vectors.iter().map(|sv| rbf(*gamma, sv, x)).collect();
                let mut starts = Vec::with_capacity(n_classes);
                let mut offset = 0;
                for count in n_support {
                    starts.push(offset);
                    offset += count;
                }

                let mut votes = vec![0usize; n_classes];
                let mut pair = 0;
                for i in 0..n_classes {
                    for j in (i + 1)..n_classes {
                        let class_i = starts[i]..starts[i] + n_support[i];
                        let class_j = starts[j]..starts[j] + n_support[j];
                        let decision: f32 = class_i
                            .map(|s| dual_coef[j - 1][s] * kernel[s])
                            .chain(class_j.map(|s| dual_coef[i][s] * kernel[s]))
                            .sum::<f32>()
                            + intercept[pair];
                        if n_classes == 2 {
                            // binary exports carry negated coefficients
                            return usize::from(decision > 0.0);
                        }
                        if decision > 0.0 {
                            votes[i] += 1;
                        } else {
                            votes[j] += 1;
                        }
                        pair += 1;
                    }
                }
                // ties go to the lowest class index
                votes
                    .iter()
                    .enumerate()
                    .fold((0, 0), |best, (i, v)| if *v > best.1 { (i, *v) } else { best })
                    .0
            }
        }
    }
}

impl SpeechEmotionModel for SvmSpeechModel {
    fn classify(&self, features: &[f32]) -> Result<String, EmotionError> {
        if features.len() != self.n_features() {
            return Err(EmotionError::InvalidInput(format!(
                "expected {} features, got {}",
                self.n_features(),
                features.len()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(EmotionError::InvalidInput("non-finite features".to_string()));
        }
        let x = self.standardize(features);
        Ok(self.classes[self.predict_index(&x)].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LINEAR_3: &str = r#"{
        "classes": ["calm", "angry", "sad"],
        "scaler": {"mean": [1.0, 1.0], "scale": [2.0, 0.0]},
        "svm": {"kernel": "linear",
                "coef": [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
                "intercept": [0.5, 0.0, 0.0]}
    }"#;

    const RBF_3: &str = r#"{
        "classes": ["a", "b", "c"],
        "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
        "svm": {"kernel": "rbf", "gamma": 1.0,
                "support_vectors": [[0.0, 0.0], [5.0, 0.0], [0.0, 5.0]],
                "n_support": [1, 1, 1],
                "dual_coef": [[1.0, -1.0, -1.0], [1.0, 1.0, -1.0]],
                "intercept": [0.0, 0.0, 0.0]}
    }"#;

    #[test]
    fn linear_one_vs_rest_picks_highest_score() {
        let model = SvmSpeechModel::from_json(LINEAR_3).unwrap();
        // standardized: ((x - 1) / 2, y - 1)
        assert_eq!(model.classify(&[1.0, 1.0]).unwrap(), "calm");
        assert_eq!(model.classify(&[5.0, 1.0]).unwrap(), "angry");
        assert_eq!(model.classify(&[1.0, 3.0]).unwrap(), "sad");
    }

    #[test]
    fn linear_binary_uses_sign() {
        let model = SvmSpeechModel::from_json(
            r#"{"classes": ["neutral", "happy"],
                "scaler": {"mean": [0.0], "scale": [1.0]},
                "svm": {"kernel": "linear", "coef": [[1.0]], "intercept": [-1.0]}}"#,
        )
        .unwrap();
        assert_eq!(model.classify(&[0.5]).unwrap(), "neutral");
        assert_eq!(model.classify(&[1.5]).unwrap(), "happy");
    }

    #[test]
    fn rbf_one_vs_one_votes() {
        let model = SvmSpeechModel::from_json(RBF_3).unwrap();
        assert_eq!(model.classify(&[0.1, 0.0]).unwrap(), "a");
        assert_eq!(model.classify(&[5.0, 0.2]).unwrap(), "b");
        assert_eq!(model.classify(&[0.0, 4.9]).unwrap(), "c");
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let model = SvmSpeechModel::from_json(LINEAR_3).unwrap();
        assert!(matches!(
            model.classify(&[1.0; 40]),
            Err(EmotionError::InvalidInput(_))
        ));
        assert!(model.classify(&[f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn rejects_inconsistent_exports() {
        let bad = LINEAR_3.replace("\"intercept\": [0.5, 0.0, 0.0]", "\"intercept\": [0.5]");
        assert!(SvmSpeechModel::from_json(&bad).is_err());

        let bad = RBF_3.replace("\"n_support\": [1, 1, 1]", "\"n_support\": [2, 1, 1]");
        assert!(SvmSpeechModel::from_json(&bad).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RBF_3.as_bytes()).unwrap();

        let model = SvmSpeechModel::load(file.path()).unwrap();
        assert_eq!(model.n_features(), 2);
        assert!(SvmSpeechModel::load("/nonexistent/model.json").is_err());
    }
}
