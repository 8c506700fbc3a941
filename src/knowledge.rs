//! Disease vocabulary and treatment lookup.
//!
//! The vocabulary order is the classifier's output order: index `i` of the
//! probability vector scores `labels[i]`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{ensure, Context};
use serde::Deserialize;

/// Returned when a label has no treatment entry.
pub const NO_RECOMMENDATION: &str = "No recommendation found";

pub const NUM_CLASSES: usize = 38;

const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Apple___scab",
    "Apple___Black_rot",
    "Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry_(including_sour)___Powdery_mildew",
    "Cherry_(including_sour)___healthy",
    "Corn_(maize)___Cercospora Gray_leaf_spot",
    "Corn_(maize)___Common_rust_",
    "Corn_(maize)___Northern_Leaf_Blight",
    "Corn_(maize)___healthy",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___healthy",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Raspberry___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___Leaf_scorch",
    "Strawberry___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites",
    "Tomato___Target_Spot",
    "Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato_mosaic_virus",
    "Tomato___healthy",
];

const TREATMENTS: [(&str, &str); NUM_CLASSES] = [
    ("Apple___scab", "Captan 50% WP spray"),
    ("Apple___Black_rot", "Copper-based fungicides"),
    ("Cedar_apple_rust", "Myclobutanil fungicide"),
    ("Apple___healthy", "No treatment needed"),
    ("Blueberry___healthy", "No treatment needed"),
    ("Cherry_(including_sour)___Powdery_mildew", "Sulfur-based fungicide"),
    ("Cherry_(including_sour)___healthy", "No treatment needed"),
    ("Corn_(maize)___Cercospora Gray_leaf_spot", "Azoxystrobin spray"),
    ("Corn_(maize)___Common_rust_", "Fungicide with tebuconazole"),
    ("Corn_(maize)___Northern_Leaf_Blight", "Trifloxystrobin spray"),
    ("Corn_(maize)___healthy", "No treatment needed"),
    ("Grape___Black_rot", "Mancozeb or Ziram"),
    ("Grape___Esca_(Black_Measles)", "Remove infected vines"),
    ("Grape___Leaf_blight_(Isariopsis_Leaf_Spot)", "Copper fungicide spray"),
    ("Grape___healthy", "No treatment needed"),
    ("Orange___Haunglongbing_(Citrus_greening)", "No cure, remove infected trees"),
    ("Peach___Bacterial_spot", "Oxytetracycline spray"),
    ("Peach___healthy", "No treatment needed"),
    ("Pepper,_bell___Bacterial_spot", "Copper fungicide spray"),
    ("Pepper,_bell___healthy", "No treatment needed"),
    ("Potato___Early_blight", "Chlorothalonil fungicide"),
    ("Potato___Late_blight", "Mancozeb 75% WP every 7 days"),
    ("Potato___healthy", "No treatment needed"),
    ("Raspberry___healthy", "No treatment needed"),
    ("Soybean___healthy", "No treatment needed"),
    ("Squash___Powdery_mildew", "Neem oil or sulfur-based sprays"),
    ("Strawberry___Leaf_scorch", "Use certified disease-free plants"),
    ("Strawberry___healthy", "No treatment needed"),
    ("Tomato___Bacterial_spot", "Copper-based fungicide"),
    ("Tomato___Early_blight", "Chlorothalonil spray"),
    ("Tomato___Late_blight", "Mancozeb fungicide weekly"),
    ("Tomato___Leaf_Mold", "Copper spray or baking soda solution"),
    ("Tomato___Septoria_leaf_spot", "Fungicide like chlorothalonil"),
    ("Tomato___Spider_mites", "Insecticidal soap or neem oil"),
    ("Tomato___Target_Spot", "Azoxystrobin fungicide"),
    ("Tomato_Yellow_Leaf_Curl_Virus", "No cure, use resistant seeds"),
    ("Tomato_mosaic_virus", "Remove infected plants, clean tools"),
    ("Tomato___healthy", "No treatment needed"),
];

/// On-disk layout accepted by [`KnowledgeBase::from_json_file`].
#[derive(Debug, Deserialize)]
struct KnowledgeBaseFile {
    labels: Vec<String>,
    #[serde(default)]
    treatments: HashMap<String, String>,
}

/// Ordered label vocabulary plus label -> treatment mapping.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    labels: Vec<String>,
    treatments: HashMap<String, String>,
}

impl KnowledgeBase {
    /// Builds a knowledge base, rejecting empty or duplicated vocabularies.
    pub fn new(labels: Vec<String>, treatments: HashMap<String, String>) -> anyhow::Result<Self> {
        ensure!(!labels.is_empty(), "label vocabulary is empty");

        let mut seen = std::collections::HashSet::with_capacity(labels.len());
        for label in &labels {
            ensure!(seen.insert(label.as_str()), "duplicate label {label:?}");
        }

        Ok(Self { labels, treatments })
    }

    /// The 38-class PlantVillage vocabulary the bundled model was trained on.
    pub fn builtin() -> Self {
        Self {
            labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            treatments: TREATMENTS
                .iter()
                .map(|(label, treatment)| (label.to_string(), treatment.to_string()))
                .collect(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading knowledge base {}", path.display()))?;
        let file: KnowledgeBaseFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing knowledge base {}", path.display()))?;

        Self::new(file.labels, file.treatments)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Treatment for `label`, or [`NO_RECOMMENDATION`] when none is recorded.
    pub fn recommendation(&self, label: &str) -> &str {
        self.treatments
            .get(label)
            .map(String::as_str)
            .unwrap_or(NO_RECOMMENDATION)
    }

    /// Vocabulary entries without a treatment entry.
    pub fn missing_treatments(&self) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|label| !self.treatments.contains_key(label.as_str()))
            .map(String::as_str)
            .collect()
    }
}
