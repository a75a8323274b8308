use std::path::Path;

use anyhow::{anyhow, Result};

use crate::detect::backend::Classifier;
use crate::detect::result::LabelSet;
use crate::frame::Frame;

/// Classifier that replays a fixed sequence of label sets.
///
/// Each `classify` call returns the next label set regardless of pixels.
/// Once the script runs out it returns empty label sets, unless built with
/// `cycling`, in which case it starts over.
pub struct ScriptedClassifier {
    script: Vec<LabelSet>,
    position: usize,
    cycle: bool,
    fail_load: bool,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<LabelSet>) -> Self {
        Self {
            script,
            position: 0,
            cycle: false,
            fail_load: false,
        }
    }

    /// Replay the script forever.
    pub fn cycling(script: Vec<LabelSet>) -> Self {
        Self {
            cycle: true,
            ..Self::new(script)
        }
    }

    /// Load a script from a JSON file: an array of label arrays, e.g.
    /// `[[{"class": "person"}, {"class": "bottle"}], []]`.
    pub fn from_json_file(path: &Path, cycle: bool) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read label script {}: {}", path.display(), e))?;
        let script: Vec<LabelSet> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid label script {}: {}", path.display(), e))?;
        Ok(if cycle {
            Self::cycling(script)
        } else {
            Self::new(script)
        })
    }

    /// Make `load` fail, as a model that never becomes available.
    pub fn with_load_failure(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Number of `classify` calls served so far.
    pub fn calls(&self) -> usize {
        self.position
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load(&mut self) -> Result<()> {
        if self.fail_load {
            return Err(anyhow!("scripted classifier configured to fail loading"));
        }
        Ok(())
    }

    fn classify(&mut self, _frame: &Frame) -> Result<LabelSet> {
        let labels = if self.script.is_empty() {
            LabelSet::default()
        } else if self.cycle {
            self.script[self.position % self.script.len()].clone()
        } else {
            self.script
                .get(self.position)
                .cloned()
                .unwrap_or_default()
        };
        self.position += 1;
        Ok(labels)
    }
}
