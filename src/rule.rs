//! Capture rule.
//!
//! The rule fires when one label set holds a person AND at least one
//! handheld/disposable object. This is a heuristic standing in for real
//! littering-action detection: a person simply holding a cup fires it too.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};

use crate::detect::LabelSet;

pub const DEFAULT_PERSON_CLASS: &str = "person";
pub const DEFAULT_OBJECT_CLASSES: [&str; 5] = ["bottle", "cup", "fork", "knife", "spoon"];

#[derive(Clone, Debug)]
pub struct CaptureRule {
    person_class: String,
    object_classes: BTreeSet<String>,
    min_confidence: f32,
}

impl CaptureRule {
    pub fn new<I, S>(person_class: &str, object_classes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let person_class = person_class.trim();
        if person_class.is_empty() {
            return Err(anyhow!("capture rule needs a person class"));
        }
        let object_classes: BTreeSet<String> = object_classes
            .into_iter()
            .map(|class| {
                let class: String = class.into();
                class.trim().to_string()
            })
            .filter(|class| !class.is_empty())
            .collect();
        if object_classes.is_empty() {
            return Err(anyhow!("capture rule needs at least one object class"));
        }
        if object_classes.contains(person_class) {
            return Err(anyhow!(
                "object classes must not include the person class '{}'",
                person_class
            ));
        }
        Ok(Self {
            person_class: person_class.to_string(),
            object_classes,
            min_confidence: 0.0,
        })
    }

    /// Ignore labels scoring below `min_confidence`.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(anyhow!(
                "min_confidence must be within 0..=1, got {}",
                min_confidence
            ));
        }
        self.min_confidence = min_confidence;
        Ok(self)
    }

    pub fn person_class(&self) -> &str {
        &self.person_class
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &str> {
        self.object_classes.iter().map(String::as_str)
    }

    /// First qualifying object class when the rule fires, `None` otherwise.
    pub fn matched_object<'a>(&self, labels: &'a LabelSet) -> Option<&'a str> {
        let mut person = false;
        let mut object = None;
        for label in labels.iter() {
            if label.confidence < self.min_confidence {
                continue;
            }
            if label.class == self.person_class {
                person = true;
            } else if object.is_none() && self.object_classes.contains(&label.class) {
                object = Some(label.class.as_str());
            }
        }
        if person {
            object
        } else {
            None
        }
    }

    pub fn fires(&self, labels: &LabelSet) -> bool {
        self.matched_object(labels).is_some()
    }
}

impl Default for CaptureRule {
    fn default() -> Self {
        Self {
            person_class: DEFAULT_PERSON_CLASS.to_string(),
            object_classes: DEFAULT_OBJECT_CLASSES
                .iter()
                .map(|class| class.to_string())
                .collect(),
            min_confidence: 0.0,
        }
    }
}
