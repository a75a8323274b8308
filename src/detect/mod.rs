mod backend;
mod backends;
mod registry;
mod result;

pub use backend::Classifier;
pub use backends::ScriptedClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use registry::ClassifierRegistry;
pub use result::{Label, LabelSet};
