use anyhow::Result;

use crate::detect::result::LabelSet;
use crate::frame::Frame;

/// Object classifier capability.
///
/// The model is opaque to the loop: load it once, then classify frames.
/// Implementations must treat the frame as read-only and ephemeral; pixels
/// may not be kept past the `classify` call.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// One-time model load. Called before the first `classify`.
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run inference on one frame.
    fn classify(&mut self, frame: &Frame) -> Result<LabelSet>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn load(&mut self) -> Result<()> {
        (**self).load()
    }

    fn classify(&mut self, frame: &Frame) -> Result<LabelSet> {
        (**self).classify(frame)
    }
}
