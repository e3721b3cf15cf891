//! Registration trait - the unregister handle returned by every registration

use crate::Result;

/// Handle to something registered with a pipeline
///
/// Processors, inputs, outputs, entry points, end points and peek taps all
/// hand one of these back to the caller.
pub trait Registration: Send + Sync {
    /// Id of the registered item (node name or point id)
    fn id(&self) -> String;

    /// Whether the item still belongs to its pipeline
    fn is_registered(&self) -> bool;

    /// Remove the item from its pipeline
    ///
    /// # Errors
    /// Returns a state error when already unregistered, or when the item
    /// must be disabled first.
    fn unregister(&self) -> Result<()>;
}
