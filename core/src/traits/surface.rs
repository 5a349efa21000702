use crate::bulk::LabelRequest;

/// Rendering-layer capability that turns a label request into a visible label.
pub trait LabelMaterializer: Send + Sync {
    /// Whether the owning feature is still attached to its rendering surface.
    fn is_live(&self, request: &LabelRequest) -> bool;
    fn materialize(&self, request: &LabelRequest) -> anyhow::Result<()>;
}

/// Re-renders the active/selected items list.
pub trait ActiveListRenderer: Send + Sync {
    fn refresh(&self) -> anyhow::Result<()>;
}
