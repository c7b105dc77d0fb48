use thiserror::Error;

/// Typed failures of the perturbation pipeline. They travel inside
/// `anyhow::Error`, so callers can `downcast_ref::<PerturbError>()`.
#[derive(Error, Debug)]
pub enum PerturbError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("no control cells for cell type: {0}")]
    UnknownCellType(String),

    #[error("malformed drug embedding {literal:?}: {reason}")]
    MalformedDrugEmbedding { literal: String, reason: String },

    #[error("drug embedding width: expected {expected}, got {actual}")]
    DrugEmbeddingWidth { expected: usize, actual: usize },

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("invalid dose {dose} for cell {cell}")]
    InvalidDose { cell: String, dose: f64 },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}

impl PerturbError {
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnsupportedFormat(_))
    }
}

/// Does this error carry a configuration failure?
pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<PerturbError>()
        .map(PerturbError::is_config_error)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_recoverable_from_anyhow() {
        let err: anyhow::Error = PerturbError::UnsupportedFormat("out.xyz".into()).into();
        assert!(is_config_error(&err));

        let err: anyhow::Error = PerturbError::UnknownCellType("HeLa".into()).into();
        assert!(!is_config_error(&err));
        assert!(matches!(
            err.downcast_ref::<PerturbError>(),
            Some(PerturbError::UnknownCellType(ct)) if ct == "HeLa"
        ));

        assert!(!is_config_error(&anyhow::anyhow!("io")));
    }
}
