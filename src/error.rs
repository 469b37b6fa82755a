//! Error handling for the binaural engine
//!
//! Every failure is caught at the operation boundary and turned into a
//! status event; none of these errors should terminate the host process.

use thiserror::Error;

/// Result type alias for binaural operations
pub type Result<T> = std::result::Result<T, BinauralError>;

/// Main error type for binaural operations
#[derive(Error, Debug)]
pub enum BinauralError {
    // Graph Errors
    #[error("Graph construction failed: {reason}")]
    GraphConstruction { reason: String },

    #[error("Unknown audio node: {node}")]
    UnknownNode { node: String },

    // Capture Errors
    #[error("Recording failed: {reason}")]
    Recording { reason: String },

    #[error("Could not decode audio: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Verification Errors
    #[error("Insufficient signal: found {peaks_found} envelope peak(s), need at least 2")]
    InsufficientSignal { peaks_found: usize },

    // Configuration Errors
    #[error("Invalid {name}: {value} (allowed {min} to {max})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BinauralError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            BinauralError::GraphConstruction { .. } => "GRAPH_CONSTRUCTION",
            BinauralError::UnknownNode { .. } => "UNKNOWN_NODE",
            BinauralError::Recording { .. } => "RECORDING",
            BinauralError::Decode { .. } => "DECODE",
            BinauralError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            BinauralError::InsufficientSignal { .. } => "INSUFFICIENT_SIGNAL",
            BinauralError::InvalidParameter { .. } => "INVALID_PARAMETER",
            BinauralError::InvalidConfig { .. } => "INVALID_CONFIG",
            BinauralError::InvalidState { .. } => "INVALID_STATE",
            BinauralError::FileNotFound { .. } => "FILE_NOT_FOUND",
            BinauralError::Io(_) => "IO_ERROR",
            BinauralError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the session can carry on after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            BinauralError::Recording { .. } => true,
            BinauralError::Decode { .. } => true,
            BinauralError::InsufficientSignal { .. } => true,
            BinauralError::InvalidParameter { .. } => true,
            BinauralError::InvalidState { .. } => true,
            BinauralError::FileNotFound { .. } => true,
            BinauralError::UnsupportedFormat { .. } => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BinauralError::GraphConstruction { .. } => vec![
                "Stop any other session using the output device",
                "Create a fresh rendering context and try again",
            ],
            BinauralError::Recording { .. } => vec![
                "Playback continues without a downloadable recording",
                "Let the session run for a moment before stopping it",
            ],
            BinauralError::Decode { .. } => vec![
                "Convert the file to a 16 or 24-bit WAV file",
                "Check that the file plays in another application",
            ],
            BinauralError::InsufficientSignal { .. } => vec![
                "Record for at least two beat cycles before stopping",
                "Raise the tone volume so the envelope clears the noise floor",
            ],
            BinauralError::InvalidParameter { .. } => vec![
                "Beat frequency must be between 0 and 50 Hz",
                "Pure tone frequency must be between 20 and 20000 Hz",
                "Volumes must be between 0 and 1",
            ],
            BinauralError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = BinauralError::GraphConstruction {
            reason: "context closed".to_string(),
        };
        assert_eq!(err.error_code(), "GRAPH_CONSTRUCTION");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_insufficient_signal_is_recoverable() {
        let err = BinauralError::InsufficientSignal { peaks_found: 1 };
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.to_string().contains("found 1"));
    }

    #[test]
    fn test_invalid_parameter_message() {
        let err = BinauralError::InvalidParameter {
            name: "beat frequency",
            value: 60.0,
            min: 0.0,
            max: 50.0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid beat frequency: 60 (allowed 0 to 50)"
        );
    }
}
