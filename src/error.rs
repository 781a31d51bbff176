use thiserror::Error;

/// Failure taxonomy at the engine boundary. Per-sample load failures are
/// absent on purpose: they recover locally through fallback synthesis and
/// are only logged.
#[derive(Debug, Error)]
pub enum EngineError {
  /// No usable audio backend; fatal to the session.
  #[error("audio backend unavailable: {0}")]
  Initialization(String),
  /// A trigger referenced a name the catalog does not know.
  #[error("sample not found: {0}")]
  SampleNotFound(String),
  /// Uploaded bytes are not decodable audio.
  #[error("could not decode track: {0}")]
  Decode(String),
  /// The current mix could not be exported.
  #[error("export failed: {0}")]
  Export(String),
}
