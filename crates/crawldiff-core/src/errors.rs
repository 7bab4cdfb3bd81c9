use crawldiff_core_types::RunId;
use thiserror::Error;

/// Result type alias using the canonical error facility
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// handling by the external scheduler and query handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Input validation
    InvalidInput,
    /// Snapshot document is malformed (missing natural key, bad timestamp, non-object entity)
    InvalidSnapshot,
    /// Two entities in one snapshot share a natural key
    DuplicateEntityKey,
    /// Two freshly computed change records share a reconciliation key
    DuplicateChangeKey,
    /// Feed cursor could not be decoded
    InvalidCursor,
    /// Pipeline configuration is invalid
    InvalidConfig,
    NotFound,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidSnapshot => "ERR_INVALID_SNAPSHOT",
            ExErrorKind::DuplicateEntityKey => "ERR_DUPLICATE_ENTITY_KEY",
            ExErrorKind::DuplicateChangeKey => "ERR_DUPLICATE_CHANGE_KEY",
            ExErrorKind::InvalidCursor => "ERR_INVALID_CURSOR",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification kind plus optional pipeline context (operation,
/// crawl, entity) for debugging and alerting.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    crawl_id: Option<String>,
    entity_type: Option<String>,
    entity_key: Option<String>,
    run_id: Option<RunId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            crawl_id: None,
            entity_type: None,
            entity_key: None,
            run_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add crawl context
    pub fn with_crawl_id(mut self, crawl_id: impl Into<String>) -> Self {
        self.crawl_id = Some(crawl_id.into());
        self
    }

    /// Add entity type context
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Add natural key (or reconciliation key) context
    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = Some(key.into());
        self
    }

    /// Add run ID context
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the crawl context, if any
    pub fn crawl_id(&self) -> Option<&str> {
        self.crawl_id.as_deref()
    }

    /// Get the entity type context, if any
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    /// Get the entity key context, if any
    pub fn entity_key(&self) -> Option<&str> {
        self.entity_key.as_deref()
    }

    /// Get the run ID context, if any
    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(crawl_id) = &self.crawl_id {
            write!(f, " (crawl_id: {})", crawl_id)?;
        }
        if let Some(entity_type) = &self.entity_type {
            write!(f, " (entity_type: {})", entity_type)?;
        }
        if let Some(key) = &self.entity_key {
            write!(f, " (key: {})", key)?;
        }
        if let Some(source) = &self.source {
            write!(f, " <- {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Typed domain failures raised by the pure kernel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrawlDiffError {
    /// An entity in a snapshot lacks its natural key
    #[error("{entity_type} entity is missing natural key field `{field}`")]
    MissingNaturalKey { entity_type: String, field: String },

    /// An entity in a snapshot is not a JSON object
    #[error("{entity_type} entity at index {index} is not an object")]
    EntityNotObject { entity_type: String, index: usize },

    /// The same natural key occurs twice in one snapshot
    #[error("duplicate {entity_type} key in snapshot: {key}")]
    DuplicateEntityKey { entity_type: String, key: String },

    /// Two fresh change records compute the same reconciliation key
    #[error("duplicate change key for crawl pair: {key}")]
    DuplicateChangeKey { key: String },

    /// A change record does not belong to the crawl pair being reconciled
    #[error("change {key} belongs to crawl pair {found}, expected {expected}")]
    MismatchedCrawlPair {
        key: String,
        expected: String,
        found: String,
    },

    /// Unknown entity type name
    #[error("unknown entity type: {name}")]
    UnknownEntityType { name: String },

    /// Unknown change kind name
    #[error("unknown change kind: {name}")]
    UnknownChangeKind { name: String },

    /// Feed cursor is not a valid encoded crawl id
    #[error("invalid cursor: {reason}")]
    InvalidCursor { reason: String },

    /// Configuration rejected
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Serialization failure
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl From<CrawlDiffError> for ExError {
    fn from(err: CrawlDiffError) -> Self {
        let message = err.to_string();
        match err {
            CrawlDiffError::MissingNaturalKey { entity_type, .. }
            | CrawlDiffError::EntityNotObject { entity_type, .. } => {
                ExError::new(ExErrorKind::InvalidSnapshot)
                    .with_entity_type(entity_type)
                    .with_message(message)
            }
            CrawlDiffError::DuplicateEntityKey { entity_type, key } => {
                ExError::new(ExErrorKind::DuplicateEntityKey)
                    .with_entity_type(entity_type)
                    .with_entity_key(key)
                    .with_message(message)
            }
            CrawlDiffError::DuplicateChangeKey { key } => {
                ExError::new(ExErrorKind::DuplicateChangeKey)
                    .with_entity_key(key)
                    .with_message(message)
            }
            CrawlDiffError::MismatchedCrawlPair { key, .. } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_entity_key(key)
                    .with_message(message)
            }
            CrawlDiffError::UnknownEntityType { .. } | CrawlDiffError::UnknownChangeKind { .. } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(message)
            }
            CrawlDiffError::InvalidCursor { .. } => {
                ExError::new(ExErrorKind::InvalidCursor).with_message(message)
            }
            CrawlDiffError::InvalidConfig { .. } => {
                ExError::new(ExErrorKind::InvalidConfig).with_message(message)
            }
            CrawlDiffError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for CrawlDiffError {
    fn from(err: serde_json::Error) -> Self {
        CrawlDiffError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        let cases = [
            (ExErrorKind::InvalidSnapshot, "ERR_INVALID_SNAPSHOT"),
            (ExErrorKind::DuplicateEntityKey, "ERR_DUPLICATE_ENTITY_KEY"),
            (ExErrorKind::DuplicateChangeKey, "ERR_DUPLICATE_CHANGE_KEY"),
            (ExErrorKind::InvalidCursor, "ERR_INVALID_CURSOR"),
            (ExErrorKind::Persistence, "ERR_PERSISTENCE"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_duplicate_change_key_maps_to_kind() {
        let err: ExError = CrawlDiffError::DuplicateChangeKey {
            key: "model|update|m1".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ExErrorKind::DuplicateChangeKey);
        assert_eq!(err.entity_key(), Some("model|update|m1"));
    }

    #[test]
    fn test_display_includes_context() {
        let err = ExError::new(ExErrorKind::Persistence)
            .with_op("reconcile")
            .with_crawl_id("c2")
            .with_message("disk full");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[ERR_PERSISTENCE]"));
        assert!(rendered.contains("reconcile"));
        assert!(rendered.contains("crawl_id: c2"));
    }

    #[test]
    fn test_source_chain() {
        let inner = ExError::new(ExErrorKind::Io).with_message("read failed");
        let outer = ExError::new(ExErrorKind::Persistence).with_source(inner);
        assert_eq!(
            outer.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Io)
        );
    }
}
