//! Error types and result definitions for synchronization operations.
//!
//! [`SyncError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, the originating error and the caller location. Errors can be aggregated when
//! several independent operations fail together, e.g. materializing many tables.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

use chainsync_postgres::record::RecordDecodeError;
use chainsync_postgres::types::TableSpecError;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the engine.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<SyncError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors raised by the engine.
///
/// The kind decides how far an error propagates: catalog and DDL failures abort
/// materialization, handler failures stay inside the dispatcher and fetch failures abort a
/// backfill run.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Execution
    QueryFailed,
    TransactionFailed,

    // Schema reconciliation
    CatalogReadFailed,
    DdlFailed,
    InvalidTableSpec,

    // Dispatch
    HandlerFailed,
    PersistenceFailed,

    // Input sources
    FetchFailed,
    TransportFailed,
    InvalidInput,

    // Configuration, IO & serialization
    ConfigError,
    IoError,
    SerializationError,
    DeserializationError,

    Unknown,
}

impl SyncError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`] when
    /// there is none.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of the error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the dynamic detail, or the first available one for aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for single errors.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the location where the error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Returns a copy of this error with its kind replaced, keeping description and detail.
    ///
    /// Used at component boundaries to reclassify low level failures, e.g. a failing `sqlx`
    /// query inside introspection becomes [`ErrorKind::CatalogReadFailed`].
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        match self.repr {
            ErrorRepr::Single(ref mut payload) => payload.kind = kind,
            ErrorRepr::Many { ref mut errors, .. } => {
                for error in errors.iter_mut() {
                    *error = error.clone().with_kind(kind);
                }
            }
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Hash for SyncError {
    /// Hashes only the kind and static description, so repeated occurrences of the same failure
    /// group together regardless of detail and location.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f)?;
                write_backtrace(payload.backtrace.as_ref(), f)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    if detail.trim().is_empty() {
        return write!(f, "\n  Detail: <empty>");
    }

    write!(f, "\n  Detail:")?;
    for line in detail.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered = backtrace.to_string();
    // Disabled backtraces render as a single explanatory line that adds nothing.
    if rendered.trim().is_empty() || rendered.starts_with("disabled") {
        return Ok(());
    }

    write!(f, "\n  Backtrace:")?;
    for line in rendered.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SyncError {
        let location = Location::caller();
        let mut errors: Vec<SyncError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        SyncError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for SyncError {
    #[track_caller]
    fn from(err: std::io::Error) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for SyncError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };
        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps every driver failure to [`ErrorKind::QueryFailed`]; callers reclassify with
/// [`SyncError::with_kind`] where the context calls for it.
impl From<sqlx::Error> for SyncError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::QueryFailed,
            Cow::Borrowed("Database operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<RecordDecodeError> for SyncError {
    #[track_caller]
    fn from(err: RecordDecodeError) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::QueryFailed,
            Cow::Borrowed("Result row could not be decoded"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<TableSpecError> for SyncError {
    #[track_caller]
    fn from(err: TableSpecError) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::InvalidTableSpec,
            Cow::Borrowed("Table spec is invalid"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Timeouts and connection failures are transport errors, anything else (bad status, invalid
/// body) is a fetch error.
impl From<reqwest::Error> for SyncError {
    #[track_caller]
    fn from(err: reqwest::Error) -> SyncError {
        let (kind, description) = if err.is_timeout() || err.is_connect() || err.is_request() {
            (ErrorKind::TransportFailed, "Input source unreachable")
        } else {
            (ErrorKind::FetchFailed, "Input source request failed")
        };
        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<chainsync_config::LoadConfigError> for SyncError {
    #[track_caller]
    fn from(err: chainsync_config::LoadConfigError) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Configuration could not be loaded"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::{bail, sync_error};

    #[test]
    fn display_includes_kind_description_and_detail() {
        let err = sync_error!(
            ErrorKind::DdlFailed,
            "Table migration failed",
            "public.transfers: column \"x\" does not exist"
        );

        let rendered = err.to_string();
        assert!(rendered.starts_with("[DdlFailed] Table migration failed @ "));
        assert!(rendered.contains("Detail:\n    public.transfers"));
        assert_eq!(
            err.detail(),
            Some("public.transfers: column \"x\" does not exist")
        );
    }

    #[test]
    fn aggregation_keeps_all_kinds() {
        let err = SyncError::from(vec![
            sync_error!(ErrorKind::CatalogReadFailed, "Catalog read failed"),
            sync_error!(ErrorKind::DdlFailed, "Table migration failed"),
        ]);

        assert_eq!(err.kind(), ErrorKind::CatalogReadFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::CatalogReadFailed, ErrorKind::DdlFailed]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
        assert!(err.source().is_some());
    }

    #[test]
    fn aggregating_one_error_returns_it() {
        let err = SyncError::from(vec![sync_error!(
            ErrorKind::FetchFailed,
            "Input source request failed"
        )]);

        assert_eq!(err.kinds(), vec![ErrorKind::FetchFailed]);
        assert_eq!(err.description(), "Input source request failed");
    }

    #[test]
    fn with_kind_reclassifies_and_keeps_detail() {
        let err = sync_error!(ErrorKind::QueryFailed, "Database operation failed", "boom")
            .with_kind(ErrorKind::CatalogReadFailed);

        assert_eq!(err.kind(), ErrorKind::CatalogReadFailed);
        assert_eq!(err.detail(), Some("boom"));
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("disk on fire");
        let err = sync_error!(ErrorKind::IoError, "I/O operation failed", source: io);

        assert_eq!(err.source().map(|s| s.to_string()), Some("disk on fire".into()));
    }

    #[test]
    fn bail_returns_early() {
        fn fails() -> SyncResult<()> {
            bail!(ErrorKind::InvalidInput, "Input is malformed", "missing origin");
        }

        let err = fails().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.detail(), Some("missing origin"));
    }

    #[test]
    fn json_errors_are_deserialization_errors() {
        let err: SyncError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();

        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
