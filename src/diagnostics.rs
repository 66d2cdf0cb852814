//! Validation / diagnostics sink: a structured error/warning record with
//! baked-in severity, accumulated into a `ValidationResult` that is the
//! single source of truth for whether a graph is valid.

use std::fmt;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Severity {
    Warning,
    Error,
}

/// The closed taxonomy of validation error kinds. Severity is baked
/// in per-kind so `add_error`/`add_warning` always route correctly
/// regardless of which one the caller happens to call.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ValidationErrorKind {
    CircularDependency,
    MissingDependency,
    InvalidDependencyOrder,
    ResourceNotFound,
    InvalidResourceState,
    ResourceLifetimeViolation,
    ResourceAliasHazard,
    ViewScopeViolation,
    ViewInfoMissing,
    SuboptimalScheduling,
    MemoryPressure,
    InvalidConfiguration,
    InternalError,
}

impl ValidationErrorKind {
    pub fn severity(self) -> Severity {
        use ValidationErrorKind::*;
        match self {
            SuboptimalScheduling | MemoryPressure => Severity::Warning,
            CircularDependency
            | MissingDependency
            | InvalidDependencyOrder
            | ResourceNotFound
            | InvalidResourceState
            | ResourceLifetimeViolation
            | ResourceAliasHazard
            | ViewScopeViolation
            | ViewInfoMissing
            | InvalidConfiguration
            | InternalError => Severity::Error,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        ValidationError { kind, message: message.into() }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Ordered lists of errors/warnings, a validity flag, and a summary.
/// `AddError` with Error-severity flips validity to false; warnings never
/// invalidate (but a kind whose baked-in severity is Warning can still be
/// pushed through `add_error` without affecting validity — severity, not
/// call-site, decides).
#[derive(Default, Clone, Debug)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationError>,
    is_valid: bool_init::Flag,
}

/// Small helper so `ValidationResult::default()` starts valid without a
/// manual `impl Default`.
mod bool_init {
    #[derive(Clone, Debug)]
    pub struct Flag(bool);
    impl Default for Flag {
        fn default() -> Self {
            Flag(true)
        }
    }
    impl Flag {
        pub fn get(&self) -> bool {
            self.0
        }
        pub fn set_false(&mut self) {
            self.0 = false;
        }
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult::default()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ValidationError] {
        &self.warnings
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid.get()
    }

    /// Routes by the error's own baked-in severity: Error-severity records
    /// land in `errors` and flip validity false; Warning-severity records
    /// land in `warnings` regardless of which accumulator was called.
    pub fn add_error(&mut self, error: ValidationError) {
        match error.severity() {
            Severity::Error => {
                self.is_valid.set_false();
                self.errors.push(error);
            }
            Severity::Warning => self.warnings.push(error),
        }
    }

    pub fn add_warning(&mut self, warning: ValidationError) {
        self.warnings.push(warning);
    }

    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!("PASSED ({} warnings)", self.warnings.len())
        } else {
            format!("FAILED ({} errors, {} warnings)", self.errors.len(), self.warnings.len())
        }
    }

    /// Multi-line textual report, optionally prefixed with a frame index.
    pub fn generate_report(&self, frame_index: Option<u64>) -> String {
        let mut out = String::new();
        match frame_index {
            Some(idx) => out.push_str(&format!("frame {}: {}\n", idx, self.summary())),
            None => out.push_str(&format!("{}\n", self.summary())),
        }
        for e in &self.errors {
            out.push_str(&format!("[ERROR] {}\n", e));
        }
        for w in &self.warnings {
            out.push_str(&format!("[WARN] {}\n", w));
        }
        out
    }
}

/// Implemented in the core to route into the current build's
/// `ValidationResult`. Optimization strategies receive a `&mut dyn
/// DiagnosticsSink` rather than a concrete `ValidationResult` so they stay
/// decoupled from the builder.
pub trait DiagnosticsSink {
    fn add_error(&mut self, error: ValidationError);
    fn add_warning(&mut self, warning: ValidationError);
}

impl DiagnosticsSink for ValidationResult {
    fn add_error(&mut self, error: ValidationError) {
        ValidationResult::add_error(self, error)
    }

    fn add_warning(&mut self, warning: ValidationError) {
        ValidationResult::add_warning(self, warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_result_is_valid_and_empty() {
        let r = ValidationResult::new();
        assert!(r.is_valid());
        assert_eq!(r.summary(), "PASSED (0 warnings)");
    }

    #[test]
    fn error_severity_kind_invalidates() {
        let mut r = ValidationResult::new();
        r.add_error(ValidationError::new(ValidationErrorKind::CircularDependency, "cycle"));
        assert!(!r.is_valid());
        assert_eq!(r.errors().len(), 1);
    }

    #[test]
    fn warning_severity_kind_never_invalidates_even_via_add_error() {
        let mut r = ValidationResult::new();
        r.add_error(ValidationError::new(ValidationErrorKind::SuboptimalScheduling, "meh"));
        assert!(r.is_valid());
        assert_eq!(r.warnings().len(), 1);
        assert_eq!(r.errors().len(), 0);
    }

    #[test]
    fn report_contains_frame_prefix_when_given() {
        let r = ValidationResult::new();
        let report = r.generate_report(Some(42));
        assert!(report.starts_with("frame 42: PASSED"));
    }
}
