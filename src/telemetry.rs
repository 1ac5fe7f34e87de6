//! Reporting of rejected peer input and broken invariants.
//!
//! A session never panics on what arrives over the link. A notification that cannot be
//! decoded, a write outside an attribute's domain or a phase request the host refuses is
//! dropped, and a [`ContractViolation`] describing it goes to the session's
//! [`ViolationObserver`]. Without an observer, violations are logged through `tracing`.
//!
//! ```
//! use princess_of_fire::telemetry::CollectingObserver;
//! use princess_of_fire::SessionBuilder;
//! use princess_of_fire::MemoryAddr;
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! let builder = SessionBuilder::<MemoryAddr>::new().with_violation_observer(observer.clone());
//! # let _ = builder;
//! assert!(observer.is_empty());
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// How bad a violation is, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// The offending input was dropped and nothing else changed.
    Warning,
    /// Shared state may be stale until the next write or reset.
    Error,
    /// Local state broke one of its own rules.
    Critical,
}

impl ViolationSeverity {
    /// Lowercase label for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a violation was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Datagram or notification level: undecodable bytes, unknown attributes, full queues.
    NetworkProtocol,
    /// A write or notification with a value outside the attribute's domain, or from the
    /// wrong owner.
    Attribute,
    /// A phase change the state machine refused.
    PhaseTransition,
    /// Settings that cannot work together.
    Configuration,
    /// The peers disagree, for example both hold the same character.
    Synchronization,
    /// A runtime invariant check failed. Checked in debug builds and with `paranoid`.
    Invariant,
    /// A bug in this crate.
    InternalError,
}

impl ViolationKind {
    /// Snake-case label for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkProtocol => "network_protocol",
            Self::Attribute => "attribute",
            Self::PhaseTransition => "phase_transition",
            Self::Configuration => "configuration",
            Self::Synchronization => "synchronization",
            Self::Invariant => "invariant",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dropped input or broken rule.
///
/// ```
/// use princess_of_fire::telemetry::{ContractViolation, ViolationKind, ViolationSeverity};
///
/// let violation = ContractViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Attribute,
///     "GuestX = 400 is off screen",
///     "shared_state.rs:42",
/// );
/// assert_eq!(
///     violation.to_string(),
///     "[warning/attribute] GuestX = 400 is off screen (shared_state.rs:42)"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContractViolation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Which part of the session noticed.
    pub kind: ViolationKind,
    /// What happened.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
}

impl ContractViolation {
    /// Creates a violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
        }
    }

    /// The violation as a JSON object, for log shippers.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} ({})",
            self.severity, self.kind, self.message, self.location
        )
    }
}

/// Receives violations from a session.
///
/// Called from inside [`GameSession::advance_frame`](crate::GameSession::advance_frame), so
/// implementations should return quickly.
#[cfg(feature = "sync-send")]
pub trait ViolationObserver: Send + Sync {
    /// Handles one violation.
    fn on_violation(&self, violation: &ContractViolation);
}

/// Receives violations from a session.
///
/// Called from inside [`GameSession::advance_frame`](crate::GameSession::advance_frame), so
/// implementations should return quickly.
#[cfg(not(feature = "sync-send"))]
pub trait ViolationObserver {
    /// Handles one violation.
    fn on_violation(&self, violation: &ContractViolation);
}

/// Logs warnings with `tracing::warn!` and everything worse with `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &ContractViolation) {
        let ContractViolation {
            severity,
            kind,
            message,
            location,
        } = violation;
        if *severity == ViolationSeverity::Warning {
            tracing::warn!(kind = kind.as_str(), location, "{message}");
        } else {
            tracing::error!(
                severity = severity.as_str(),
                kind = kind.as_str(),
                location,
                "{message}"
            );
        }
    }
}

/// Keeps every violation in memory. Meant for tests.
///
/// ```
/// use princess_of_fire::telemetry::{
///     CollectingObserver, ContractViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&ContractViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::PhaseTransition,
///     "guest asked for OVER",
///     "test.rs:1",
/// ));
/// assert!(observer.has_violation(ViolationKind::PhaseTransition));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<ContractViolation>>,
}

impl CollectingObserver {
    /// Creates an empty observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything collected so far.
    #[must_use]
    pub fn violations(&self) -> Vec<ContractViolation> {
        self.violations.lock().clone()
    }

    /// Number of violations collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// `true` if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// `true` if at least one violation of `kind` was reported.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.count(kind) > 0
    }

    /// Number of violations of `kind`.
    #[must_use]
    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations
            .lock()
            .iter()
            .filter(|violation| violation.kind == kind)
            .count()
    }

    /// Forgets everything collected so far.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &ContractViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Backs [`report_violation_to!`](crate::report_violation_to).
#[doc(hidden)]
pub fn dispatch(observer: Option<&Arc<dyn ViolationObserver>>, violation: &ContractViolation) {
    match observer {
        Some(observer) => observer.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Logs a violation through [`TracingObserver`], tagged with the call site.
///
/// ```
/// use princess_of_fire::report_violation;
/// use princess_of_fire::telemetry::{ViolationKind, ViolationSeverity};
///
/// report_violation!(
///     ViolationSeverity::Warning,
///     ViolationKind::NetworkProtocol,
///     "dropped {} bytes from an unknown sender",
///     12
/// );
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $($fmt:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        $crate::telemetry::TracingObserver.on_violation(&$crate::telemetry::ContractViolation::new(
            $severity,
            $kind,
            format!($($fmt)+),
            concat!(file!(), ":", line!()),
        ));
    }};
}

/// Sends a violation to an `&Option<Arc<dyn ViolationObserver>>`, or logs it when there is
/// none.
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $($fmt:tt)+) => {{
        $crate::telemetry::dispatch(
            $observer.as_ref(),
            &$crate::telemetry::ContractViolation::new(
                $severity,
                $kind,
                format!($($fmt)+),
                concat!(file!(), ":", line!()),
            ),
        );
    }};
}

/// A rule a value broke, as found by [`InvariantChecker::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InvariantViolation {
    /// The type that broke it.
    pub type_name: &'static str,
    /// The rule, stated as what should hold.
    pub invariant: String,
    /// The values that broke it.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates a violation of `invariant` by `type_name`.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Attaches the offending values.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        match &self.details {
            Some(details) => write!(f, " ({details})"),
            None => Ok(()),
        }
    }
}

/// Types with rules that must hold between operations.
pub trait InvariantChecker {
    /// The first broken rule, if any.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Runs [`InvariantChecker::check_invariants`] and logs a `Critical` violation on failure.
///
/// Expands to nothing in release builds unless the `paranoid` feature is on.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [{}]",
                violation,
                $context
            );
        }
    }};
}

/// Release build without `paranoid`: no check.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr, $context:expr) => {{}};
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn sample(kind: ViolationKind) -> ContractViolation {
        ContractViolation::new(ViolationSeverity::Warning, kind, "sample", "test.rs:1")
    }

    #[test]
    fn severities_are_ordered() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn display_names_severity_kind_and_location() {
        let violation = ContractViolation::new(
            ViolationSeverity::Error,
            ViolationKind::PhaseTransition,
            "guest asked for OVER",
            "game_session.rs:10",
        );
        assert_eq!(
            violation.to_string(),
            "[error/phase_transition] guest asked for OVER (game_session.rs:10)"
        );
    }

    #[test]
    fn collector_counts_by_kind() {
        let observer = CollectingObserver::new();
        observer.on_violation(&sample(ViolationKind::Attribute));
        observer.on_violation(&sample(ViolationKind::NetworkProtocol));
        observer.on_violation(&sample(ViolationKind::Attribute));

        assert_eq!(observer.len(), 3);
        assert_eq!(observer.count(ViolationKind::Attribute), 2);
        assert!(!observer.has_violation(ViolationKind::Invariant));

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn collector_accepts_reports_from_many_threads() {
        let observer = Arc::new(CollectingObserver::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let observer = Arc::clone(&observer);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        observer.on_violation(&sample(ViolationKind::NetworkProtocol));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(observer.len(), 100);
    }

    #[test]
    fn report_to_observer_records_call_site() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::Attribute,
            "HostX = {} is off screen",
            400
        );

        let violations = collector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "HostX = 400 is off screen");
        assert!(violations[0].location.starts_with("src/telemetry.rs:"));
    }

    #[test]
    fn report_without_observer_only_logs() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &observer,
            ViolationSeverity::Error,
            ViolationKind::Synchronization,
            "both peers hold the dragon"
        );
    }

    #[test]
    fn invariant_violation_display_includes_details() {
        let violation = InvariantViolation::new("PowerUp", "charges never exceed the maximum")
            .with_details("charges=4, max=3");
        assert_eq!(
            violation.to_string(),
            "PowerUp: charges never exceed the maximum (charges=4, max=3)"
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_uses_snake_case_labels() {
        let json = sample(ViolationKind::NetworkProtocol).to_json().unwrap();
        assert!(json.contains("\"kind\":\"network_protocol\""));
        assert!(json.contains("\"severity\":\"warning\""));
    }
}
