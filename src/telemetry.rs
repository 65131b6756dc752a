//! Structured reporting for contract violations and invariant failures.
//!
//! The rollback core is deliberately forgiving at runtime: a malformed packet
//! is rejected with an error, a desync is flagged and play continues. What
//! must not happen is for those events to vanish. Every one of them becomes a
//! [`ContractViolation`] - a plain value carrying severity, category, source
//! location, tick, and key-value context - and is handed to a
//! [`ViolationObserver`].
//!
//! The default observer logs through `tracing` with structured fields, so a
//! process that never touches this module still gets machine-parseable
//! records. Tests install a [`CollectingObserver`] instead and assert on what
//! was reported; integrations can route violations to metrics or alerting by
//! implementing the trait themselves.
//!
//! The second half of the module is runtime invariant checking: types that
//! implement [`InvariantChecker`] get swept by [`debug_check_invariants!`] at
//! the end of every state transition in debug builds (and in release builds
//! under the `paranoid` feature), reporting any breakage through the same
//! pipeline.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How bad a violation is.
///
/// Ordered least to most severe so observers can filter with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recovered; the operation continued with a fallback.
    /// Example: a degenerate RNG range clamped to its lower bound.
    Warning,
    /// The operation was refused or degraded. Example: a checksum entry
    /// missing from history when a remote report arrived for its tick.
    Error,
    /// An invariant is broken and state may be corrupt. Example: a partial
    /// frame row whose width disagrees with the player count.
    Critical,
}

impl ViolationSeverity {
    /// Stable lowercase label for log and metrics fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of the netcode contract was violated.
///
/// Marked `#[non_exhaustive]`: future versions may add categories, so match
/// with a wildcard arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Input mapping constraint broken: a packet from a remote the mapping
    /// does not know, or carrying the wrong number of frames for its group.
    InputMapping,
    /// Tick ordering constraint broken: a packet for an already-consumed
    /// tick, or one skipping past the prediction window.
    TickOrdering,
    /// Partial frame bookkeeping broken, such as a second write into an
    /// already-filled input slot.
    PartialFrame,
    /// Checksum history bookkeeping issue: reports moving backwards, or
    /// recorded history missing an entry it should have.
    ChecksumHistory,
    /// Simulation contract breached by the caller or the implementation,
    /// such as an input slice of the wrong arity or an empty RNG range.
    SimContract,
    /// Peers disagree on the canonical checksum for the same tick.
    Desync,
    /// A state the library claims is unreachable was reached. Always a bug
    /// in the library itself.
    InternalError,
    /// A runtime invariant sweep failed. Only produced in debug builds or
    /// under the `paranoid` feature.
    Invariant,
}

impl ViolationKind {
    /// Stable lowercase label for log and metrics fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InputMapping => "input_mapping",
            Self::TickOrdering => "tick_ordering",
            Self::PartialFrame => "partial_frame",
            Self::ChecksumHistory => "checksum_history",
            Self::SimContract => "sim_contract",
            Self::Desync => "desync",
            Self::InternalError => "internal_error",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded violation, with everything needed to diagnose it.
///
/// Violations serialize to JSON (the `tick` field as a number or `null`), so
/// they drop straight into structured log pipelines.
///
/// # Example
///
/// ```
/// use bulwark_rollback::telemetry::{ContractViolation, ViolationKind, ViolationSeverity};
///
/// let violation = ContractViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::TickOrdering,
///     "stale packet",
///     "rollback.rs:42",
/// )
/// .with_tick(100)
/// .with_context("packet_tick", "90");
///
/// let json = serde_json::to_string(&violation).unwrap();
/// assert!(json.contains(r#""kind":"tick_ordering""#));
/// assert!(json.contains(r#""tick":100"#));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContractViolation {
    /// Severity level.
    pub severity: ViolationSeverity,
    /// Subsystem category.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// `file:line` where the violation was detected.
    pub location: &'static str,
    /// The tick the violation concerns, when one applies.
    pub tick: Option<u64>,
    /// Extra key-value diagnostics (player indices, expected vs actual, ...).
    pub context: BTreeMap<String, String>,
}

impl ContractViolation {
    /// Creates a violation with no tick and no context.
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
            tick: None,
            context: BTreeMap::new(),
        }
    }

    /// Attaches the tick the violation concerns.
    #[must_use]
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Attaches one context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// JSON encoding, or `None` if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Pretty-printed JSON encoding, or `None` if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(tick) = self.tick {
            write!(f, ", tick={tick}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Sink for reported violations.
///
/// With the `sync-send` feature the observer must be `Send + Sync`, since a
/// session may report from multiple threads. Implementations should return
/// quickly; reports can fire inside the per-tick hot path.
///
/// # Example
///
/// ```
/// use bulwark_rollback::telemetry::{ContractViolation, ViolationObserver};
///
/// struct StderrObserver;
///
/// impl ViolationObserver for StderrObserver {
///     fn on_violation(&self, violation: &ContractViolation) {
///         eprintln!("{violation}");
///     }
/// }
/// ```
#[cfg(feature = "sync-send")]
pub trait ViolationObserver: Send + Sync {
    /// Called once per reported violation.
    fn on_violation(&self, violation: &ContractViolation);
}

/// Sink for reported violations.
///
/// Implementations should return quickly; reports can fire inside the
/// per-tick hot path.
#[cfg(not(feature = "sync-send"))]
pub trait ViolationObserver {
    /// Called once per reported violation.
    fn on_violation(&self, violation: &ContractViolation);
}

/// The default observer: logs each violation as a `tracing` event.
///
/// `Warning` maps to `tracing::warn!`, everything above to
/// `tracing::error!`. All violation fields become structured event fields
/// (`severity`, `kind`, `location`, `tick`, `context`), so JSON subscriber
/// layers pick them up without parsing the message.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates the observer. It holds no state.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &ContractViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let tick = violation
            .tick
            .map_or_else(|| "null".to_owned(), |t| t.to_string());
        // Render context as one compact field; not every subscriber supports
        // dynamic field sets.
        let context = if violation.context.is_empty() {
            "{}".to_owned()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    tick = %tick,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    tick = %tick,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// An observer that stores every violation, for test assertions.
///
/// Internally a `parking_lot::Mutex<Vec<_>>`: safe to share across threads,
/// and a panicking holder does not poison it.
///
/// # Example
///
/// ```
/// use bulwark_rollback::telemetry::{
///     CollectingObserver, ContractViolation, ViolationKind, ViolationObserver,
///     ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&ContractViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::TickOrdering,
///     "stale packet",
///     "test.rs:1",
/// ));
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::TickOrdering));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<ContractViolation>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
        }
    }

    /// A copy of everything collected so far.
    #[must_use]
    pub fn violations(&self) -> Vec<ContractViolation> {
        self.violations.lock().clone()
    }

    /// Number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Whether nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Whether any collected violation has the given kind.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Whether any collected violation is at or above the given severity.
    #[must_use]
    pub fn has_severity(&self, min_severity: ViolationSeverity) -> bool {
        self.violations
            .lock()
            .iter()
            .any(|v| v.severity >= min_severity)
    }

    /// Drops everything collected so far.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &ContractViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Builds a [`ContractViolation`] at the current `file:line` and reports it
/// through the default [`TracingObserver`].
///
/// # Syntax
///
/// ```text
/// report_violation!(severity, kind, "message");
/// report_violation!(severity, kind, "format {}", args);
/// ```
///
/// # Example
///
/// ```
/// use bulwark_rollback::report_violation;
/// use bulwark_rollback::telemetry::{ViolationKind, ViolationSeverity};
///
/// report_violation!(
///     ViolationSeverity::Warning,
///     ViolationKind::SimContract,
///     "empty range [{}..{})",
///     5,
///     5
/// );
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ContractViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ContractViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Routes a violation to the given observer, or to the default
/// [`TracingObserver`] when none is configured.
///
/// This is the function behind [`report_violation_to!`]; the networked state
/// calls it with its optional observer so that "no observer installed" still
/// means "logged", never "dropped".
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &ContractViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Like [`report_violation!`], but routed through an `Option`al observer
/// with [`report_to_observer`] semantics.
///
/// # Syntax
///
/// ```text
/// report_violation_to!(observer, severity, kind, "message");
/// report_violation_to!(observer, severity, kind, "format {}", args);
/// ```
///
/// # Example
///
/// ```
/// use bulwark_rollback::report_violation_to;
/// use bulwark_rollback::telemetry::{
///     CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
/// use std::sync::Arc;
///
/// let observer: Option<Arc<dyn ViolationObserver>> =
///     Some(Arc::new(CollectingObserver::new()));
///
/// report_violation_to!(
///     &observer,
///     ViolationSeverity::Error,
///     ViolationKind::TickOrdering,
///     "packet for tick {} ahead of window end {}",
///     19,
///     12
/// );
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::ContractViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::ContractViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

// ==========================================
// Runtime Invariant Checking
// ==========================================

/// Description of one broken internal invariant.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvariantViolation {
    /// Name of the type whose invariant broke.
    pub type_name: &'static str,
    /// What the invariant is.
    pub invariant: String,
    /// Extra diagnostics, when the check site had values worth recording.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates a violation for the named type and invariant.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Attaches diagnostic details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// JSON encoding, or `None` if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Internal consistency check for stateful types.
///
/// The rollback core implements this for its bookkeeping types and sweeps
/// them with [`debug_check_invariants!`] after every state transition. A
/// check must be read-only and must report the *first* broken invariant it
/// finds; later ones are usually consequences of the first.
///
/// # Example
///
/// ```
/// use bulwark_rollback::telemetry::{InvariantChecker, InvariantViolation};
///
/// struct BoundedCounter {
///     value: u32,
///     max: u32,
/// }
///
/// impl InvariantChecker for BoundedCounter {
///     fn check_invariants(&self) -> Result<(), InvariantViolation> {
///         if self.value > self.max {
///             return Err(InvariantViolation::new(
///                 "BoundedCounter",
///                 "value exceeds maximum",
///             )
///             .with_details(format!("value={}, max={}", self.value, self.max)));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait InvariantChecker {
    /// Returns the first broken invariant, or `Ok(())` when all hold.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Runs [`InvariantChecker::check_invariants`] and reports any failure as a
/// `Critical` violation.
///
/// Expands to nothing in release builds unless the `paranoid` feature is
/// enabled, so the sweeps cost nothing in shipping binaries.
///
/// # Syntax
///
/// ```text
/// debug_check_invariants!(value);
/// debug_check_invariants!(value, "context string");
/// ```
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{}",
                violation
            );
        }
    }};

    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [context: {}]",
                violation,
                $context
            );
        }
    }};
}

/// No-op form for release builds without the `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{}};
    ($expr:expr, $context:expr) => {{}};
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn sample(severity: ViolationSeverity, kind: ViolationKind) -> ContractViolation {
        ContractViolation::new(severity, kind, "sample", "test.rs:1")
    }

    // ===== Severity and kind =====

    #[test]
    fn severity_orders_from_warning_to_critical() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(ViolationSeverity::Warning.as_str(), "warning");
        assert_eq!(ViolationSeverity::Critical.as_str(), "critical");
        assert_eq!(ViolationKind::InputMapping.as_str(), "input_mapping");
        assert_eq!(ViolationKind::ChecksumHistory.as_str(), "checksum_history");
        assert_eq!(ViolationKind::Desync.as_str(), "desync");
        assert_eq!(ViolationKind::Invariant.as_str(), "invariant");
        assert_eq!(format!("{}", ViolationKind::PartialFrame), "partial_frame");
    }

    // ===== ContractViolation =====

    #[test]
    fn builder_accumulates_tick_and_context() {
        let violation = sample(ViolationSeverity::Warning, ViolationKind::TickOrdering)
            .with_tick(100)
            .with_context("expected", "10")
            .with_context("actual", "15");

        assert_eq!(violation.tick, Some(100));
        assert_eq!(violation.context.get("expected"), Some(&"10".to_string()));
        assert_eq!(violation.context.get("actual"), Some(&"15".to_string()));
    }

    #[test]
    fn display_carries_every_field() {
        let violation = ContractViolation::new(
            ViolationSeverity::Error,
            ViolationKind::PartialFrame,
            "missing input",
            "window.rs:10",
        )
        .with_tick(50)
        .with_context("player", "2");

        let text = violation.to_string();
        assert!(text.contains("error"));
        assert!(text.contains("partial_frame"));
        assert!(text.contains("missing input"));
        assert!(text.contains("window.rs:10"));
        assert!(text.contains("tick=50"));
        assert!(text.contains("player"));
    }

    // ===== CollectingObserver =====

    #[test]
    fn collector_records_and_answers_queries() {
        let observer = CollectingObserver::new();
        assert!(observer.is_empty());

        observer.on_violation(&sample(
            ViolationSeverity::Warning,
            ViolationKind::TickOrdering,
        ));
        observer.on_violation(&sample(
            ViolationSeverity::Error,
            ViolationKind::PartialFrame,
        ));

        assert_eq!(observer.len(), 2);
        assert!(observer.has_violation(ViolationKind::TickOrdering));
        assert!(observer.has_violation(ViolationKind::PartialFrame));
        assert!(!observer.has_violation(ViolationKind::Desync));
        assert!(observer.has_severity(ViolationSeverity::Warning));
        assert!(observer.has_severity(ViolationSeverity::Error));
        assert!(!observer.has_severity(ViolationSeverity::Critical));
        assert_eq!(observer.violations().len(), 2);
    }

    #[test]
    fn collector_clear_resets() {
        let observer = CollectingObserver::new();
        observer.on_violation(&sample(
            ViolationSeverity::Warning,
            ViolationKind::TickOrdering,
        ));
        assert!(!observer.is_empty());
        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn collector_accepts_concurrent_writers() {
        use std::thread;

        let observer = Arc::new(CollectingObserver::new());
        let handles: Vec<_> = (0..8)
            .map(|thread_id| {
                let observer = observer.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        observer.on_violation(&ContractViolation::new(
                            ViolationSeverity::Warning,
                            ViolationKind::TickOrdering,
                            format!("thread {thread_id} violation {i}"),
                            "concurrent.rs:1",
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }

        assert_eq!(observer.len(), 800);
    }

    #[test]
    fn collector_survives_a_panicking_holder() {
        use std::thread;

        let observer = Arc::new(CollectingObserver::new());
        observer.on_violation(&sample(
            ViolationSeverity::Warning,
            ViolationKind::TickOrdering,
        ));

        let for_thread = observer.clone();
        let result = thread::spawn(move || {
            let _ = for_thread.len();
            panic!("intentional panic");
        })
        .join();
        assert!(result.is_err());

        // parking_lot mutexes do not poison; the collector stays usable.
        observer.on_violation(&sample(
            ViolationSeverity::Error,
            ViolationKind::PartialFrame,
        ));
        assert_eq!(observer.len(), 2);
    }

    // ===== Reporting paths =====

    #[test]
    fn tracing_observer_handles_every_severity() {
        let observer = TracingObserver::new();
        for severity in [
            ViolationSeverity::Warning,
            ViolationSeverity::Error,
            ViolationSeverity::Critical,
        ] {
            observer.on_violation(&sample(severity, ViolationKind::InternalError).with_tick(3));
        }
    }

    #[test]
    fn report_macro_reaches_the_default_observer() {
        // Routes to TracingObserver; succeeding means not panicking.
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::TickOrdering,
            "plain message"
        );
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::TickOrdering,
            "expected={}, actual={}",
            10,
            15
        );
    }

    #[test]
    fn report_to_observer_prefers_the_custom_sink() {
        let observer = Arc::new(CollectingObserver::new());
        report_to_observer(
            Some(&observer),
            &sample(ViolationSeverity::Warning, ViolationKind::TickOrdering),
        );
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn report_to_observer_falls_back_to_tracing() {
        let no_observer: Option<&Arc<CollectingObserver>> = None;
        report_to_observer(
            no_observer,
            &sample(ViolationSeverity::Warning, ViolationKind::TickOrdering),
        );
    }

    #[test]
    fn report_violation_to_macro_formats_and_routes() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());

        report_violation_to!(
            &observer,
            ViolationSeverity::Critical,
            ViolationKind::Desync,
            "checksum mismatch at tick {}: local={:#010x}, remote={:#010x}",
            42u64,
            0x1234_5678u32,
            0x8765_4321u32
        );

        let violations = collector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Desync);
        assert_eq!(violations[0].severity, ViolationSeverity::Critical);
        assert!(violations[0].message.contains("42"));

        let none: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &none,
            ViolationSeverity::Warning,
            ViolationKind::TickOrdering,
            "falls back to tracing"
        );
    }

    // ===== Invariant checking =====

    struct AlwaysHolds;

    impl InvariantChecker for AlwaysHolds {
        fn check_invariants(&self) -> Result<(), InvariantViolation> {
            Ok(())
        }
    }

    struct AlwaysBroken;

    impl InvariantChecker for AlwaysBroken {
        fn check_invariants(&self) -> Result<(), InvariantViolation> {
            Err(InvariantViolation::new("AlwaysBroken", "by construction")
                .with_details("details here"))
        }
    }

    #[test]
    fn invariant_violation_display_includes_details() {
        let bare = InvariantViolation::new("Queue", "length exceeds capacity");
        assert!(bare.to_string().contains("Queue"));
        assert!(bare.to_string().contains("length exceeds capacity"));

        let detailed = bare.with_details("len=200, cap=128");
        assert!(detailed.to_string().contains("len=200, cap=128"));
    }

    #[test]
    fn invariant_checker_surfaces_failures() {
        assert!(AlwaysHolds.check_invariants().is_ok());
        let violation = AlwaysBroken.check_invariants().unwrap_err();
        assert_eq!(violation.type_name, "AlwaysBroken");
        assert_eq!(violation.details.as_deref(), Some("details here"));
    }

    #[test]
    fn debug_sweep_reports_without_panicking() {
        debug_check_invariants!(AlwaysHolds);
        debug_check_invariants!(AlwaysHolds, "after update");
        // A failing sweep reports through tracing; it must not panic.
        debug_check_invariants!(AlwaysBroken);
        debug_check_invariants!(AlwaysBroken, "after update");
    }

    // ===== Serialization =====

    #[test]
    fn violations_serialize_for_log_pipelines() {
        let violation = ContractViolation::new(
            ViolationSeverity::Critical,
            ViolationKind::Desync,
            "checksum mismatch",
            "rollback.rs:50",
        )
        .with_tick(100)
        .with_context("expected", "0x12345678");

        let json = serde_json::to_string(&violation).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["severity"], "critical");
        assert_eq!(parsed["kind"], "desync");
        assert_eq!(parsed["tick"], 100);
        assert_eq!(parsed["context"]["expected"], "0x12345678");

        // Absent tick serializes as null, not as a missing key.
        let bare = sample(ViolationSeverity::Warning, ViolationKind::TickOrdering);
        let json = serde_json::to_string(&bare).unwrap();
        assert!(json.contains(r#""tick":null"#));
    }

    #[test]
    fn invariant_violations_serialize_too() {
        let violation =
            InvariantViolation::new("Window", "offset past end").with_details("offset=9, len=4");
        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains(r#""type_name":"Window""#));
        assert!(json.contains(r#""details":"offset=9, len=4""#));
    }

    // The to_json conveniences only exist with the `json` feature.
    #[cfg(feature = "json")]
    mod json_api {
        use super::super::*;

        #[test]
        fn to_json_matches_serde_output() {
            let violation = ContractViolation::new(
                ViolationSeverity::Warning,
                ViolationKind::TickOrdering,
                "stale",
                "test.rs:1",
            )
            .with_tick(7);
            assert_eq!(
                violation.to_json().unwrap(),
                serde_json::to_string(&violation).unwrap()
            );
        }

        #[test]
        fn to_json_pretty_is_indented() {
            let violation = ContractViolation::new(
                ViolationSeverity::Warning,
                ViolationKind::TickOrdering,
                "stale",
                "test.rs:1",
            );
            let pretty = violation.to_json_pretty().unwrap();
            assert!(pretty.contains('\n'));
            assert!(pretty.contains("  "));
        }

        #[test]
        fn invariant_to_json_round_trips() {
            let violation = InvariantViolation::new("Window", "offset past end");
            let json = violation.to_json().unwrap();
            assert!(json.contains(r#""invariant":"offset past end""#));
        }
    }
}
