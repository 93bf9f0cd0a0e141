//! This module contains the analysis context: the configuration plus the
//! oracles the interpreter consults about the world outside the method body
//! being analyzed.
//!
//! There is no global state in the analyzer. Everything an entry point
//! needs arrives through an [`AnalysisContext`], so multiple methods can be
//! analyzed from different threads without sharing anything but the
//! read-only oracles handed in by the caller.

use std::rc::Rc;

use crate::{constant::DEBUG_ENV_VAR, method::FieldRef, value::Item};

/// The configuration for a single analysis run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Whether to iterate each method to a jump-table fixed point.
    ///
    /// When disabled, the analyzer performs a single pass and relies on
    /// jump information precomputed from the class file's stack-map
    /// attribute, supplied through
    /// [`crate::analyzer::Analyzer::with_jump_info`].
    ///
    /// Defaults to `true`.
    pub iterative: bool,

    /// Whether to emit verbose per-opcode state dumps to the logs.
    ///
    /// Defaults to `false`; [`Config::from_env`] reads the `OCSTACK_DEBUG`
    /// environment variable instead.
    pub debug: bool,
}

impl Config {
    /// Sets the `iterative` config parameter to `value`.
    #[must_use]
    pub fn with_iterative(mut self, value: bool) -> Self {
        self.iterative = value;
        self
    }

    /// Sets the `debug` config parameter to `value`.
    #[must_use]
    pub fn with_debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Creates a configuration honouring the process environment: setting
    /// `OCSTACK_DEBUG` to anything but `0` or `false` switches the verbose
    /// state dumps on.
    #[must_use]
    pub fn from_env() -> Self {
        let debug = std::env::var(DEBUG_ENV_VAR)
            .map(|value| !matches!(value.as_str(), "" | "0" | "false"))
            .unwrap_or(false);
        Self {
            debug,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iterative: true,
            debug:     false,
        }
    }
}

/// The oracle answering questions about field values that were
/// pre-computed across the whole program.
///
/// A summary is a snapshot, not a live reference: the items it returns must
/// not depend on the state of any in-progress analysis, which keeps merges
/// terminating even when a field's summary was itself derived from other
/// field values.
pub trait FieldSummary {
    /// Checks whether the summary covers every write site in the program.
    /// Incomplete summaries are not trusted at all.
    fn is_complete(&self) -> bool;

    /// Gets the summary item for `field`, or [`None`] when nothing is
    /// known.
    fn summary(&self, field: &FieldRef) -> Option<Item>;
}

/// The oracle answering subtype questions against the class repository.
pub trait ClassHierarchy {
    /// Checks whether `class_name` (dotted) is a subtype of `supertype`
    /// (dotted). Unknown classes answer `false`.
    fn is_subtype(&self, class_name: &str, supertype: &str) -> bool;
}

/// The full context for an analysis run.
///
/// The oracles are optional; a missing oracle degrades the analysis
/// gracefully (field loads produce plain typed values, collection checks
/// answer negatively) rather than failing it.
#[derive(Clone, Default)]
pub struct AnalysisContext {
    /// The configuration for this run.
    pub config: Config,

    /// The field-summary oracle, if the caller precomputed one.
    pub field_summary: Option<Rc<dyn FieldSummary>>,

    /// The class-hierarchy oracle, if a class repository is available.
    pub hierarchy: Option<Rc<dyn ClassHierarchy>>,
}

impl AnalysisContext {
    /// Creates a context with the provided configuration and no oracles.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            field_summary: None,
            hierarchy: None,
        }
    }

    /// Sets the field-summary oracle.
    #[must_use]
    pub fn with_field_summary(mut self, summary: Rc<dyn FieldSummary>) -> Self {
        self.field_summary = Some(summary);
        self
    }

    /// Sets the class-hierarchy oracle.
    #[must_use]
    pub fn with_hierarchy(mut self, hierarchy: Rc<dyn ClassHierarchy>) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    /// Gets the usable summary for `field`: the oracle must be present and
    /// complete, and summaries are only trusted for non-public fields,
    /// whose writes are all visible to the summary computation.
    #[must_use]
    pub fn field_summary_for(&self, field: &FieldRef) -> Option<Item> {
        let oracle = self.field_summary.as_ref()?;
        if !oracle.is_complete() || field.is_public {
            return None;
        }
        oracle.summary(field)
    }

    /// Checks whether `class_name` (dotted) is a collection type.
    #[must_use]
    pub fn is_collection(&self, class_name: &str) -> bool {
        self.hierarchy
            .as_ref()
            .is_some_and(|hierarchy| hierarchy.is_subtype(class_name, "java.util.Collection"))
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("config", &self.config)
            .field("field_summary", &self.field_summary.is_some())
            .field("hierarchy", &self.hierarchy.is_some())
            .finish()
    }
}
