//! This module contains constants that are needed throughout the codebase.

/// The hard cap on fixed-point iterations over a single method body.
///
/// A method whose jump tables are still changing after this many passes is
/// abandoned with the last snapshots seen; the analyzer logs a warning and
/// the results remain usable as a best-effort approximation.
pub const MAXIMUM_ITERATIONS: usize = 40;

/// The iteration count above which convergence is considered slow enough to
/// be worth reporting in the logs, even though it succeeded.
pub const SLOW_CONVERGENCE_THRESHOLD: usize = 20;

/// The value signature used for the synthetic item handed out when a client
/// reads beyond the bottom of the operand stack.
///
/// The signature is deliberately not a real class so that no detector can
/// mistake the placeholder for a genuine value.
pub const STACK_ERROR_SIGNATURE: &str = "Lanalysis/OpcodeStackError;";

/// The register number recorded for a value loaded from a static field,
/// where no object register is involved.
pub const STATIC_FIELD_REGISTER: i32 = i32::MAX;

/// The register number meaning "no register association".
pub const NO_REGISTER: i32 = -1;

/// The signature every reference value defaults to when nothing more
/// precise is known.
pub const JAVA_LANG_OBJECT: &str = "Ljava/lang/Object;";

/// The signature of the throwable root, used for exception handlers with no
/// declared catch type.
pub const JAVA_LANG_THROWABLE: &str = "Ljava/lang/Throwable;";

/// The environment variable that switches on verbose per-opcode state
/// dumps.
pub const DEBUG_ENV_VAR: &str = "OCSTACK_DEBUG";
