//! The special-kind label attached to every abstract value.
//!
//! Kinds form an open set: the tags the transfer function itself
//! understands are predefined associated constants, and detectors can mint
//! additional tags at runtime through [`SpecialKind::define`]. User-defined
//! tags carry no semantics inside the interpreter but survive merging when
//! both sides agree.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU16, Ordering},
        OnceLock,
        RwLock,
    },
};

use serde::{Deserialize, Serialize};

/// A semantic label describing the provenance or a known property of an
/// abstract value.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SpecialKind(u16);

impl SpecialKind {
    /// No label.
    pub const NOT_SPECIAL: SpecialKind = SpecialKind(0);
    /// A `byte`-typed value, which unlike the other integral types may be
    /// negative after widening.
    pub const SIGNED_BYTE: SpecialKind = SpecialKind(1);
    /// The result of a random number generator call.
    pub const RANDOM_INT: SpecialKind = SpecialKind(2);
    /// A non-zero integer whose low eight bits are all clear.
    pub const LOW_8_BITS_CLEAR: SpecialKind = SpecialKind(3);
    /// The result of a hash-code computation.
    pub const HASHCODE_INT: SpecialKind = SpecialKind(4);
    /// The sum of two non-constant integers.
    pub const INTEGER_SUM: SpecialKind = SpecialKind(5);
    /// An average computed as `(a + b) / 2` or `(a + b) >> 1`.
    pub const AVERAGE_COMPUTED_USING_DIVISION: SpecialKind = SpecialKind(6);
    /// The unknown result of floating-point arithmetic.
    pub const FLOAT_MATH: SpecialKind = SpecialKind(7);
    /// The remainder of a random value.
    pub const RANDOM_INT_REMAINDER: SpecialKind = SpecialKind(8);
    /// The remainder of a hash code.
    pub const HASHCODE_INT_REMAINDER: SpecialKind = SpecialKind(9);
    /// The platform file-separator string.
    pub const FILE_SEPARATOR_STRING: SpecialKind = SpecialKind(10);
    /// The result of `Math.abs` on an unremarkable value.
    pub const MATH_ABS: SpecialKind = SpecialKind(11);
    /// The result of `Math.abs` on a random value.
    pub const MATH_ABS_OF_RANDOM: SpecialKind = SpecialKind(12);
    /// The result of `Math.abs` on a hash code.
    pub const MATH_ABS_OF_HASHCODE: SpecialKind = SpecialKind(13);
    /// A value that cannot be negative (array lengths, chars, masked
    /// values, values proven non-negative by a branch).
    pub const NON_NEGATIVE: SpecialKind = SpecialKind(14);
    /// Floating-point arithmetic particularly likely to surprise, such as a
    /// division by a non-constant divisor.
    pub const NASTY_FLOAT_MATH: SpecialKind = SpecialKind(15);
    /// A file output stream opened in append mode.
    pub const FILE_OPENED_IN_APPEND_MODE: SpecialKind = SpecialKind(16);
    /// A string that originated from an HTTP request and is attacker
    /// controlled.
    pub const SERVLET_REQUEST_TAINTED: SpecialKind = SpecialKind(17);
    /// A freshly allocated object that cannot alias anything older.
    pub const NEWLY_ALLOCATED: SpecialKind = SpecialKind(18);
    /// An int that encodes the nullness of a reference: zero means the
    /// reference was null.
    pub const ZERO_MEANS_NULL: SpecialKind = SpecialKind(19);
    /// An int that encodes the nullness of a reference: non-zero means the
    /// reference was null.
    pub const NONZERO_MEANS_NULL: SpecialKind = SpecialKind(20);
    /// The result of an `i2l` widening, whose upper half is sign fill.
    pub const RESULT_OF_I2L: SpecialKind = SpecialKind(21);
    /// The result of an `l2i` narrowing, which may have discarded bits.
    pub const RESULT_OF_L2I: SpecialKind = SpecialKind(22);
    /// A writer or output stream that sends its output to a servlet
    /// response.
    pub const SERVLET_OUTPUT: SpecialKind = SpecialKind(23);
    /// A value about which only the type is known; merging prefers the
    /// other side.
    pub const TYPE_ONLY: SpecialKind = SpecialKind(24);

    /// Defines a new special kind with the provided `name`, allocating a
    /// fresh tag.
    ///
    /// The registry is process wide and insert only; tags are never reused.
    #[must_use]
    pub fn define(name: &str) -> Self {
        let kind = SpecialKind(NEXT_KIND.fetch_add(1, Ordering::Relaxed));
        registry()
            .write()
            .expect("special-kind registry poisoned")
            .insert(kind.0, name.to_string());
        kind
    }

    /// Gets the registered name of a user-defined kind, or [`None`] for
    /// core kinds and unknown tags.
    #[must_use]
    pub fn name(self) -> Option<String> {
        registry()
            .read()
            .expect("special-kind registry poisoned")
            .get(&self.0)
            .cloned()
    }

    /// Gets the raw tag value, mostly useful for diagnostics.
    #[must_use]
    pub fn raw(self) -> u16 {
        self.0
    }
}

impl Default for SpecialKind {
    fn default() -> Self {
        Self::NOT_SPECIAL
    }
}

impl std::fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match *self {
            Self::NOT_SPECIAL => "",
            Self::SIGNED_BYTE => "signed_byte",
            Self::RANDOM_INT => "random_int",
            Self::LOW_8_BITS_CLEAR => "low8clear",
            Self::HASHCODE_INT => "hashcode_int",
            Self::INTEGER_SUM => "int_sum",
            Self::AVERAGE_COMPUTED_USING_DIVISION => "average_using_division",
            Self::FLOAT_MATH => "float_math",
            Self::RANDOM_INT_REMAINDER => "random_int_rem",
            Self::HASHCODE_INT_REMAINDER => "hashcode_int_rem",
            Self::FILE_SEPARATOR_STRING => "file_separator_string",
            Self::MATH_ABS => "math_abs",
            Self::MATH_ABS_OF_RANDOM => "abs_of_random",
            Self::MATH_ABS_OF_HASHCODE => "abs_of_hashcode",
            Self::NON_NEGATIVE => "non_negative",
            Self::NASTY_FLOAT_MATH => "nasty_float_math",
            Self::FILE_OPENED_IN_APPEND_MODE => "file_opened_in_append_mode",
            Self::SERVLET_REQUEST_TAINTED => "servlet_request_tainted",
            Self::NEWLY_ALLOCATED => "new",
            Self::ZERO_MEANS_NULL => "zero_means_null",
            Self::NONZERO_MEANS_NULL => "nonzero_means_null",
            Self::RESULT_OF_I2L => "result_of_i2l",
            Self::RESULT_OF_L2I => "result_of_l2i",
            Self::SERVLET_OUTPUT => "servlet_output",
            Self::TYPE_ONLY => "type_only",
            other => {
                return match other.name() {
                    Some(name) => write!(f, "#{}({name})", other.0),
                    None => write!(f, "#{}", other.0),
                };
            }
        };
        write!(f, "{label}")
    }
}

static NEXT_KIND: AtomicU16 = AtomicU16::new(SpecialKind::TYPE_ONLY.0 + 1);

fn registry() -> &'static RwLock<HashMap<u16, String>> {
    static REGISTRY: OnceLock<RwLock<HashMap<u16, String>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod test {
    use super::SpecialKind;

    #[test]
    fn defined_kinds_get_fresh_tags_and_names() {
        let a = SpecialKind::define("sql_query_fragment");
        let b = SpecialKind::define("decoded_base64");
        assert_ne!(a, b);
        assert!(a.raw() > SpecialKind::TYPE_ONLY.raw());
        assert_eq!(a.name().as_deref(), Some("sql_query_fragment"));
        assert_eq!(b.name().as_deref(), Some("decoded_base64"));
    }

    #[test]
    fn core_kinds_have_no_registry_entry() {
        assert_eq!(SpecialKind::RANDOM_INT.name(), None);
        assert_eq!(SpecialKind::NOT_SPECIAL.name(), None);
    }

    #[test]
    fn display_names_are_stable() {
        assert_eq!(SpecialKind::MATH_ABS_OF_RANDOM.to_string(), "abs_of_random");
        assert_eq!(SpecialKind::NOT_SPECIAL.to_string(), "");
    }
}
