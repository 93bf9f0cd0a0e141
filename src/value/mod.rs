//! This module contains the lattice element of the analysis: the [`Item`],
//! one abstract value occupying one operand-stack slot or local register.
//!
//! Items carry a static type, an optional known constant, an optional
//! provenance source (the field or method the value came from), a
//! [`SpecialKind`] label, and bookkeeping that ties the value back to the
//! register it mirrors. They are cheap to clone; every confluence produces
//! fresh items rather than mutating shared ones.

pub mod constant;
pub mod kind;

use std::rc::Rc;

use derivative::Derivative;
use downcast_rs::{impl_downcast, Downcast};
use serde::{Deserialize, Serialize};

pub use crate::value::{constant::Constant, kind::SpecialKind};
use crate::{
    constant::{JAVA_LANG_OBJECT, NO_REGISTER},
    method::{FieldRef, MethodRef},
};

/// Opaque data a detector can attach to an item.
///
/// The interpreter never inspects user values; it preserves them through
/// copies and keeps them at merges only when both sides carry the same
/// attachment (by pointer).
pub trait UserValue: std::fmt::Debug + Downcast {}
impl_downcast!(UserValue);

/// The origin of a value that was produced by a field load or a method
/// call.
///
/// Sources are interned behind [`Rc`] and shared freely between items; the
/// analysis never mutates them.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Source {
    /// The value was loaded from this field.
    Field(Rc<FieldRef>),

    /// The value is the return value of this method.
    Method(Rc<MethodRef>),
}

/// Where and as what an attacker-controlled HTTP value entered the method.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HttpParameterInjection {
    /// The request parameter name, when it was a string constant at the
    /// call site.
    pub parameter_name: Option<String>,

    /// The pc of the call that produced the tainted value.
    pub pc: u32,
}

const IS_INITIAL_PARAMETER_FLAG: u8 = 1;
const COULD_BE_ZERO_FLAG: u8 = 2;
const IS_NULL_FLAG: u8 = 4;

/// One abstract value.
///
/// # Equality
///
/// Structural equality deliberately ignores the producing `pc`, so that the
/// same value reaching a join point along two paths compares equal and the
/// fixed-point iteration can converge. User values are compared by pointer.
#[derive(Clone, Debug, Derivative, Deserialize, Serialize)]
#[derivative(PartialEq)]
pub struct Item {
    signature: String,
    constant: Option<Constant>,
    source: Option<Source>,
    special_kind: SpecialKind,
    flags: u8,
    register_number: i32,
    field_loaded_from_register: i32,
    #[derivative(PartialEq = "ignore")]
    pc: i32,
    #[derivative(PartialEq(compare_with = "user_value_eq"))]
    #[serde(skip)]
    user_value: Option<Rc<dyn UserValue>>,
    injection: Option<HttpParameterInjection>,
}

impl Eq for Item {}

fn user_value_eq(a: &Option<Rc<dyn UserValue>>, b: &Option<Rc<dyn UserValue>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

impl Item {
    /// Creates a value of a type about which nothing else is known.
    ///
    /// `B` and `C` signatures seed the [`SpecialKind::SIGNED_BYTE`] and
    /// [`SpecialKind::NON_NEGATIVE`] labels, since those properties follow
    /// from the type alone.
    #[must_use]
    pub fn typed(signature: impl Into<String>) -> Self {
        let mut item = Self::raw(signature.into());
        item.seed_kind_from_signature();
        item
    }

    /// Creates a value with a known constant.
    #[must_use]
    pub fn with_constant(signature: impl Into<String>, constant: impl Into<Constant>) -> Self {
        let mut item = Self::typed(signature);
        let constant = constant.into();
        match constant {
            Constant::Int(v) => {
                if v != 0 && (v & 0xff) == 0 {
                    item.special_kind = SpecialKind::LOW_8_BITS_CLEAR;
                }
                if v == 0 {
                    item.set_flag(true, COULD_BE_ZERO_FLAG);
                }
            }
            Constant::Long(v) => {
                if v != 0 && (v & 0xff) == 0 {
                    item.special_kind = SpecialKind::LOW_8_BITS_CLEAR;
                }
                if v == 0 {
                    item.set_flag(true, COULD_BE_ZERO_FLAG);
                }
            }
            _ => {}
        }
        item.constant = Some(constant);
        item
    }

    /// Creates a value loaded from `field`, recording the register holding
    /// the object it was loaded from ([`crate::constant::STATIC_FIELD_REGISTER`]
    /// for statics).
    #[must_use]
    pub fn from_field(
        signature: impl Into<String>,
        field: Rc<FieldRef>,
        loaded_from_register: i32,
    ) -> Self {
        let mut item = Self::raw(signature.into());
        item.source = Some(Source::Field(field));
        item.field_loaded_from_register = loaded_from_register;
        item
    }

    /// Creates a copy of `other` reinterpreted under `signature`.
    ///
    /// Numeric constants are truncated or widened to match the new type; a
    /// non-reference target type drops any provenance source, because a
    /// primitive cannot be the object a field was read from.
    #[must_use]
    pub fn retyped(other: &Item, signature: impl Into<String>) -> Self {
        let mut item = other.clone();
        item.signature = signature.into();
        if let Some(constant) = &item.constant {
            item.constant = Some(constant.converted_to(&item.signature));
        }
        let first = item.signature.chars().next();
        if !matches!(first, Some('L' | '[')) {
            item.source = None;
        }
        item.seed_kind_from_signature();
        item
    }

    /// Creates a copy of `other` mirroring `register`.
    #[must_use]
    pub fn with_register(other: &Item, register: i32) -> Self {
        let mut item = other.clone();
        item.register_number = register;
        item
    }

    /// Creates the untyped null literal.
    #[must_use]
    pub fn null() -> Self {
        let mut item = Self::raw(JAVA_LANG_OBJECT.to_string());
        item.set_flag(true, IS_NULL_FLAG);
        item
    }

    /// Creates a null of a known reference type.
    #[must_use]
    pub fn null_of(signature: impl Into<String>) -> Self {
        let mut item = Self::typed(signature);
        item.constant = None;
        item.set_flag(true, IS_NULL_FLAG);
        item
    }

    /// Creates the value of an incoming method argument living in
    /// `register`.
    #[must_use]
    pub fn initial_argument(signature: impl Into<String>, register: i32) -> Self {
        let mut item = Self::typed(signature);
        item.set_flag(true, IS_INITIAL_PARAMETER_FLAG);
        item.register_number = register;
        item
    }

    /// Creates a value about which only the type is known; merging prefers
    /// the other side over this one.
    #[must_use]
    pub fn type_only(signature: impl Into<String>) -> Self {
        let mut item = Self::raw(signature.into());
        item.special_kind = SpecialKind::TYPE_ONLY;
        item
    }

    fn raw(signature: String) -> Self {
        Self {
            signature,
            constant: None,
            source: None,
            special_kind: SpecialKind::NOT_SPECIAL,
            flags: 0,
            register_number: NO_REGISTER,
            field_loaded_from_register: NO_REGISTER,
            pc: -1,
            user_value: None,
            injection: None,
        }
    }

    fn seed_kind_from_signature(&mut self) {
        if self.signature == "B" {
            self.special_kind = SpecialKind::SIGNED_BYTE;
        } else if self.signature == "C" {
            self.special_kind = SpecialKind::NON_NEGATIVE;
        }
    }

    /// Gets the JVM type signature of the value. An empty signature means
    /// the type was lost at a confluence of disagreeing types.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Gets the known constant, if any.
    #[must_use]
    pub fn constant(&self) -> Option<&Constant> {
        self.constant.as_ref()
    }

    /// Replaces the known constant.
    pub fn set_constant(&mut self, constant: Option<Constant>) {
        self.constant = constant;
    }

    /// Gets the provenance source, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Gets the field this value was loaded from, if its source is a field.
    #[must_use]
    pub fn field(&self) -> Option<&Rc<FieldRef>> {
        match &self.source {
            Some(Source::Field(field)) => Some(field),
            _ => None,
        }
    }

    /// Gets the method this value was returned from, if its source is a
    /// method call.
    #[must_use]
    pub fn return_value_of(&self) -> Option<&Rc<MethodRef>> {
        match &self.source {
            Some(Source::Method(method)) => Some(method),
            _ => None,
        }
    }

    /// Marks this value as the return value of `method`.
    pub fn set_returned_by(&mut self, method: Rc<MethodRef>) {
        self.source = Some(Source::Method(method));
    }

    /// Replaces the provenance source wholesale.
    pub fn set_source(&mut self, source: Option<Source>) {
        self.source = source;
    }

    /// Records that this value was loaded from `field` via the object in
    /// `register`, or erases field provenance when `field` is [`None`].
    pub fn set_loaded_from_field(&mut self, field: Option<Rc<FieldRef>>, register: i32) {
        self.source = field.map(Source::Field);
        self.field_loaded_from_register = register;
        self.register_number = NO_REGISTER;
    }

    /// Gets the special-kind label.
    #[must_use]
    pub fn special_kind(&self) -> SpecialKind {
        self.special_kind
    }

    /// Sets the special-kind label.
    pub fn set_special_kind(&mut self, kind: SpecialKind) {
        self.special_kind = kind;
    }

    /// Creates a copy of this item with a different special kind.
    #[must_use]
    pub fn clone_with_kind(&self, kind: SpecialKind) -> Self {
        let mut item = self.clone();
        item.special_kind = kind;
        item
    }

    /// Gets the pc at which the value was produced, or −1 when unknown.
    #[must_use]
    pub fn pc(&self) -> i32 {
        self.pc
    }

    /// Sets the producing pc.
    pub fn set_pc(&mut self, pc: i32) {
        self.pc = pc;
    }

    /// Gets the register this value currently mirrors, or −1.
    #[must_use]
    pub fn register_number(&self) -> i32 {
        self.register_number
    }

    /// Sets the mirrored register.
    pub fn set_register_number(&mut self, register: i32) {
        self.register_number = register;
    }

    /// If this value was loaded from an instance field, gets the register
    /// containing the object the field was loaded from;
    /// [`crate::constant::STATIC_FIELD_REGISTER`] for a static field; −1
    /// when unknown.
    #[must_use]
    pub fn field_loaded_from_register(&self) -> i32 {
        self.field_loaded_from_register
    }

    pub(crate) fn set_field_loaded_from_register(&mut self, register: i32) {
        self.field_loaded_from_register = register;
    }

    /// Erases the bookkeeping that only makes sense within a single method
    /// body, so the item can serve as a cross-method summary.
    pub fn make_cross_method(&mut self) {
        self.pc = -1;
        self.register_number = NO_REGISTER;
        self.field_loaded_from_register = NO_REGISTER;
    }

    /// Gets the detector-attached user value.
    #[must_use]
    pub fn user_value(&self) -> Option<&Rc<dyn UserValue>> {
        self.user_value.as_ref()
    }

    /// Attaches a detector-specified value to this item.
    pub fn set_user_value(&mut self, value: Option<Rc<dyn UserValue>>) {
        self.user_value = value;
    }

    /// Gets the number of abstract stack slots the value occupies: 2 for
    /// `long` and `double`, 1 otherwise.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.signature == "J" || self.signature == "D" {
            2
        } else {
            1
        }
    }

    /// Checks whether the value is a two-slot primitive.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.size() == 2
    }

    /// Checks whether the value is the null reference.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.flags & IS_NULL_FLAG != 0
    }

    /// Checks whether the value still holds the method's incoming argument
    /// unchanged.
    #[must_use]
    pub fn is_initial_parameter(&self) -> bool {
        self.flags & IS_INITIAL_PARAMETER_FLAG != 0
    }

    pub(crate) fn set_initial_parameter(&mut self, value: bool) {
        self.set_flag(value, IS_INITIAL_PARAMETER_FLAG);
    }

    /// Checks whether the value may be zero: either the flag was set at a
    /// confluence or the constant is a known zero.
    #[must_use]
    pub fn could_be_zero(&self) -> bool {
        self.flags & COULD_BE_ZERO_FLAG != 0 || self.is_constant_zero()
    }

    /// Sets the could-be-zero flag.
    pub fn set_could_be_zero(&mut self, value: bool) {
        self.set_flag(value, COULD_BE_ZERO_FLAG);
    }

    /// Checks whether the value is a known numeric zero.
    #[must_use]
    pub fn must_be_zero(&self) -> bool {
        self.is_constant_zero()
    }

    fn is_constant_zero(&self) -> bool {
        self.constant.as_ref().is_some_and(Constant::is_zero)
    }

    /// Checks whether the value is an array type.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.signature.starts_with('[')
    }

    /// Checks whether the value is a primitive type.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !self.signature.starts_with('L') && !self.signature.starts_with('[')
    }

    /// Checks whether the value is known to be non-negative, either by its
    /// label or by its constant.
    #[must_use]
    pub fn is_non_negative(&self) -> bool {
        if self.special_kind == SpecialKind::NON_NEGATIVE {
            return true;
        }
        self.constant
            .as_ref()
            .and_then(Constant::as_f64)
            .is_some_and(|value| value >= 0.0)
    }

    /// Drops a non-negativity label, used after a narrowing conversion that
    /// can reintroduce the sign bit.
    pub fn set_could_be_negative(&mut self) {
        if self.special_kind == SpecialKind::NON_NEGATIVE {
            self.special_kind = SpecialKind::NOT_SPECIAL;
        }
    }

    /// Checks whether the label says this value can take negative values of
    /// unbounded magnitude.
    #[must_use]
    pub fn value_could_be_negative(&self) -> bool {
        !self.is_non_negative()
            && matches!(
                self.special_kind,
                SpecialKind::RANDOM_INT
                    | SpecialKind::SIGNED_BYTE
                    | SpecialKind::HASHCODE_INT
                    | SpecialKind::RANDOM_INT_REMAINDER
                    | SpecialKind::HASHCODE_INT_REMAINDER
                    | SpecialKind::MATH_ABS_OF_RANDOM
                    | SpecialKind::MATH_ABS_OF_HASHCODE
            )
    }

    /// Checks whether the value could be `Integer.MIN_VALUE`, for which
    /// `Math.abs` is still negative.
    #[must_use]
    pub fn check_for_integer_min_value(&self) -> bool {
        !self.is_non_negative()
            && matches!(
                self.special_kind,
                SpecialKind::RANDOM_INT | SpecialKind::HASHCODE_INT
            )
    }

    /// Checks whether the value is the absolute value of something that
    /// might have been `Integer.MIN_VALUE`, and so is negative on rare
    /// inputs.
    #[must_use]
    pub fn might_rarely_be_negative(&self) -> bool {
        !self.is_non_negative()
            && matches!(
                self.special_kind,
                SpecialKind::MATH_ABS_OF_RANDOM | SpecialKind::MATH_ABS_OF_HASHCODE
            )
    }

    /// Gets the label the value's `Math.abs` result should carry.
    #[must_use]
    pub fn kind_for_abs(&self) -> SpecialKind {
        match self.special_kind {
            SpecialKind::HASHCODE_INT => SpecialKind::MATH_ABS_OF_HASHCODE,
            SpecialKind::RANDOM_INT => SpecialKind::MATH_ABS_OF_RANDOM,
            _ => SpecialKind::MATH_ABS,
        }
    }

    /// Gets the label the value's remainder should carry.
    #[must_use]
    pub fn kind_for_remainder(&self) -> SpecialKind {
        match self.special_kind {
            SpecialKind::HASHCODE_INT => SpecialKind::HASHCODE_INT_REMAINDER,
            SpecialKind::RANDOM_INT => SpecialKind::RANDOM_INT_REMAINDER,
            _ => SpecialKind::NOT_SPECIAL,
        }
    }

    /// Checks whether the value is freshly allocated.
    #[must_use]
    pub fn is_newly_allocated(&self) -> bool {
        self.special_kind == SpecialKind::NEWLY_ALLOCATED
    }

    /// Forgets the fresh-allocation label, for values that escape.
    ///
    /// A string builder additionally forgets its accumulated constant, as
    /// an escaped builder can be appended to from anywhere.
    pub fn clear_newly_allocated(&mut self) {
        if self.special_kind == SpecialKind::NEWLY_ALLOCATED {
            if self.signature.starts_with("Ljava/lang/StringB") {
                self.constant = None;
            }
            self.special_kind = SpecialKind::NOT_SPECIAL;
        }
    }

    /// Checks whether the value is one of the synthetic booleans encoding a
    /// nullness test.
    #[must_use]
    pub fn is_boolean_nullness_value(&self) -> bool {
        matches!(
            self.special_kind,
            SpecialKind::ZERO_MEANS_NULL | SpecialKind::NONZERO_MEANS_NULL
        )
    }

    /// Checks whether the constant is a number equal to `value`.
    #[must_use]
    pub fn has_constant_i32(&self, value: i32) -> bool {
        self.constant
            .as_ref()
            .and_then(Constant::as_i32)
            .is_some_and(|v| v == value)
    }

    /// Checks whether the constant is a number equal to `value`.
    #[must_use]
    pub fn has_constant_i64(&self, value: i64) -> bool {
        self.constant
            .as_ref()
            .and_then(Constant::as_i64)
            .is_some_and(|v| v == value)
    }

    /// Checks whether the value is tainted by an HTTP request.
    #[must_use]
    pub fn is_servlet_parameter_tainted(&self) -> bool {
        self.special_kind == SpecialKind::SERVLET_REQUEST_TAINTED
    }

    /// Labels the value as tainted by an HTTP request.
    pub fn set_servlet_parameter_tainted(&mut self) {
        self.special_kind = SpecialKind::SERVLET_REQUEST_TAINTED;
    }

    /// Labels the value as a servlet-response writer.
    pub fn set_is_servlet_writer(&mut self) {
        self.special_kind = SpecialKind::SERVLET_OUTPUT;
    }

    /// Checks whether the value writes to a servlet response: either
    /// labelled as such, typed as a servlet output stream, or returned from
    /// `getWriter`/`getOutputStream` on a servlet response.
    #[must_use]
    pub fn is_servlet_writer(&self) -> bool {
        if self.special_kind == SpecialKind::SERVLET_OUTPUT {
            return true;
        }
        if self.signature == "Ljavax/servlet/ServletOutputStream;"
            || self.signature == "Ljakarta/servlet/ServletOutputStream;"
        {
            return true;
        }
        self.return_value_of().is_some_and(|method| {
            matches!(
                method.class_name.as_str(),
                "javax/servlet/http/HttpServletResponse"
                    | "jakarta/servlet/http/HttpServletResponse"
            ) && matches!(method.name.as_str(), "getWriter" | "getOutputStream")
        })
    }

    /// Gets the injection record, when the value is tainted.
    #[must_use]
    pub fn injection(&self) -> Option<&HttpParameterInjection> {
        self.injection.as_ref()
    }

    /// Sets the injection record.
    pub fn set_injection(&mut self, injection: Option<HttpParameterInjection>) {
        self.injection = injection;
    }

    /// Gets the HTTP parameter name a tainted value was read from, when it
    /// was a constant at the call site.
    #[must_use]
    pub fn http_parameter_name(&self) -> Option<&str> {
        self.injection
            .as_ref()
            .and_then(|injection| injection.parameter_name.as_deref())
    }

    /// Gets the pc of the call that introduced the taint.
    #[must_use]
    pub fn injection_pc(&self) -> Option<u32> {
        self.injection.as_ref().map(|injection| injection.pc)
    }

    /// Checks whether `other` is observably the same runtime value: equal
    /// and anchored to the same register or loaded from a field through a
    /// known register.
    #[must_use]
    pub fn same_value(&self, other: &Item) -> bool {
        self == other
            && (self.register_number != NO_REGISTER
                && self.register_number == other.register_number
                || self.field_loaded_from_register != NO_REGISTER)
    }

    fn set_flag(&mut self, value: bool, flag: u8) {
        if value {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Computes the confluence of two items meeting at a control-flow join.
    ///
    /// The result is less precise than (or equal to) both inputs: shared
    /// facts survive, disagreements are dropped, and the only labels that
    /// win over a disagreement are the taint label (with its injection
    /// record) and the float-math severities.
    #[must_use]
    pub fn merge(a: &Item, b: &Item) -> Item {
        if a == b {
            return a.clone();
        }
        if a.special_kind == SpecialKind::TYPE_ONLY
            && b.special_kind != SpecialKind::TYPE_ONLY
        {
            return b.clone();
        }
        if b.special_kind == SpecialKind::TYPE_ONLY
            && a.special_kind != SpecialKind::TYPE_ONLY
        {
            return a.clone();
        }

        let mut merged = Item::raw(String::new());
        merged.flags = a.flags & b.flags;
        merged.set_flag(
            a.could_be_zero() || b.could_be_zero(),
            COULD_BE_ZERO_FLAG,
        );
        if a.pc == b.pc {
            merged.pc = a.pc;
        }
        if a.signature == b.signature {
            merged.signature = a.signature.clone();
        } else if a.is_null() {
            merged.signature = b.signature.clone();
        } else if b.is_null() {
            merged.signature = a.signature.clone();
        }
        if a.constant == b.constant {
            merged.constant = a.constant.clone();
        }
        if a.source == b.source {
            merged.source = a.source.clone();
        } else if a.constant.as_ref().and_then(Constant::as_str) == Some("") {
            merged.source = b.source.clone();
        } else if b.constant.as_ref().and_then(Constant::as_str) == Some("") {
            merged.source = a.source.clone();
        }
        if user_value_eq(&a.user_value, &b.user_value) {
            merged.user_value = a.user_value.clone();
        }
        if a.register_number == b.register_number {
            merged.register_number = a.register_number;
        }
        if a.field_loaded_from_register == b.field_loaded_from_register {
            merged.field_loaded_from_register = a.field_loaded_from_register;
        }

        if a.special_kind == SpecialKind::SERVLET_REQUEST_TAINTED {
            merged.special_kind = SpecialKind::SERVLET_REQUEST_TAINTED;
            merged.injection = a.injection.clone();
        } else if b.special_kind == SpecialKind::SERVLET_REQUEST_TAINTED {
            merged.special_kind = SpecialKind::SERVLET_REQUEST_TAINTED;
            merged.injection = b.injection.clone();
        } else if a.special_kind == b.special_kind {
            merged.special_kind = a.special_kind;
        } else if a.special_kind == SpecialKind::NASTY_FLOAT_MATH
            || b.special_kind == SpecialKind::NASTY_FLOAT_MATH
        {
            merged.special_kind = SpecialKind::NASTY_FLOAT_MATH;
        } else if a.special_kind == SpecialKind::FLOAT_MATH
            || b.special_kind == SpecialKind::FLOAT_MATH
        {
            merged.special_kind = SpecialKind::FLOAT_MATH;
        }

        merged
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "< {}", self.signature)?;
        if self.special_kind != SpecialKind::NOT_SPECIAL {
            write!(f, ", {}", self.special_kind)?;
        }
        if let Some(constant) = &self.constant {
            write!(f, ", {constant}")?;
        }
        match &self.source {
            Some(Source::Field(field)) => {
                write!(f, ", ")?;
                if self.field_loaded_from_register != NO_REGISTER
                    && self.field_loaded_from_register != crate::constant::STATIC_FIELD_REGISTER
                {
                    write!(f, "{}:", self.field_loaded_from_register)?;
                }
                write!(f, "{field}")?;
            }
            Some(Source::Method(method)) => write!(f, ", return value from {method}")?,
            None => {}
        }
        if self.is_initial_parameter() {
            write!(f, ", IP")?;
        }
        if self.is_null() {
            write!(f, ", isNull")?;
        }
        if self.register_number != NO_REGISTER {
            write!(f, ", r{}", self.register_number)?;
        }
        if self.could_be_zero() && !self.is_constant_zero() {
            write!(f, ", cbz")?;
        }
        if let Some(user_value) = &self.user_value {
            write!(f, ", uv: {user_value:?}")?;
        }
        write!(f, " >")
    }
}

#[cfg(test)]
mod test {
    use super::{Constant, HttpParameterInjection, Item, SpecialKind};

    #[test]
    fn wide_signatures_occupy_two_slots() {
        assert_eq!(Item::typed("J").size(), 2);
        assert_eq!(Item::typed("D").size(), 2);
        assert_eq!(Item::typed("I").size(), 1);
        assert_eq!(Item::typed("Ljava/lang/Object;").size(), 1);
        assert!(Item::typed("D").is_wide());
    }

    #[test]
    fn signature_seeds_special_kinds() {
        assert_eq!(Item::typed("B").special_kind(), SpecialKind::SIGNED_BYTE);
        assert_eq!(Item::typed("C").special_kind(), SpecialKind::NON_NEGATIVE);
        assert_eq!(Item::typed("I").special_kind(), SpecialKind::NOT_SPECIAL);
    }

    #[test]
    fn constants_with_clear_low_byte_are_labelled() {
        assert_eq!(
            Item::with_constant("I", 0x100).special_kind(),
            SpecialKind::LOW_8_BITS_CLEAR
        );
        assert_eq!(
            Item::with_constant("I", 0x101).special_kind(),
            SpecialKind::NOT_SPECIAL
        );
        assert!(Item::with_constant("I", 0).could_be_zero());
    }

    #[test]
    fn retyping_converts_the_constant_and_drops_sources() {
        let original = Item::with_constant("I", 0x1ff);
        let narrowed = Item::retyped(&original, "B");
        assert_eq!(narrowed.constant(), Some(&Constant::Int(-1)));
        assert_eq!(narrowed.special_kind(), SpecialKind::SIGNED_BYTE);

        let widened = Item::retyped(&original, "J");
        assert_eq!(widened.constant(), Some(&Constant::Long(0x1ff)));
    }

    #[test]
    fn null_items_are_null_with_no_constant() {
        let null = Item::null();
        assert!(null.is_null());
        assert!(null.constant().is_none());
        assert_eq!(null.signature(), "Ljava/lang/Object;");
        assert!(Item::null_of("Ljava/lang/String;").is_null());
    }

    #[test]
    fn merge_is_idempotent() {
        let item = Item::with_constant("I", 3);
        assert_eq!(Item::merge(&item, &item), item);
    }

    #[test]
    fn merge_keeps_agreement_and_drops_disagreement() {
        let a = Item::with_constant("I", 3);
        let b = Item::with_constant("I", 4);
        let merged = Item::merge(&a, &b);
        assert_eq!(merged.signature(), "I");
        assert!(merged.constant().is_none());

        let c = Item::typed("J");
        let merged = Item::merge(&a, &c);
        assert_eq!(merged.signature(), "");
    }

    #[test]
    fn merge_adopts_the_non_null_signature() {
        let merged = Item::merge(&Item::null(), &Item::typed("Ljava/lang/String;"));
        assert_eq!(merged.signature(), "Ljava/lang/String;");
        assert!(!merged.is_null());
    }

    #[test]
    fn merge_prefers_the_informative_side_over_type_only() {
        let known = Item::with_constant("I", 1);
        let merged = Item::merge(&Item::type_only("I"), &known);
        assert_eq!(merged, known);
    }

    #[test]
    fn merge_unions_could_be_zero() {
        let zero = Item::with_constant("I", 0);
        let other = Item::typed("I");
        assert!(Item::merge(&zero, &other).could_be_zero());
    }

    #[test]
    fn taint_dominates_a_merge_and_keeps_its_injection() {
        let mut tainted = Item::typed("Ljava/lang/String;");
        tainted.set_servlet_parameter_tainted();
        tainted.set_injection(Some(HttpParameterInjection {
            parameter_name: Some("q".into()),
            pc: 7,
        }));
        let clean = Item::typed("Ljava/lang/String;");

        let merged = Item::merge(&clean, &tainted);
        assert!(merged.is_servlet_parameter_tainted());
        assert_eq!(merged.http_parameter_name(), Some("q"));
    }

    #[test]
    fn float_math_severity_orders_the_kind_merge() {
        let nasty = Item::typed("D").clone_with_kind(SpecialKind::NASTY_FLOAT_MATH);
        let float = Item::typed("D").clone_with_kind(SpecialKind::FLOAT_MATH);
        let plain = Item::typed("D");

        assert_eq!(
            Item::merge(&nasty, &float).special_kind(),
            SpecialKind::NASTY_FLOAT_MATH
        );
        assert_eq!(
            Item::merge(&float, &plain).special_kind(),
            SpecialKind::FLOAT_MATH
        );
        let sum = Item::typed("I").clone_with_kind(SpecialKind::INTEGER_SUM);
        let random = Item::typed("I").clone_with_kind(SpecialKind::RANDOM_INT);
        assert_eq!(
            Item::merge(&sum, &random).special_kind(),
            SpecialKind::NOT_SPECIAL
        );
    }

    #[test]
    fn equality_ignores_the_producing_pc() {
        let mut a = Item::typed("I");
        let mut b = Item::typed("I");
        a.set_pc(3);
        b.set_pc(9);
        assert_eq!(a, b);
    }

    #[test]
    fn negative_value_predicates_respect_non_negativity() {
        let random = Item::typed("I").clone_with_kind(SpecialKind::RANDOM_INT);
        assert!(random.value_could_be_negative());
        assert!(random.check_for_integer_min_value());

        let abs = random.clone_with_kind(SpecialKind::MATH_ABS_OF_RANDOM);
        assert!(abs.might_rarely_be_negative());
        assert!(!abs.check_for_integer_min_value());

        let constant = Item::with_constant("I", 5);
        assert!(constant.is_non_negative());
        assert!(!constant.value_could_be_negative());
    }

    #[test]
    fn abs_and_remainder_kind_transitions() {
        let hash = Item::typed("I").clone_with_kind(SpecialKind::HASHCODE_INT);
        assert_eq!(hash.kind_for_abs(), SpecialKind::MATH_ABS_OF_HASHCODE);
        assert_eq!(hash.kind_for_remainder(), SpecialKind::HASHCODE_INT_REMAINDER);
        assert_eq!(Item::typed("I").kind_for_abs(), SpecialKind::MATH_ABS);
        assert_eq!(
            Item::typed("I").kind_for_remainder(),
            SpecialKind::NOT_SPECIAL
        );
    }

    #[test]
    fn escaped_string_builders_forget_their_constant() {
        let mut builder = Item::with_constant("Ljava/lang/StringBuilder;", "abc");
        builder.set_special_kind(SpecialKind::NEWLY_ALLOCATED);
        builder.clear_newly_allocated();
        assert!(builder.constant().is_none());
        assert_eq!(builder.special_kind(), SpecialKind::NOT_SPECIAL);

        let mut other = Item::with_constant("Ljava/lang/String;", "abc");
        other.set_special_kind(SpecialKind::NEWLY_ALLOCATED);
        other.clear_newly_allocated();
        assert!(other.constant().is_some());
    }
}
