//! Modelling of method calls.
//!
//! Most calls are handled generically: pop the arguments (and receiver),
//! push an unknown value of the return type with the callee recorded as its
//! provenance. Layered on top is a set of precise models for the standard
//! library calls the analysis needs to understand exactly: boxing, string
//! builders, collection factories, servlet request sources, random/hash
//! sources, `Math.abs`, and append-mode file streams.

use std::{collections::HashMap, rc::Rc, sync::OnceLock};

use crate::{
    error::{
        analysis::{Error, Result},
        container::Locatable,
    },
    interpreter::Interpreter,
    method::{
        opcode as opc,
        signature::MethodSignature,
        Instruction,
        MethodRef,
        Operand,
    },
    value::{Constant, HttpParameterInjection, Item, SpecialKind},
};

const ARRAYS_ARRAY_LIST: &str = "Ljava/util/Arrays$ArrayList;";
const JAVA_UTIL_COLLECTIONS: &str = "java/util/Collections";

/// Gets the primitive-type name for a boxed-type class, used to recognise
/// both `valueOf` boxing and the `<primitive>Value` unboxing calls.
fn boxed_primitive(class_name: &str) -> Option<&'static str> {
    static BOXED: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    BOXED
        .get_or_init(|| {
            HashMap::from([
                ("java/lang/Boolean", "boolean"),
                ("java/lang/Byte", "byte"),
                ("java/lang/Character", "char"),
                ("java/lang/Short", "short"),
                ("java/lang/Integer", "int"),
                ("java/lang/Long", "long"),
                ("java/lang/Float", "float"),
                ("java/lang/Double", "double"),
            ])
        })
        .get(class_name)
        .copied()
}

/// The factory methods whose concrete (hidden) return type is knowable from
/// the call site alone.
fn immutable_returner(class_name: &str, method: &str) -> Option<&'static str> {
    let returned = match (class_name, method) {
        (JAVA_UTIL_COLLECTIONS, "emptyList") => "Ljava/util/Collections$EmptyList;",
        (JAVA_UTIL_COLLECTIONS, "emptyMap") => "Ljava/util/Collections$EmptyMap;",
        (JAVA_UTIL_COLLECTIONS, "emptyNavigableMap" | "emptySortedMap") => {
            "Ljava/util/Collections$EmptyNavigableMap;"
        }
        (JAVA_UTIL_COLLECTIONS, "emptySet") => "Ljava/util/Collections$EmptySet;",
        (JAVA_UTIL_COLLECTIONS, "emptyNavigableSet" | "emptySortedSet") => {
            "Ljava/util/Collections$EmptyNavigableSet;"
        }
        (JAVA_UTIL_COLLECTIONS, "singletonList") => "Ljava/util/Collections$SingletonList;",
        (JAVA_UTIL_COLLECTIONS, "singletonMap") => "Ljava/util/Collections$SingletonMap;",
        (JAVA_UTIL_COLLECTIONS, "singleton") => "Ljava/util/Collections$SingletonSet;",
        (JAVA_UTIL_COLLECTIONS, "unmodifiableList") => {
            "Ljava/util/Collections$UnmodifiableList;"
        }
        (JAVA_UTIL_COLLECTIONS, "unmodifiableMap") => "Ljava/util/Collections$UnmodifiableMap;",
        (JAVA_UTIL_COLLECTIONS, "unmodifiableNavigableMap") => {
            "Ljava/util/Collections$UnmodifiableNavigableMap;"
        }
        (JAVA_UTIL_COLLECTIONS, "unmodifiableSortedMap") => {
            "Ljava/util/Collections$UnmodifiableSortedMap;"
        }
        (JAVA_UTIL_COLLECTIONS, "unmodifiableSet") => "Ljava/util/Collections$UnmodifiableSet;",
        (JAVA_UTIL_COLLECTIONS, "unmodifiableNavigableSet") => {
            "Ljava/util/Collections$UnmodifiableNavigableSet;"
        }
        (JAVA_UTIL_COLLECTIONS, "unmodifiableSortedSet") => {
            "Ljava/util/Collections$UnmodifiableSortedSet;"
        }
        ("java/util/List", "of" | "copyOf") => {
            "Ljava/util/ImmutableCollections$AbstractImmutableList;"
        }
        ("java/util/Map", "of" | "copyOf") => {
            "Ljava/util/ImmutableCollections$AbstractImmutableMap;"
        }
        ("java/util/Set", "of" | "copyOf") => {
            "Ljava/util/ImmutableCollections$AbstractImmutableSet;"
        }
        _ => return None,
    };
    Some(returned)
}

/// The servlet-request interfaces whose reads are attacker controlled, in
/// both the `javax` and `jakarta` namespaces.
fn is_servlet_request_class(class_name: &str) -> bool {
    matches!(
        class_name,
        "javax/servlet/http/HttpServletRequest"
            | "javax/servlet/ServletRequest"
            | "jakarta/servlet/http/HttpServletRequest"
            | "jakarta/servlet/ServletRequest"
    )
}

fn is_servlet_response_class(class_name: &str) -> bool {
    matches!(
        class_name,
        "javax/servlet/http/HttpServletResponse" | "jakarta/servlet/http/HttpServletResponse"
    )
}

fn is_math_class(class_name: &str) -> bool {
    matches!(class_name, "java/lang/Math" | "java/lang/StrictMath")
}

fn is_reference_returner(class_name: &str, method: &str) -> bool {
    class_name == "java/util/Objects" && method == "requireNonNull"
        || class_name == "com/google/common/base/Preconditions" && method == "checkNotNull"
}

impl Interpreter<'_> {
    /// Models an `invokevirtual`/`invokespecial`/`invokestatic`/
    /// `invokeinterface` call.
    #[allow(clippy::too_many_lines)] // One call protocol, one function.
    pub(crate) fn process_method_call(
        &mut self,
        op: u8,
        method: &Rc<MethodRef>,
        pc: u32,
    ) -> Result<()> {
        let class_name = method.class_name.clone();
        let name = method.name.clone();
        let signature = method.signature.clone();
        let parsed = MethodSignature::new(&signature);
        let number_arguments = parsed.argument_count();
        let return_signature = parsed.return_type().to_string();

        let top_item = self.stack.top(pc).ok().cloned();

        // Boxing and unboxing preserve the underlying value; they only
        // reinterpret its type.
        if let Some(primitive) = boxed_primitive(&class_name) {
            let unboxing = name == format!("{primitive}Value");
            let boxing = name == "valueOf" && !signature.contains("String");
            if top_item.is_some() && (boxing || unboxing) {
                let value = self.stack.pop(pc)?;
                let mut new_value = Item::retyped(&value, &return_signature);
                if new_value.source().is_none() {
                    new_value.set_returned_by(method.clone());
                }
                if new_value.special_kind() == SpecialKind::NOT_SPECIAL {
                    match return_signature.as_str() {
                        "B" | "Ljava/lang/Byte;" => {
                            new_value.set_special_kind(SpecialKind::SIGNED_BYTE);
                        }
                        "C" | "Ljava/lang/Character;" => {
                            new_value.set_special_kind(SpecialKind::NON_NEGATIVE);
                        }
                        _ => {}
                    }
                }
                self.stack.push(new_value);
                return Ok(());
            }
        }

        // A string builder passed to an arbitrary callee escapes; its
        // accumulated constant can no longer be trusted.
        for offset in 0..number_arguments.min(self.stack_depth()) {
            let is_builder = self.stack.peek_ref(offset).is_some_and(|item| {
                matches!(
                    item.signature(),
                    "Ljava/lang/StringBuilder;" | "Ljava/lang/StringBuffer;"
                )
            });
            if is_builder {
                self.mark_constant_value_unknown(offset);
            }
        }

        let initializing_servlet_writer = op == opc::INVOKESPECIAL
            && name == "<init>"
            && class_name.starts_with("java/io")
            && class_name.ends_with("Writer")
            && number_arguments > 0
            && self
                .stack
                .peek_ref(number_arguments - 1)
                .is_some_and(Item::is_servlet_writer);

        let top_is_tainted = top_item
            .as_ref()
            .is_some_and(Item::is_servlet_parameter_tainted);
        let injection = top_item
            .as_ref()
            .filter(|item| item.is_servlet_parameter_tainted())
            .and_then(|item| item.injection().cloned());

        let mut appender_value: Option<String> = None;
        let mut servlet_tainted = false;
        let mut saw_unknown_append = false;
        let mut sb_item: Option<Item> = None;

        if class_name == "java/lang/StringBuffer" || class_name == "java/lang/StringBuilder" {
            if name == "<init>" {
                if signature == "(Ljava/lang/String;)V" {
                    let argument = self.stack.peek(0);
                    appender_value = argument
                        .constant()
                        .and_then(Constant::as_str)
                        .map(String::from);
                    if argument.is_servlet_parameter_tainted() {
                        servlet_tainted = true;
                    }
                } else if signature == "()V" {
                    appender_value = Some(String::new());
                }
            } else if name == "toString" && self.stack_depth() >= 1 {
                let receiver = self.stack.peek(0);
                appender_value = receiver
                    .constant()
                    .and_then(Constant::as_str)
                    .map(String::from);
                if receiver.is_servlet_parameter_tainted() {
                    servlet_tainted = true;
                }
            } else if name == "append" {
                if !signature.contains("II)") && self.stack_depth() >= 2 {
                    let receiver = self.stack.peek(1);
                    let argument = self.stack.peek(0);
                    if argument.is_servlet_parameter_tainted()
                        || receiver.is_servlet_parameter_tainted()
                    {
                        servlet_tainted = true;
                    }
                    match (receiver.constant(), argument.constant()) {
                        (Some(prefix), Some(suffix)) => {
                            appender_value =
                                Some(format!("{}{}", prefix.concat_text(), suffix.concat_text()));
                        }
                        _ => self.mark_constant_value_unknown(1),
                    }
                    sb_item = Some(receiver);
                } else if signature.starts_with("([CII)") {
                    saw_unknown_append = true;
                    sb_item = Some(self.stack.peek(3));
                    self.mark_constant_value_unknown(3);
                } else {
                    saw_unknown_append = true;
                }
            }
        } else if op == opc::INVOKESPECIAL
            && class_name == "java/io/FileOutputStream"
            && name == "<init>"
            && (signature == "(Ljava/io/File;Z)V" || signature == "(Ljava/lang/String;Z)V")
            && self.stack_depth() > 3
        {
            if self.stack.peek(0).has_constant_i32(1) {
                self.stack.pop_n(3, pc)?;
                let source = method.clone();
                if let Some(new_top) = self.stack.peek_mut(0) {
                    if new_top.signature() == "Ljava/io/FileOutputStream;" {
                        new_top.set_special_kind(SpecialKind::FILE_OPENED_IN_APPEND_MODE);
                        new_top.set_returned_by(source);
                        new_top.set_pc(pc as i32);
                    }
                }
                return Ok(());
            }
        } else if op == opc::INVOKESPECIAL
            && class_name == "java/io/BufferedOutputStream"
            && name == "<init>"
            && signature == "(Ljava/io/OutputStream;)V"
        {
            let wrapping_append_stream = self.stack.peek(0).special_kind()
                == SpecialKind::FILE_OPENED_IN_APPEND_MODE
                && self.stack.peek(2).signature() == "Ljava/io/BufferedOutputStream;";
            if wrapping_append_stream {
                self.stack.pop_n(2, pc)?;
                let source = method.clone();
                if let Some(new_top) = self.stack.peek_mut(0) {
                    new_top.set_special_kind(SpecialKind::FILE_OPENED_IN_APPEND_MODE);
                    new_top.set_returned_by(source);
                    new_top.set_pc(pc as i32);
                }
                return Ok(());
            }
        } else if is_servlet_request_class(&class_name)
            && matches!(name.as_str(), "getParameter" | "getQueryString" | "getHeader")
        {
            let parameter_name = if name == "getParameter" || name == "getHeader" {
                let argument = self.stack.pop(pc)?;
                argument
                    .constant()
                    .and_then(Constant::as_str)
                    .filter(|_| name == "getParameter")
                    .map(String::from)
            } else {
                None
            };
            self.stack.pop(pc)?;
            let mut result = Item::typed("Ljava/lang/String;");
            result.set_servlet_parameter_tainted();
            result.set_returned_by(method.clone());
            result.set_injection(Some(HttpParameterInjection {
                parameter_name,
                pc,
            }));
            result.set_pc(pc as i32);
            self.stack.push(result);
            return Ok(());
        } else if op == opc::INVOKESTATIC && name == "asList" && class_name == "java/util/Arrays"
        {
            self.stack.pop(pc)?;
            self.stack.push(Item::typed(ARRAYS_ARRAY_LIST));
            return Ok(());
        } else if op == opc::INVOKESTATIC {
            let request_parameter = (signature == "(Ljava/util/List;)Ljava/util/List;"
                && class_name == JAVA_UTIL_COLLECTIONS)
                .then(|| self.stack.top(pc).ok().cloned())
                .flatten();
            if let Some(returned) = immutable_returner(&class_name, &name) {
                self.stack.pop_n(number_arguments, pc)?;
                let wraps_array_view = request_parameter
                    .as_ref()
                    .is_some_and(|parameter| parameter.signature() == ARRAYS_ARRAY_LIST);
                let result = if wraps_array_view {
                    Item::typed("Ljava/util/Collections$UnmodifiableRandomAccessList;")
                } else {
                    Item::typed(returned)
                };
                self.stack.push(result);
                return Ok(());
            } else if let Some(parameter) = request_parameter {
                self.stack.pop(pc)?;
                if parameter.signature() == ARRAYS_ARRAY_LIST {
                    self.stack.push(Item::typed(ARRAYS_ARRAY_LIST));
                    return Ok(());
                }
                // Fall back to the standard call model.
                self.stack.push(parameter);
            }
        }

        self.push_by_invoke(method, op != opc::INVOKESTATIC, pc)?;

        if sb_item.as_ref().is_some_and(Item::is_newly_allocated) {
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_special_kind(SpecialKind::NEWLY_ALLOCATED);
            }
        }

        if initializing_servlet_writer {
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_is_servlet_writer();
            }
        }

        if (saw_unknown_append || appender_value.is_some() || servlet_tainted)
            && self.stack_depth() > 0
        {
            let injection_of_top = top_item.as_ref().and_then(|item| item.injection().cloned());
            if let Some(result) = self.stack.peek_mut(0) {
                result.set_constant(appender_value.map(|value| Constant::from(value.as_str())));
                if !saw_unknown_append && servlet_tainted {
                    result.set_injection(injection_of_top);
                    result.set_servlet_parameter_tainted();
                }
                if let Some(sb) = &sb_item {
                    result.set_register_number(sb.register_number());
                    result.set_source(sb.source().cloned());
                    if result.injection().is_none() {
                        result.set_injection(sb.injection().cloned());
                    }
                }
            }
            if let Some(sb) = &sb_item {
                if sb.register_number() >= 0 {
                    let mirrored = self.stack.peek(0);
                    self.set_local(sb.register_number() as usize, mirrored);
                }
            }
            return Ok(());
        }

        // Post-call refinements of the pushed return value.
        if matches!(class_name.as_str(), "java/util/Random" | "java/security/SecureRandom")
            && (name == "nextInt" && signature == "()I"
                || name == "nextLong" && signature == "()J")
        {
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_special_kind(SpecialKind::RANDOM_INT);
            }
        } else if name == "size"
            && signature == "()I"
            && self
                .context
                .is_collection(&method.dotted_class_name())
        {
            if let Some(top) = self.stack.peek_mut(0) {
                if top.special_kind() == SpecialKind::NOT_SPECIAL {
                    top.set_special_kind(SpecialKind::NON_NEGATIVE);
                }
            }
        } else if class_name == "java/lang/String"
            && number_arguments == 0
            && top_item
                .as_ref()
                .and_then(|item| item.constant())
                .and_then(Constant::as_str)
                .is_some()
        {
            let input = top_item
                .as_ref()
                .and_then(|item| item.constant())
                .and_then(Constant::as_str)
                .unwrap_or_default()
                .to_string();
            let folded = match name.as_str() {
                "length" => Some(Constant::Int(input.chars().map(char::len_utf16).sum::<usize>() as i32)),
                "trim" => Some(Constant::from(input.trim())),
                "toString" | "intern" => Some(Constant::from(input.as_str())),
                _ => None,
            };
            if let Some(folded) = folded {
                if let Some(top) = self.stack.peek_mut(0) {
                    top.set_constant(Some(folded));
                }
            }
        } else if is_math_class(&class_name) && name == "abs" {
            let kind = top_item
                .as_ref()
                .map_or(SpecialKind::MATH_ABS, Item::kind_for_abs);
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_special_kind(kind);
            }
        } else if is_math_class(&class_name) && matches!(return_signature.as_str(), "D" | "F") {
            if let Some(top) = self.stack.peek_mut(0) {
                if top.special_kind() == SpecialKind::NOT_SPECIAL {
                    top.set_special_kind(SpecialKind::FLOAT_MATH);
                }
            }
        } else if op == opc::INVOKEVIRTUAL && name == "hashCode" && signature == "()I"
            || op == opc::INVOKESTATIC
                && class_name == "java/lang/System"
                && name == "identityHashCode"
                && signature == "(Ljava/lang/Object;)I"
        {
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_special_kind(SpecialKind::HASHCODE_INT);
            }
        } else if top_is_tainted
            && (name.starts_with("encode") && is_servlet_response_class(&class_name)
                || name == "trim" && class_name == "java/lang/String")
        {
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_servlet_parameter_tainted();
                top.set_injection(injection);
            }
        }

        if return_signature != "V" {
            let source = method.clone();
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_returned_by(source);
            }
        }

        if op == opc::INVOKESTATIC
            && top_item.as_ref().is_some_and(Item::is_initial_parameter)
            && is_reference_returner(&class_name, &name)
        {
            // The helper hands its argument straight back.
            if let Some(top) = self.stack.peek_mut(0) {
                top.set_initial_parameter(true);
            }
        }

        Ok(())
    }

    /// The generic call model: pop the arguments and receiver, push the
    /// return value with the callee as its provenance.
    ///
    /// Constructors get the one refinement the `new; dup; invokespecial`
    /// idiom needs: when the slot below the popped receiver holds the same
    /// freshly-allocated value, it is replaced by a copy carrying the
    /// constructor as source.
    fn push_by_invoke(&mut self, method: &Rc<MethodRef>, pop_receiver: bool, pc: u32) -> Result<()> {
        let parsed = MethodSignature::new(&method.signature);
        let number_arguments = parsed.argument_count();
        let return_signature = parsed.return_type().to_string();

        if method.name == "<init>" && return_signature == "V" && pop_receiver {
            self.stack.pop_n(number_arguments, pc)?;
            let constructed = self.stack.pop(pc)?;
            if self.stack_depth() > 0 {
                let next = self.stack.peek(0);
                if constructed == next {
                    let mut replacement = next;
                    replacement.set_returned_by(method.clone());
                    replacement.set_pc(pc as i32);
                    self.stack.replace(0, replacement);
                }
            }
            return Ok(());
        }

        self.stack
            .pop_n(number_arguments + usize::from(pop_receiver), pc)?;
        self.push_by_signature(&return_signature, pc);
        Ok(())
    }

    /// Models an `invokedynamic` call site. Only string concatenation is
    /// understood precisely; everything else is the generic pop/push.
    pub(crate) fn process_invoke_dynamic(&mut self, instruction: &Instruction) -> Result<()> {
        let Operand::Dynamic {
            name,
            signature,
            bootstrap_arg,
        } = &instruction.operand
        else {
            return Err(Error::MalformedOperand {
                opcode:   instruction.opcode,
                name:     opc::name(instruction.opcode),
                expected: "call-site name and signature",
            }
            .locate(instruction.pc));
        };
        let pc = instruction.pc;
        let parsed = MethodSignature::new(signature);
        let number_arguments = parsed.argument_count();
        let return_signature = parsed.return_type().to_string();

        let top_injection = self
            .stack
            .peek_ref(0)
            .and_then(|item| item.injection().cloned());

        let mut appender_value: Option<String> = None;
        let mut servlet_tainted = false;

        if name == "makeConcatWithConstants" {
            match number_arguments {
                1 => {
                    let operand = self.stack.peek(0);
                    if operand.is_servlet_parameter_tainted() {
                        servlet_tainted = true;
                    }
                    if let (Some(constant), Some(recipe)) = (operand.constant(), bootstrap_arg) {
                        appender_value =
                            Some(recipe.replace('\u{1}', &constant.concat_text()));
                    }
                }
                2 => {
                    let last = self.stack.peek(0);
                    let first = self.stack.peek(1);
                    if last.is_servlet_parameter_tainted()
                        || first.is_servlet_parameter_tainted()
                    {
                        servlet_tainted = true;
                    }
                    if let (Some(first_constant), Some(last_constant)) =
                        (first.constant(), last.constant())
                    {
                        appender_value = Some(format!(
                            "{}{}",
                            first_constant.concat_text(),
                            last_constant.concat_text()
                        ));
                    }
                }
                _ => {}
            }
        }

        self.stack.pop_n(number_arguments, pc)?;
        self.push_by_signature(&return_signature, pc);

        if (appender_value.is_some() || servlet_tainted) && self.stack_depth() > 0 {
            if let Some(result) = self.stack.peek_mut(0) {
                result.set_constant(appender_value.map(|value| Constant::from(value.as_str())));
                if servlet_tainted {
                    result.set_injection(top_injection);
                    result.set_servlet_parameter_tainted();
                }
            }
        }
        Ok(())
    }

    /// Forgets the constant of the builder at `offset` and of its local
    /// mirror, after an operation that makes the accumulated text unknown.
    fn mark_constant_value_unknown(&mut self, offset: usize) {
        let (register, signature) = match self.stack.peek_mut(offset) {
            Some(item) => {
                item.set_constant(None);
                (item.register_number(), item.signature().to_string())
            }
            None => return,
        };
        if register >= 0 {
            if let Some(local) = self
                .locals
                .values_mut()
                .get_mut(register as usize)
                .and_then(Option::as_mut)
            {
                if local.signature() == signature {
                    local.set_constant(None);
                }
            }
        }
    }
}
