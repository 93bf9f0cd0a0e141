//! Parsing of JVM method descriptors.
//!
//! A method descriptor has the shape `(<arg sigs>)<return sig>`, where each
//! signature is a primitive letter, `L<class>;` or one or more `[` prefixes
//! followed by either. The parser here is deliberately forgiving: malformed
//! descriptors yield as many well-formed leading arguments as possible
//! rather than an error, since the analyzer must never abort on bad input.

/// A parsed view over a JVM method descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodSignature<'a> {
    raw: &'a str,
}

impl<'a> MethodSignature<'a> {
    /// Creates a parser over the provided `descriptor`.
    #[must_use]
    pub fn new(descriptor: &'a str) -> Self {
        Self { raw: descriptor }
    }

    /// Gets the number of declared arguments.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.arguments().count()
    }

    /// Iterates over the argument signatures in declaration order.
    pub fn arguments(&self) -> impl Iterator<Item = &'a str> {
        let inner = self
            .raw
            .find('(')
            .and_then(|start| {
                self.raw[start..]
                    .find(')')
                    .map(|end| &self.raw[start + 1..start + end])
            })
            .unwrap_or("");
        SignatureIter { rest: inner }
    }

    /// Gets the return-type signature, or `V` when the descriptor is
    /// malformed.
    #[must_use]
    pub fn return_type(&self) -> &'a str {
        self.raw
            .rfind(')')
            .map_or("V", |end| &self.raw[end + 1..])
    }

    /// Gets the number of abstract stack slots consumed by the arguments,
    /// counting `J` and `D` twice.
    #[must_use]
    pub fn argument_slots(&self) -> usize {
        self.arguments()
            .map(|sig| if sig == "J" || sig == "D" { 2 } else { 1 })
            .sum()
    }
}

struct SignatureIter<'a> {
    rest: &'a str,
}

impl<'a> Iterator for SignatureIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let len = leading_signature_length(self.rest)?;
        let (sig, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(sig)
    }
}

/// Gets the byte length of the signature at the start of `s`, or [`None`]
/// when `s` is empty or does not start with a well-formed signature.
fn leading_signature_length(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    loop {
        let (idx, c) = chars.next()?;
        match c {
            '[' => continue,
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => return Some(idx + 1),
            'L' => {
                let end = s[idx..].find(';')?;
                return Some(idx + end + 1);
            }
            _ => return None,
        }
    }
}
