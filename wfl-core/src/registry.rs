//! The expression type registry.
//!
//! Every expression node kind registers here exactly once, at catalogue-definition time, before
//! any tree is constructed. Registration assigns a dense [`TypeCode`], derives the kind's
//! dispatch key (its handler name) from the display name, resolves inheritable traits against
//! the kind's ancestor chain, and validates the whole table after every insertion. All checks
//! fire at registration time, never at tree-construction time, so every constructible node
//! already satisfies its trait contract.
//!
//! The registry is append-only for the lifetime of the process: no unregistration, no
//! redefinition. Typecode order is registration order, making dispatch tables reproducible
//! whenever the catalogue registers in the same order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Dense, zero-based identity of a registered kind, stable within a process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode(pub u16);

impl TypeCode {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operator symbols a kind can bind to at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpSymbol {
    Add,
    Mul,
    Div,
    Neg,
}

impl OpSymbol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Neg => "-",
        }
    }
}

impl fmt::Display for OpSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The registry contract was violated while defining a kind. Always fatal: the catalogue is
/// broken and no expression tree may be built from it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeRegistrationError {
    #[error("base typecode {base} of kind `{kind}` is not registered")]
    UnknownBase { base: TypeCode, kind: &'static str },

    #[error("base kind `{base}` of kind `{kind}` is not abstract")]
    ConcreteBase { base: String, kind: &'static str },

    #[error("kind `{0}` has not specified the is_terminal trait and no ancestor defines it")]
    UnresolvedTerminal(&'static str),

    #[error("non-scalar kind `{kind}` has a scalar base kind `{base}`")]
    ScalarBase { kind: &'static str, base: String },

    #[error("kind `{0}` has not specified num_operands and no default applies")]
    UnresolvedArity(&'static str),

    #[error("terminal kind `{0}` declares num_operands > 0")]
    TerminalWithOperands(&'static str),

    #[error("handler name `{handler}` of kind `{kind}` collides with registered kind `{existing}`")]
    HandlerCollision {
        handler: String,
        kind: &'static str,
        existing: String,
    },

    #[error("operator `{symbol}` is already bound to kind `{existing}`")]
    OperatorRebound { symbol: OpSymbol, existing: String },
}

/// Declared traits of one node kind, as passed to [`Registry::register`].
#[derive(Debug, Clone)]
pub struct KindDecl {
    /// CamelCase display name; the handler name is derived from it.
    pub name: &'static str,

    /// Nearest ancestor in the kind hierarchy. `None` only for the root kind.
    pub base: Option<TypeCode>,

    /// Abstract kinds are never instantiated and may leave traits unresolved.
    pub is_abstract: bool,

    /// `None` inherits from the nearest ancestor that defines it.
    pub is_terminal: Option<bool>,

    /// Scalar kinds get the canonical empty shape and index sets.
    pub is_scalar: bool,

    /// Rank-preserving relabeling ops (indexing, transposing) that introduce no computation.
    pub is_shaping: bool,

    /// `None` is resolved from terminal-ness, operator bindings, or the ancestor chain.
    pub num_operands: Option<usize>,

    /// Bind a unary operator to this kind; implies `num_operands == 1` when unspecified.
    pub unop: Option<OpSymbol>,

    /// Bind a binary operator to this kind; implies `num_operands == 2` when unspecified.
    pub binop: Option<OpSymbol>,

    /// Like `binop` but with swapped operands; implies `num_operands == 2` when unspecified.
    pub rbinop: Option<OpSymbol>,
}

impl KindDecl {
    fn bare(name: &'static str, base: Option<TypeCode>) -> Self {
        Self {
            name,
            base,
            is_abstract: false,
            is_terminal: None,
            is_scalar: false,
            is_shaping: false,
            num_operands: None,
            unop: None,
            binop: None,
            rbinop: None,
        }
    }

    /// An abstract kind that only anchors traits for its descendants.
    pub fn abstract_kind(name: &'static str, base: Option<TypeCode>) -> Self {
        Self {
            is_abstract: true,
            ..Self::bare(name, base)
        }
    }

    /// A concrete kind inheriting its traits from `base`.
    pub fn concrete(name: &'static str, base: TypeCode) -> Self {
        Self::bare(name, Some(base))
    }

    pub fn terminal(mut self, is_terminal: bool) -> Self {
        self.is_terminal = Some(is_terminal);
        self
    }

    pub fn scalar(mut self) -> Self {
        self.is_scalar = true;
        self
    }

    pub fn shaping(mut self) -> Self {
        self.is_shaping = true;
        self
    }

    pub fn operands(mut self, num: usize) -> Self {
        self.num_operands = Some(num);
        self
    }

    pub fn unop(mut self, symbol: OpSymbol) -> Self {
        self.unop = Some(symbol);
        self
    }

    pub fn binop(mut self, symbol: OpSymbol) -> Self {
        self.binop = Some(symbol);
        self
    }

    pub fn rbinop(mut self, symbol: OpSymbol) -> Self {
        self.rbinop = Some(symbol);
        self
    }
}

/// Resolved traits of a registered kind.
#[derive(Debug)]
pub struct KindRecord {
    pub typecode: TypeCode,
    pub name: &'static str,
    pub handler_name: String,
    pub base: Option<TypeCode>,
    pub is_abstract: bool,

    /// Resolved terminal trait. Guaranteed `Some` for non-abstract kinds.
    pub is_terminal: Option<bool>,
    pub is_scalar: bool,
    pub is_shaping: bool,

    /// Resolved arity. Guaranteed `Some` for non-abstract kinds.
    pub num_operands: Option<usize>,
}

/// How an operator symbol constructs a node: which kind, and whether operands are swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpBinding {
    pub typecode: TypeCode,
    pub reflected: bool,
}

/// The append-only catalogue of expression node kinds.
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<KindRecord>,
    handler_names: HashMap<String, TypeCode>,
    instance_counts: Vec<AtomicU64>,
    ops: HashMap<OpSymbol, OpBinding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one kind, performing the checks of the registration contract in order. Returns
    /// the assigned typecode.
    pub fn register(&mut self, decl: KindDecl) -> Result<TypeCode, TypeRegistrationError> {
        // 1. Hierarchy check: every ancestor must be registered and abstract. Concrete kinds
        //    are leaves of the hierarchy.
        if let Some(base) = decl.base {
            let mut ancestor = Some(base);
            while let Some(tc) = ancestor {
                let record = self.get(tc).ok_or(TypeRegistrationError::UnknownBase {
                    base: tc,
                    kind: decl.name,
                })?;
                if !record.is_abstract {
                    return Err(TypeRegistrationError::ConcreteBase {
                        base: record.name.to_string(),
                        kind: decl.name,
                    });
                }
                ancestor = record.base;
            }
        }

        // 2. Terminal trait: explicit, or inherited from the nearest ancestor defining it. A
        //    non-abstract kind must state whether it is a leaf.
        let is_terminal = decl
            .is_terminal
            .or_else(|| self.inherited(decl.base, |r| r.is_terminal));
        if !decl.is_abstract && is_terminal.is_none() {
            return Err(TypeRegistrationError::UnresolvedTerminal(decl.name));
        }

        // 3. Scalar trait: scalar-ness must not be silently widened by a descendant.
        if !decl.is_scalar {
            if let Some(scalar_base) = self.scalar_ancestor(decl.base) {
                return Err(TypeRegistrationError::ScalarBase {
                    kind: decl.name,
                    base: self.record(scalar_base).name.to_string(),
                });
            }
        }

        // 4. Arity: explicit, else 0 for terminals, 1 for unop kinds, 2 for (r)binop kinds,
        //    else inherited.
        let mut num_operands = decl.num_operands;
        if num_operands.is_none() {
            num_operands = if is_terminal == Some(true) {
                Some(0)
            } else if decl.unop.is_some() {
                Some(1)
            } else if decl.binop.is_some() || decl.rbinop.is_some() {
                Some(2)
            } else {
                self.inherited(decl.base, |r| r.num_operands)
            };
        }
        if !decl.is_abstract && num_operands.is_none() {
            return Err(TypeRegistrationError::UnresolvedArity(decl.name));
        }
        if is_terminal == Some(true) && num_operands.is_some_and(|n| n != 0) {
            return Err(TypeRegistrationError::TerminalWithOperands(decl.name));
        }

        // 5. Identity: next typecode, handler name derived from the display name.
        let typecode = TypeCode(u16::try_from(self.records.len()).expect("typecode space exhausted"));
        let handler_name = camel_to_underscore(decl.name);
        if let Some(&existing) = self.handler_names.get(&handler_name) {
            return Err(TypeRegistrationError::HandlerCollision {
                handler: handler_name,
                kind: decl.name,
                existing: self.record(existing).name.to_string(),
            });
        }

        // 7. Operator bindings are installed before the record so a rebind leaves the table
        //    untouched.
        for (symbol, reflected) in decl
            .unop
            .iter()
            .chain(decl.binop.iter())
            .map(|&s| (s, false))
            .chain(decl.rbinop.iter().map(|&s| (s, true)))
        {
            if let Some(existing) = self.ops.get(&symbol) {
                return Err(TypeRegistrationError::OperatorRebound {
                    symbol,
                    existing: self.record(existing.typecode).name.to_string(),
                });
            }
            self.ops.insert(symbol, OpBinding { typecode, reflected });
        }

        self.handler_names.insert(handler_name.clone(), typecode);
        self.records.push(KindRecord {
            typecode,
            name: decl.name,
            handler_name,
            base: decl.base,
            is_abstract: decl.is_abstract,
            is_terminal,
            is_scalar: decl.is_scalar,
            is_shaping: decl.is_shaping,
            num_operands,
        });
        self.instance_counts.push(AtomicU64::new(0));

        // 6. Structural consistency: typecodes, handler names and bookkeeping slots must stay
        //    pairwise equal. A mismatch is an internal fault, not a user error.
        assert_eq!(self.records.len(), self.handler_names.len());
        assert_eq!(self.records.len(), self.instance_counts.len());

        Ok(typecode)
    }

    /// First `Some` value of `select` along the ancestor chain starting at `base`.
    fn inherited<T>(
        &self,
        base: Option<TypeCode>,
        select: impl Fn(&KindRecord) -> Option<T>,
    ) -> Option<T> {
        let mut ancestor = base;
        while let Some(tc) = ancestor {
            let record = self.record(tc);
            if let Some(value) = select(record) {
                return Some(value);
            }
            ancestor = record.base;
        }
        None
    }

    fn scalar_ancestor(&self, base: Option<TypeCode>) -> Option<TypeCode> {
        let mut ancestor = base;
        while let Some(tc) = ancestor {
            let record = self.record(tc);
            if record.is_scalar {
                return Some(tc);
            }
            ancestor = record.base;
        }
        None
    }

    pub fn get(&self, typecode: TypeCode) -> Option<&KindRecord> {
        self.records.get(typecode.index())
    }

    /// The record for a typecode this registry handed out.
    pub fn record(&self, typecode: TypeCode) -> &KindRecord {
        &self.records[typecode.index()]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if `typecode` is `ancestor` or has it in its base chain.
    pub fn is_subkind(&self, typecode: TypeCode, ancestor: TypeCode) -> bool {
        let mut current = Some(typecode);
        while let Some(tc) = current {
            if tc == ancestor {
                return true;
            }
            current = self.record(tc).base;
        }
        false
    }

    pub fn op_binding(&self, symbol: OpSymbol) -> Option<OpBinding> {
        self.ops.get(&symbol).copied()
    }

    /// Records one construction of a node of this kind.
    pub fn count_instance(&self, typecode: TypeCode) {
        self.instance_counts[typecode.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn instance_count(&self, typecode: TypeCode) -> u64 {
        self.instance_counts[typecode.index()].load(Ordering::Relaxed)
    }
}

/// Derives a handler name from a CamelCase display name, e.g. `FacetNormal` -> `facet_normal`
/// and `CellFIATName` -> `cell_fiat_name`.
pub fn camel_to_underscore(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_is_lower =
                i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if i > 0 && (prev_is_lower || next_is_lower) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
