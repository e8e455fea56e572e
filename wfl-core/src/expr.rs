//! The expression tree of the weak form language.
//!
//! Integrands are built from a closed set of node kinds: terminals (form arguments, coefficients,
//! constants, geometric quantities) and operators combining them. Nodes are immutable and shared:
//! an [`Expr`] is a cheap handle to a reference-counted node, and the same sub-expression may
//! appear under several parents, so trees are really DAGs. No node is ever mutated after
//! construction; every rewrite builds new nodes around reused ones.
//!
//! Every kind is registered with the [`Registry`](crate::registry::Registry) in
//! [`install_kinds`], which runs exactly once per process before the first node is constructed.
//! The registry is the source of truth for per-kind traits: terminal-ness, operand arity,
//! scalar-ness, shaping, and kind ancestry (e.g. "is this a facet-only geometric quantity?").
//! Algorithms traverse and rebuild trees generically through [`Expr::operands`] and
//! [`Expr::reconstruct`] plus those trait queries, without matching on concrete kinds.
//!
//! Arithmetic between expressions goes through the operator bindings declared at registration:
//! `a + b` constructs whichever kind bound itself to `+` (the builtin catalogue binds [`Sum`],
//! [`Product`], [`Division`] and [`Negated`](ExprData::Negated)), so the `std::ops` impls here
//! are thin construction thunks over the registry's operator table.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::element::FiniteElement;
use crate::geometry::Domain;
use crate::index::{extract_indices, IndexItem, MalformedIndexError, MultiIndex};
use crate::index::{Index, IndexBase};
use crate::registry::{KindDecl, OpSymbol, Registry, TypeCode};

/// Identity source for coefficient counts (declaration order).
static COEFFICIENT_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// The side of an interior facet a restricted quantity is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Plus,
    Minus,
}

impl Side {
    pub fn sign(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sign())
    }
}

/// Typecodes of the builtin kind catalogue, fixed at first use for the process lifetime.
#[derive(Debug)]
pub struct Kinds {
    // Abstract anchors.
    pub expr: TypeCode,
    pub terminal: TypeCode,
    pub operator: TypeCode,
    pub constant_value: TypeCode,
    pub geometric_quantity: TypeCode,
    pub geometric_facet_quantity: TypeCode,

    // Terminals.
    pub scalar_value: TypeCode,
    pub zero: TypeCode,
    pub argument: TypeCode,
    pub coefficient: TypeCode,
    pub spatial_coordinate: TypeCode,
    pub cell_volume: TypeCode,
    pub facet_normal: TypeCode,
    pub facet_area: TypeCode,

    // Operators.
    pub sum: TypeCode,
    pub product: TypeCode,
    pub division: TypeCode,
    pub negated: TypeCode,
    pub indexed: TypeCode,
    pub transposed: TypeCode,
    pub grad: TypeCode,
    pub restricted: TypeCode,
}

/// Registers the builtin catalogue. Registration order is fixed, so typecodes are reproducible
/// across runs.
pub fn install_kinds(registry: &mut Registry) -> Result<Kinds, crate::registry::TypeRegistrationError> {
    let expr = registry.register(KindDecl::abstract_kind("Expr", None))?;
    let terminal =
        registry.register(KindDecl::abstract_kind("Terminal", Some(expr)).terminal(true))?;
    let operator =
        registry.register(KindDecl::abstract_kind("Operator", Some(expr)).terminal(false))?;
    let constant_value =
        registry.register(KindDecl::abstract_kind("ConstantValue", Some(terminal)))?;
    let geometric_quantity =
        registry.register(KindDecl::abstract_kind("GeometricQuantity", Some(terminal)))?;
    let geometric_facet_quantity = registry.register(KindDecl::abstract_kind(
        "GeometricFacetQuantity",
        Some(geometric_quantity),
    ))?;

    let scalar_value =
        registry.register(KindDecl::concrete("ScalarValue", constant_value).scalar())?;
    let zero = registry.register(KindDecl::concrete("Zero", constant_value))?;
    let argument = registry.register(KindDecl::concrete("Argument", terminal))?;
    let coefficient = registry.register(KindDecl::concrete("Coefficient", terminal))?;
    let spatial_coordinate =
        registry.register(KindDecl::concrete("SpatialCoordinate", geometric_quantity))?;
    let cell_volume =
        registry.register(KindDecl::concrete("CellVolume", geometric_quantity).scalar())?;
    let facet_normal =
        registry.register(KindDecl::concrete("FacetNormal", geometric_facet_quantity))?;
    let facet_area =
        registry.register(KindDecl::concrete("FacetArea", geometric_facet_quantity).scalar())?;

    let sum = registry.register(KindDecl::concrete("Sum", operator).binop(OpSymbol::Add))?;
    let product =
        registry.register(KindDecl::concrete("Product", operator).binop(OpSymbol::Mul))?;
    let division =
        registry.register(KindDecl::concrete("Division", operator).binop(OpSymbol::Div))?;
    let negated = registry.register(KindDecl::concrete("Negated", operator).unop(OpSymbol::Neg))?;
    let indexed =
        registry.register(KindDecl::concrete("Indexed", operator).operands(1).shaping())?;
    let transposed =
        registry.register(KindDecl::concrete("Transposed", operator).operands(1).shaping())?;
    let grad = registry.register(KindDecl::concrete("Grad", operator).operands(1))?;
    let restricted = registry.register(KindDecl::concrete("Restricted", operator).operands(1))?;

    Ok(Kinds {
        expr,
        terminal,
        operator,
        constant_value,
        geometric_quantity,
        geometric_facet_quantity,
        scalar_value,
        zero,
        argument,
        coefficient,
        spatial_coordinate,
        cell_volume,
        facet_normal,
        facet_area,
        sum,
        product,
        division,
        negated,
        indexed,
        transposed,
        grad,
        restricted,
    })
}

struct Builtins {
    registry: RwLock<Registry>,
    kinds: Kinds,
}

/// Global registry plus the builtin catalogue. Built once, on first use, before any node can be
/// constructed; afterwards the registry is only extended, never redefined.
static BUILTINS: Lazy<Builtins> = Lazy::new(|| {
    let mut registry = Registry::new();
    let kinds = install_kinds(&mut registry)
        .unwrap_or_else(|e| panic!("builtin kind catalogue failed to register: {e}"));
    Builtins {
        registry: RwLock::new(registry),
        kinds,
    }
});

/// Typecodes of the builtin kinds.
pub fn kinds() -> &'static Kinds {
    &BUILTINS.kinds
}

/// Runs a closure against the process-wide registry.
pub fn with_registry<R>(f: impl FnOnce(&Registry) -> R) -> R {
    let registry = BUILTINS
        .registry
        .read()
        .expect("expression type registry is poisoned");
    f(&registry)
}

/// Registers an additional kind with the process-wide registry. Must happen before trees using
/// the kind are constructed or traversed.
pub fn register_kind(decl: KindDecl) -> Result<TypeCode, crate::registry::TypeRegistrationError> {
    let mut registry = BUILTINS
        .registry
        .write()
        .expect("expression type registry is poisoned");
    registry.register(decl)
}

/// The payload of one expression node.
#[derive(Debug)]
pub enum ExprData {
    /// A scalar constant.
    ScalarValue(f64),

    /// The zero tensor of a given shape.
    Zero { shape: Vec<usize> },

    /// An unknown trial/test function; `number` contributes to form rank.
    Argument {
        element: FiniteElement,
        number: usize,
    },

    /// A known function; `count` is the declaration-order identity.
    Coefficient {
        element: FiniteElement,
        count: usize,
    },

    /// The physical coordinate vector.
    SpatialCoordinate { domain: Domain },

    /// The volume of the current cell.
    CellVolume { domain: Domain },

    /// The outward unit normal of the current facet. Facet integrals only.
    FacetNormal { domain: Domain },

    /// The area of the current facet. Facet integrals only.
    FacetArea { domain: Domain },

    Sum(Expr, Expr),
    Product(Expr, Expr),
    Division(Expr, Expr),
    Negated(Expr),

    /// Subscripting by a multi-index; a shaping operation.
    Indexed { operand: Expr, multi_index: MultiIndex },

    /// Reversal of the shape tuple; a shaping operation.
    Transposed(Expr),

    /// The spatial gradient, appending the geometric dimension to the shape.
    Grad(Expr),

    /// Evaluation on one side of an interior facet.
    Restricted { operand: Expr, side: Side },
}

/// A handle to an immutable, shared expression node.
#[derive(Debug, Clone)]
pub struct Expr(Rc<ExprData>);

impl Expr {
    fn new(data: ExprData) -> Self {
        let expr = Self(Rc::new(data));
        with_registry(|r| r.count_instance(expr.type_code()));
        expr
    }

    // --- Terminal constructors ---

    pub fn scalar(value: f64) -> Self {
        Self::new(ExprData::ScalarValue(value))
    }

    /// The scalar zero.
    pub fn zero() -> Self {
        Self::new(ExprData::Zero { shape: Vec::new() })
    }

    pub fn zero_with_shape(shape: Vec<usize>) -> Self {
        Self::new(ExprData::Zero { shape })
    }

    pub fn argument(element: FiniteElement, number: usize) -> Self {
        Self::new(ExprData::Argument { element, number })
    }

    /// A coefficient with the next declaration-order count.
    pub fn coefficient(element: FiniteElement) -> Self {
        let count = COEFFICIENT_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::new(ExprData::Coefficient { element, count })
    }

    /// A coefficient with an explicit count, raising the global counter above it.
    pub fn coefficient_with_count(element: FiniteElement, count: usize) -> Self {
        COEFFICIENT_COUNTER.fetch_max(count + 1, Ordering::Relaxed);
        Self::new(ExprData::Coefficient { element, count })
    }

    pub fn spatial_coordinate(domain: Domain) -> Self {
        Self::new(ExprData::SpatialCoordinate { domain })
    }

    pub fn cell_volume(domain: Domain) -> Self {
        Self::new(ExprData::CellVolume { domain })
    }

    pub fn facet_normal(domain: Domain) -> Self {
        Self::new(ExprData::FacetNormal { domain })
    }

    pub fn facet_area(domain: Domain) -> Self {
        Self::new(ExprData::FacetArea { domain })
    }

    // --- Operator constructors ---

    pub fn grad(operand: Expr) -> Self {
        Self::new(ExprData::Grad(operand))
    }

    pub fn transposed(operand: Expr) -> Self {
        Self::new(ExprData::Transposed(operand))
    }

    pub fn restricted(operand: Expr, side: Side) -> Self {
        Self::new(ExprData::Restricted { operand, side })
    }

    /// Subscripts this expression; the index tuple must fit the expression's rank after
    /// ellipsis expansion.
    pub fn indexed(self, items: Vec<IndexItem>) -> Result<Self, MalformedIndexError> {
        let multi_index = MultiIndex::new(items, self.rank())?;
        Ok(Self::new(ExprData::Indexed { operand: self, multi_index }))
    }

    // --- Structural queries ---

    pub fn data(&self) -> &ExprData {
        &self.0
    }

    /// The registry identity of this node's kind.
    pub fn type_code(&self) -> TypeCode {
        let k = kinds();
        match self.data() {
            ExprData::ScalarValue(_) => k.scalar_value,
            ExprData::Zero { .. } => k.zero,
            ExprData::Argument { .. } => k.argument,
            ExprData::Coefficient { .. } => k.coefficient,
            ExprData::SpatialCoordinate { .. } => k.spatial_coordinate,
            ExprData::CellVolume { .. } => k.cell_volume,
            ExprData::FacetNormal { .. } => k.facet_normal,
            ExprData::FacetArea { .. } => k.facet_area,
            ExprData::Sum(..) => k.sum,
            ExprData::Product(..) => k.product,
            ExprData::Division(..) => k.division,
            ExprData::Negated(..) => k.negated,
            ExprData::Indexed { .. } => k.indexed,
            ExprData::Transposed(..) => k.transposed,
            ExprData::Grad(..) => k.grad,
            ExprData::Restricted { .. } => k.restricted,
        }
    }

    /// The kind's dispatch key.
    pub fn handler_name(&self) -> String {
        with_registry(|r| r.record(self.type_code()).handler_name.clone())
    }

    pub fn is_terminal(&self) -> bool {
        with_registry(|r| r.record(self.type_code()).is_terminal == Some(true))
    }

    pub fn is_shaping(&self) -> bool {
        with_registry(|r| r.record(self.type_code()).is_shaping)
    }

    /// Returns true if this node is a constant value (subkind of `ConstantValue`).
    pub fn is_constant(&self) -> bool {
        with_registry(|r| r.is_subkind(self.type_code(), kinds().constant_value))
    }

    /// Returns true if this node is a facet-only geometric quantity.
    pub fn is_facet_quantity(&self) -> bool {
        with_registry(|r| r.is_subkind(self.type_code(), kinds().geometric_facet_quantity))
    }

    /// The node's operands, in order. Empty for terminals.
    pub fn operands(&self) -> Vec<&Expr> {
        match self.data() {
            ExprData::ScalarValue(_)
            | ExprData::Zero { .. }
            | ExprData::Argument { .. }
            | ExprData::Coefficient { .. }
            | ExprData::SpatialCoordinate { .. }
            | ExprData::CellVolume { .. }
            | ExprData::FacetNormal { .. }
            | ExprData::FacetArea { .. } => Vec::new(),
            ExprData::Sum(a, b) | ExprData::Product(a, b) | ExprData::Division(a, b) => {
                vec![a, b]
            }
            ExprData::Negated(a)
            | ExprData::Transposed(a)
            | ExprData::Grad(a) => vec![a],
            ExprData::Indexed { operand, .. } | ExprData::Restricted { operand, .. } => {
                vec![operand]
            }
        }
    }

    /// Rebuilds a node of the same kind around new operands, keeping any non-operand payload.
    /// The operand count must match the kind's registered arity.
    pub fn reconstruct(&self, operands: Vec<Expr>) -> Expr {
        let mut ops = operands.into_iter();
        let mut next = || ops.next().expect("operand count does not match node arity");
        match self.data() {
            ExprData::Sum(..) => Self::new(ExprData::Sum(next(), next())),
            ExprData::Product(..) => Self::new(ExprData::Product(next(), next())),
            ExprData::Division(..) => Self::new(ExprData::Division(next(), next())),
            ExprData::Negated(..) => Self::new(ExprData::Negated(next())),
            ExprData::Transposed(..) => Self::new(ExprData::Transposed(next())),
            ExprData::Grad(..) => Self::new(ExprData::Grad(next())),
            ExprData::Indexed { multi_index, .. } => Self::new(ExprData::Indexed {
                operand: next(),
                multi_index: multi_index.clone(),
            }),
            ExprData::Restricted { side, .. } => Self::new(ExprData::Restricted {
                operand: next(),
                side: *side,
            }),
            _ => self.clone(),
        }
    }

    /// The value shape of this expression; empty for scalars.
    pub fn shape(&self) -> Vec<usize> {
        match self.data() {
            ExprData::ScalarValue(_)
            | ExprData::CellVolume { .. }
            | ExprData::FacetArea { .. } => Vec::new(),
            ExprData::Zero { shape } => shape.clone(),
            ExprData::Argument { element, .. } | ExprData::Coefficient { element, .. } => {
                element.value_shape().to_vec()
            }
            ExprData::SpatialCoordinate { domain } | ExprData::FacetNormal { domain } => {
                vec![domain.geometric_dimension()]
            }
            ExprData::Sum(a, _) => a.shape(),
            ExprData::Product(a, b) => {
                // Scalar factors do not contribute to the shape.
                let sa = a.shape();
                if sa.is_empty() {
                    b.shape()
                } else {
                    sa
                }
            }
            ExprData::Division(a, _) => a.shape(),
            ExprData::Negated(a) | ExprData::Restricted { operand: a, .. } => a.shape(),
            ExprData::Indexed { operand, multi_index } => {
                let base = operand.shape();
                multi_index
                    .indices()
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| matches!(entry, IndexBase::Axis))
                    .map(|(position, _)| base[position])
                    .collect()
            }
            ExprData::Transposed(a) => {
                let mut shape = a.shape();
                shape.reverse();
                shape
            }
            ExprData::Grad(a) => {
                let mut shape = a.shape();
                if let Some(domain) = self.domain() {
                    shape.push(domain.geometric_dimension());
                }
                shape
            }
        }
    }

    /// The tensor rank of this expression.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// The free (unsummed) symbolic indices of this expression, sorted by identity.
    pub fn free_indices(&self) -> Vec<Index> {
        match self.data() {
            ExprData::Indexed { operand, multi_index } => {
                let extracted = extract_indices(multi_index)
                    .expect("multi-index validated at construction");
                let mut free = operand.free_indices();
                for index in extracted.free {
                    if let Some(position) = free.iter().position(|i| *i == index) {
                        // Shared with the operand: the pair denotes summation.
                        free.remove(position);
                    } else {
                        free.push(index);
                    }
                }
                free.sort();
                free
            }
            _ => {
                let mut free: Vec<Index> = Vec::new();
                for op in self.operands() {
                    for index in op.free_indices() {
                        if !free.contains(&index) {
                            free.push(index);
                        }
                    }
                }
                free.sort();
                free
            }
        }
    }

    /// Dimension of each free index, keyed by index identity.
    pub fn index_dimensions(&self) -> BTreeMap<Index, usize> {
        match self.data() {
            ExprData::Indexed { operand, multi_index } => {
                let mut dims = operand.index_dimensions();
                let base = operand.shape();
                let free = self.free_indices();
                for (position, entry) in multi_index.indices().iter().enumerate() {
                    if let IndexBase::Index(index) = entry {
                        if free.contains(index) {
                            dims.insert(index.clone(), base[position]);
                        } else {
                            dims.remove(index);
                        }
                    }
                }
                dims
            }
            _ => {
                let mut dims = BTreeMap::new();
                for op in self.operands() {
                    dims.extend(op.index_dimensions());
                }
                dims
            }
        }
    }

    /// The first domain reachable from this expression's terminals, if any.
    pub fn domain(&self) -> Option<&Domain> {
        match self.data() {
            ExprData::Argument { element, .. } | ExprData::Coefficient { element, .. } => {
                element.domain()
            }
            ExprData::SpatialCoordinate { domain }
            | ExprData::CellVolume { domain }
            | ExprData::FacetNormal { domain }
            | ExprData::FacetArea { domain } => Some(domain),
            _ => self.operands().into_iter().find_map(Expr::domain),
        }
    }

    /// The element attached to this node, for arguments and coefficients.
    pub fn element(&self) -> Option<&FiniteElement> {
        match self.data() {
            ExprData::Argument { element, .. } | ExprData::Coefficient { element, .. } => {
                Some(element)
            }
            _ => None,
        }
    }

    pub fn argument_number(&self) -> Option<usize> {
        match self.data() {
            ExprData::Argument { number, .. } => Some(*number),
            _ => None,
        }
    }

    pub fn coefficient_count(&self) -> Option<usize> {
        match self.data() {
            ExprData::Coefficient { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// Returns an iterator traversing the DAG in left-to-right post-order (depth-first).
    pub fn post_order_iter(&self) -> PostOrderIter<'_> {
        PostOrderIter::new(self)
    }

    /// Two handles to the very same node.
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

fn binary_from_op(symbol: OpSymbol, lhs: Expr, rhs: Expr) -> Expr {
    let binding = with_registry(|r| r.op_binding(symbol))
        .unwrap_or_else(|| panic!("no expression kind is bound to operator `{symbol}`"));
    let (a, b) = if binding.reflected { (rhs, lhs) } else { (lhs, rhs) };
    let k = kinds();
    let data = if binding.typecode == k.sum {
        ExprData::Sum(a, b)
    } else if binding.typecode == k.product {
        ExprData::Product(a, b)
    } else if binding.typecode == k.division {
        ExprData::Division(a, b)
    } else {
        panic!("operator `{symbol}` is bound to an unsupported kind");
    };
    Expr::new(data)
}

impl std::ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        binary_from_op(OpSymbol::Add, self, rhs)
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        // a - b is sugar for a + (-b).
        binary_from_op(OpSymbol::Add, self, -rhs)
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        binary_from_op(OpSymbol::Mul, self, rhs)
    }
}

impl std::ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        binary_from_op(OpSymbol::Div, self, rhs)
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        let binding = with_registry(|r| r.op_binding(OpSymbol::Neg))
            .unwrap_or_else(|| panic!("no expression kind is bound to operator `-`"));
        debug_assert_eq!(binding.typecode, kinds().negated);
        Expr::new(ExprData::Negated(self))
    }
}

/// Structural equality. `Sum` and `Product` compare commutatively; everything else compares
/// operand by operand. Scalar constants compare by bit pattern so equality stays consistent
/// with hashing.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.data(), other.data()) {
            (ExprData::ScalarValue(a), ExprData::ScalarValue(b)) => a.to_bits() == b.to_bits(),
            (ExprData::Zero { shape: a }, ExprData::Zero { shape: b }) => a == b,
            (
                ExprData::Argument { element: ea, number: na },
                ExprData::Argument { element: eb, number: nb },
            ) => na == nb && ea == eb,
            (
                ExprData::Coefficient { element: ea, count: ca },
                ExprData::Coefficient { element: eb, count: cb },
            ) => ca == cb && ea == eb,
            (ExprData::SpatialCoordinate { domain: a }, ExprData::SpatialCoordinate { domain: b })
            | (ExprData::CellVolume { domain: a }, ExprData::CellVolume { domain: b })
            | (ExprData::FacetNormal { domain: a }, ExprData::FacetNormal { domain: b })
            | (ExprData::FacetArea { domain: a }, ExprData::FacetArea { domain: b }) => a == b,
            (ExprData::Sum(a1, b1), ExprData::Sum(a2, b2))
            | (ExprData::Product(a1, b1), ExprData::Product(a2, b2)) => {
                (a1 == a2 && b1 == b2) || (a1 == b2 && b1 == a2)
            }
            (ExprData::Division(a1, b1), ExprData::Division(a2, b2)) => a1 == a2 && b1 == b2,
            (ExprData::Negated(a), ExprData::Negated(b))
            | (ExprData::Transposed(a), ExprData::Transposed(b))
            | (ExprData::Grad(a), ExprData::Grad(b)) => a == b,
            (
                ExprData::Indexed { operand: a, multi_index: ma },
                ExprData::Indexed { operand: b, multi_index: mb },
            ) => ma == mb && a == b,
            (
                ExprData::Restricted { operand: a, side: sa },
                ExprData::Restricted { operand: b, side: sb },
            ) => sa == sb && a == b,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_code().hash(state);
        match self.data() {
            ExprData::ScalarValue(v) => v.to_bits().hash(state),
            ExprData::Zero { shape } => shape.hash(state),
            ExprData::Argument { element, number } => {
                number.hash(state);
                element.hash(state);
            }
            ExprData::Coefficient { element, count } => {
                count.hash(state);
                element.hash(state);
            }
            ExprData::SpatialCoordinate { domain }
            | ExprData::CellVolume { domain }
            | ExprData::FacetNormal { domain }
            | ExprData::FacetArea { domain } => domain.hash(state),
            ExprData::Sum(a, b) | ExprData::Product(a, b) => {
                // Commutative combination, to stay consistent with commutative equality.
                let mut ha = DefaultHasher::new();
                a.hash(&mut ha);
                let mut hb = DefaultHasher::new();
                b.hash(&mut hb);
                ha.finish().wrapping_add(hb.finish()).hash(state);
            }
            ExprData::Division(a, b) => {
                a.hash(state);
                b.hash(state);
            }
            ExprData::Negated(a) | ExprData::Transposed(a) | ExprData::Grad(a) => a.hash(state),
            ExprData::Indexed { operand, multi_index } => {
                multi_index.hash(state);
                operand.hash(state);
            }
            ExprData::Restricted { operand, side } => {
                side.hash(state);
                operand.hash(state);
            }
        }
    }
}

fn fmt_parenthesized(expr: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if matches!(expr.data(), ExprData::Sum(..)) {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            ExprData::ScalarValue(v) => write!(f, "{v}"),
            ExprData::Zero { .. } => write!(f, "0"),
            ExprData::Argument { number, .. } => write!(f, "v_{number}"),
            ExprData::Coefficient { count, .. } => write!(f, "w_{count}"),
            ExprData::SpatialCoordinate { .. } => write!(f, "x"),
            ExprData::CellVolume { .. } => write!(f, "volume"),
            ExprData::FacetNormal { .. } => write!(f, "n"),
            ExprData::FacetArea { .. } => write!(f, "facetarea"),
            ExprData::Sum(a, b) => write!(f, "{a} + {b}"),
            ExprData::Product(a, b) => {
                fmt_parenthesized(a, f)?;
                write!(f, " * ")?;
                fmt_parenthesized(b, f)
            }
            ExprData::Division(a, b) => {
                fmt_parenthesized(a, f)?;
                write!(f, " / ")?;
                fmt_parenthesized(b, f)
            }
            ExprData::Negated(a) => {
                write!(f, "-")?;
                fmt_parenthesized(a, f)
            }
            ExprData::Indexed { operand, multi_index } => {
                fmt_parenthesized(operand, f)?;
                write!(f, "[{multi_index}]")
            }
            ExprData::Transposed(a) => {
                fmt_parenthesized(a, f)?;
                write!(f, "^T")
            }
            ExprData::Grad(a) => write!(f, "grad({a})"),
            ExprData::Restricted { operand, side } => {
                fmt_parenthesized(operand, f)?;
                write!(f, "('{side}')")
            }
        }
    }
}

/// An iterator that iteratively traverses the expression DAG in left-to-right post-order
/// (i.e. depth-first), yielding every node after its operands.
///
/// Created by [`Expr::post_order_iter`].
pub struct PostOrderIter<'a> {
    stack: Vec<&'a Expr>,
    last_visited: Option<&'a Expr>,
}

impl<'a> PostOrderIter<'a> {
    fn new(expr: &'a Expr) -> Self {
        Self {
            stack: vec![expr],
            last_visited: None,
        }
    }

    /// Pops the current expression from the stack and marks it as last visited.
    fn visit(&mut self) -> Option<&'a Expr> {
        self.last_visited = self.stack.pop();
        self.last_visited
    }

    /// Returns true if the given node is the one last visited (by node identity, so shared
    /// sub-trees under different parents are still traversed under each parent).
    fn is_last_visited(&self, expr: &Expr) -> bool {
        match self.last_visited {
            Some(last) => std::ptr::eq(last as *const Expr, expr as *const Expr),
            None => false,
        }
    }
}

impl<'a> Iterator for PostOrderIter<'a> {
    type Item = &'a Expr;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let expr = *self.stack.last()?;
            let operands = expr.operands();
            match operands.last() {
                None => return self.visit(),
                Some(last) if self.is_last_visited(last) => return self.visit(),
                _ => {
                    for operand in operands.into_iter().rev() {
                        self.stack.push(operand);
                    }
                }
            }
        }
    }
}
