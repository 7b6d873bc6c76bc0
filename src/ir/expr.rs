//! Expression trees and the per-function expression arena.
//!
//! Each basic block carries at most one expression tree representing all of
//! its computation; side-effecting subexpressions are threaded together with
//! [`Expr::Seq`]. Nodes live in a function-wide arena and are addressed by
//! stable [`ExprId`] indices - there are no parent back-pointers and no node
//! reuse. When a subtree is relocated (hoisting, induction rewriting) it is
//! *copied* into fresh nodes, never aliased.
//!
//! The operator set is a closed tagged enum with one case per operator
//! family the optimizer distinguishes: leaves, unary operators, binary
//! operators, short-circuit operators, the ternary conditional, the
//! assignment family, calls, inline assembly and sequencing. Transient
//! per-node annotations (candidate indices, invariance marks) never live on
//! the node itself; analyses keep them in side tables keyed by [`ExprId`]
//! and discard them with the analysis.

use crate::ir::{SymbolId, Ty};

/// A strongly-typed index of a node within an [`ExprArena`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    /// Creates an `ExprId` from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the raw index, usable for indexing per-node side tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

/// Leaf operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leaf {
    /// Integer literal.
    IntConst(i64),
    /// Floating literal.
    FloatConst(f64),
    /// Read of a symbol's current value.
    Sym(SymbolId),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    BitNot,
    /// Logical not.
    LogNot,
    /// Conversion to the node's semantic type.
    Conv,
    /// Read through a pointer operand.
    Deref,
    /// Read through a dispatch-table-style indirection (the operand
    /// computes a slot address in a table of code or data pointers).
    DispatchLoad,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
    /// Left shift.
    Shl,
    /// Right shift.
    Shr,
    /// Bitwise and.
    BitAnd,
    /// Bitwise or.
    BitOr,
    /// Bitwise xor.
    BitXor,
    /// Equality comparison.
    Eq,
    /// Inequality comparison.
    Ne,
    /// Less-than comparison.
    Lt,
    /// Less-or-equal comparison.
    Le,
    /// Greater-than comparison.
    Gt,
    /// Greater-or-equal comparison.
    Ge,
}

impl BinOp {
    /// Returns `true` if operand order does not affect the result.
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::BitAnd | Self::BitOr | Self::BitXor | Self::Eq | Self::Ne
        )
    }

    /// Returns `true` for the comparison operators.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Returns `true` for operators that can fault at runtime and must not
    /// be evaluated speculatively.
    #[must_use]
    pub const fn can_trap(self) -> bool {
        matches!(self, Self::Div | Self::Rem)
    }

    /// The comparison with swapped operands, e.g. `<` becomes `>`.
    #[must_use]
    pub const fn swapped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            other => other,
        }
    }
}

/// Short-circuit operators. Their right operand is evaluated conditionally,
/// which GEN/KILL construction must model as a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortOp {
    /// Logical and.
    AndAnd,
    /// Logical or.
    OrOr,
}

/// Assignment-family operators.
///
/// Compound assignments read the target, apply the paired binary operator
/// and write the result back; increments and decrements are lowered to
/// compound adds by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// Plain store.
    Set,
    /// `target += value`.
    AddSet,
    /// `target -= value`.
    SubSet,
    /// `target *= value`.
    MulSet,
    /// `target /= value`.
    DivSet,
    /// `target %= value`.
    RemSet,
    /// `target <<= value`.
    ShlSet,
    /// `target >>= value`.
    ShrSet,
    /// `target &= value`.
    AndSet,
    /// `target |= value`.
    OrSet,
    /// `target ^= value`.
    XorSet,
}

impl AssignOp {
    /// The binary operator a compound assignment applies, or `None` for a
    /// plain store.
    #[must_use]
    pub const fn binop(self) -> Option<BinOp> {
        match self {
            Self::Set => None,
            Self::AddSet => Some(BinOp::Add),
            Self::SubSet => Some(BinOp::Sub),
            Self::MulSet => Some(BinOp::Mul),
            Self::DivSet => Some(BinOp::Div),
            Self::RemSet => Some(BinOp::Rem),
            Self::ShlSet => Some(BinOp::Shl),
            Self::ShrSet => Some(BinOp::Shr),
            Self::AndSet => Some(BinOp::BitAnd),
            Self::OrSet => Some(BinOp::BitOr),
            Self::XorSet => Some(BinOp::BitXor),
        }
    }

    /// Returns `true` if the operator reads the target before writing it.
    #[must_use]
    pub const fn reads_target(self) -> bool {
        !matches!(self, Self::Set)
    }
}

/// One operator application.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A leaf.
    Leaf(Leaf),
    /// A unary operator.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        opnd: ExprId,
    },
    /// A binary operator. Operands evaluate left-to-right.
    Binary {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: ExprId,
        /// Right operand.
        rhs: ExprId,
    },
    /// A short-circuit operator. The right operand may not be evaluated.
    Short {
        /// The operator.
        op: ShortOp,
        /// Left operand (always evaluated).
        lhs: ExprId,
        /// Right operand (conditionally evaluated).
        rhs: ExprId,
    },
    /// The conditional operator. Exactly one branch is evaluated.
    Ternary {
        /// The condition.
        cond: ExprId,
        /// Value when the condition is true.
        then_val: ExprId,
        /// Value when the condition is false.
        else_val: ExprId,
    },
    /// An assignment. The value operand evaluates before the target
    /// (right-to-left), matching the source language's store semantics.
    Assign {
        /// The operator.
        op: AssignOp,
        /// The lvalue being stored to: a symbol leaf or a dereference.
        target: ExprId,
        /// The stored value.
        value: ExprId,
    },
    /// A call. Arguments evaluate left-to-right, then the callee.
    Call {
        /// The called address.
        callee: ExprId,
        /// Argument expressions.
        args: Vec<ExprId>,
    },
    /// Opaque inline assembly; may read and write anything.
    Asm,
    /// Evaluates `first` for its effects, then `second` for its value.
    Seq {
        /// Evaluated first, value discarded.
        first: ExprId,
        /// Evaluated second, provides the value.
        second: ExprId,
    },
}

/// A node: one operator application plus its semantic type.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    /// The operator and operand links.
    pub kind: Expr,
    /// Semantic type of the produced value.
    pub ty: Ty,
}

/// The function-wide expression arena.
///
/// Nodes are append-only; deleting a subtree simply unlinks it from its
/// parent (orphan nodes are ignored by every walk, which always starts from
/// a block root). This keeps every issued [`ExprId`] valid for the lifetime
/// of the function and removes the stale-pointer hazards of freelist reuse.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a node and returns its id.
    pub fn alloc(&mut self, kind: Expr, ty: Ty) -> ExprId {
        let id = ExprId::new(self.nodes.len());
        self.nodes.push(ExprNode { kind, ty });
        id
    }

    /// Returns the node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[must_use]
    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    /// Returns a mutable reference to the node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn node_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    /// Number of nodes ever allocated (the node side-table universe).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the arena holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Convenience constructor for an integer literal.
    pub fn int(&mut self, value: i64, ty: Ty) -> ExprId {
        self.alloc(Expr::Leaf(Leaf::IntConst(value)), ty)
    }

    /// Convenience constructor for a symbol read.
    pub fn sym(&mut self, sym: SymbolId, ty: Ty) -> ExprId {
        self.alloc(Expr::Leaf(Leaf::Sym(sym)), ty)
    }

    /// Deep-copies the subtree rooted at `id` into fresh nodes.
    pub fn copy_subtree(&mut self, id: ExprId) -> ExprId {
        let node = self.node(id).clone();
        let kind = match node.kind {
            Expr::Leaf(leaf) => Expr::Leaf(leaf),
            Expr::Unary { op, opnd } => Expr::Unary {
                op,
                opnd: self.copy_subtree(opnd),
            },
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.copy_subtree(lhs);
                let rhs = self.copy_subtree(rhs);
                Expr::Binary { op, lhs, rhs }
            }
            Expr::Short { op, lhs, rhs } => {
                let lhs = self.copy_subtree(lhs);
                let rhs = self.copy_subtree(rhs);
                Expr::Short { op, lhs, rhs }
            }
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => {
                let cond = self.copy_subtree(cond);
                let then_val = self.copy_subtree(then_val);
                let else_val = self.copy_subtree(else_val);
                Expr::Ternary {
                    cond,
                    then_val,
                    else_val,
                }
            }
            Expr::Assign { op, target, value } => {
                let value = self.copy_subtree(value);
                let target = self.copy_subtree(target);
                Expr::Assign { op, target, value }
            }
            Expr::Call { callee, args } => {
                let args = args.iter().map(|&a| self.copy_subtree(a)).collect();
                let callee = self.copy_subtree(callee);
                Expr::Call { callee, args }
            }
            Expr::Asm => Expr::Asm,
            Expr::Seq { first, second } => {
                let first = self.copy_subtree(first);
                let second = self.copy_subtree(second);
                Expr::Seq { first, second }
            }
        };
        self.alloc(kind, node.ty)
    }

    /// Visits every node of the subtree at `root` in evaluation order:
    /// operands first (value before target for assignments, arguments before
    /// callee for calls), then the operator itself. Conditionally-evaluated
    /// operands are still visited; callers that care about conditional
    /// evaluation recurse themselves.
    pub fn visit_eval_order(&self, root: ExprId, visit: &mut impl FnMut(ExprId)) {
        match &self.node(root).kind {
            Expr::Leaf(_) | Expr::Asm => {}
            Expr::Unary { opnd, .. } => self.visit_eval_order(*opnd, visit),
            Expr::Binary { lhs, rhs, .. }
            | Expr::Short { lhs, rhs, .. }
            | Expr::Seq {
                first: lhs,
                second: rhs,
            } => {
                self.visit_eval_order(*lhs, visit);
                self.visit_eval_order(*rhs, visit);
            }
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => {
                self.visit_eval_order(*cond, visit);
                self.visit_eval_order(*then_val, visit);
                self.visit_eval_order(*else_val, visit);
            }
            Expr::Assign { target, value, .. } => {
                self.visit_eval_order(*value, visit);
                self.visit_eval_order(*target, visit);
            }
            Expr::Call { callee, args } => {
                for &arg in args {
                    self.visit_eval_order(arg, visit);
                }
                self.visit_eval_order(*callee, visit);
            }
        }
        visit(root);
    }

    /// Returns `true` if the subtree at `id` has no side effects: no
    /// assignment, call, inline assembly or volatile symbol read.
    #[must_use]
    pub fn is_pure(&self, id: ExprId, volatile: &impl Fn(SymbolId) -> bool) -> bool {
        match &self.node(id).kind {
            Expr::Leaf(Leaf::Sym(sym)) => !volatile(*sym),
            Expr::Leaf(_) => true,
            Expr::Unary { opnd, .. } => self.is_pure(*opnd, volatile),
            Expr::Binary { lhs, rhs, .. } | Expr::Short { lhs, rhs, .. } => {
                self.is_pure(*lhs, volatile) && self.is_pure(*rhs, volatile)
            }
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => {
                self.is_pure(*cond, volatile)
                    && self.is_pure(*then_val, volatile)
                    && self.is_pure(*else_val, volatile)
            }
            Expr::Assign { .. } | Expr::Call { .. } | Expr::Asm => false,
            Expr::Seq { first, second } => {
                self.is_pure(*first, volatile) && self.is_pure(*second, volatile)
            }
        }
    }

    /// Returns `true` if the subtree at `id` contains a [`UnaryOp::Deref`]
    /// or [`UnaryOp::DispatchLoad`].
    #[must_use]
    pub fn contains_deref(&self, id: ExprId) -> bool {
        let mut found = false;
        self.visit_eval_order(id, &mut |n| {
            if matches!(
                self.node(n).kind,
                Expr::Unary {
                    op: UnaryOp::Deref | UnaryOp::DispatchLoad,
                    ..
                }
            ) {
                found = true;
            }
        });
        found
    }

    /// Collects every symbol read anywhere in the subtree at `id` into
    /// `out`, including reads on assignment target paths.
    pub fn collect_symbol_reads(&self, id: ExprId, out: &mut impl FnMut(SymbolId)) {
        self.visit_eval_order(id, &mut |n| {
            if let Expr::Leaf(Leaf::Sym(sym)) = self.node(n).kind {
                out(sym);
            }
        });
    }

    /// If the node is an integer literal, returns its value.
    #[must_use]
    pub fn int_const(&self, id: ExprId) -> Option<i64> {
        match self.node(id).kind {
            Expr::Leaf(Leaf::IntConst(v)) => Some(v),
            _ => None,
        }
    }

    /// If the node is a plain symbol read, returns the symbol.
    #[must_use]
    pub fn as_sym_read(&self, id: ExprId) -> Option<SymbolId> {
        match self.node(id).kind {
            Expr::Leaf(Leaf::Sym(sym)) => Some(sym),
            _ => None,
        }
    }

    /// Structural equality of two subtrees (same operators, literals,
    /// symbols and shapes; node ids are irrelevant).
    #[must_use]
    pub fn trees_equal(&self, a: ExprId, b: ExprId) -> bool {
        let (na, nb) = (self.node(a), self.node(b));
        if na.ty != nb.ty {
            return false;
        }
        match (&na.kind, &nb.kind) {
            (Expr::Leaf(la), Expr::Leaf(lb)) => la == lb,
            (Expr::Unary { op: oa, opnd: a1 }, Expr::Unary { op: ob, opnd: b1 }) => {
                oa == ob && self.trees_equal(*a1, *b1)
            }
            (
                Expr::Binary {
                    op: oa,
                    lhs: a1,
                    rhs: a2,
                },
                Expr::Binary {
                    op: ob,
                    lhs: b1,
                    rhs: b2,
                },
            ) => oa == ob && self.trees_equal(*a1, *b1) && self.trees_equal(*a2, *b2),
            (
                Expr::Short {
                    op: oa,
                    lhs: a1,
                    rhs: a2,
                },
                Expr::Short {
                    op: ob,
                    lhs: b1,
                    rhs: b2,
                },
            ) => oa == ob && self.trees_equal(*a1, *b1) && self.trees_equal(*a2, *b2),
            (
                Expr::Ternary {
                    cond: a1,
                    then_val: a2,
                    else_val: a3,
                },
                Expr::Ternary {
                    cond: b1,
                    then_val: b2,
                    else_val: b3,
                },
            ) => {
                self.trees_equal(*a1, *b1)
                    && self.trees_equal(*a2, *b2)
                    && self.trees_equal(*a3, *b3)
            }
            (
                Expr::Assign {
                    op: oa,
                    target: a1,
                    value: a2,
                },
                Expr::Assign {
                    op: ob,
                    target: b1,
                    value: b2,
                },
            ) => oa == ob && self.trees_equal(*a1, *b1) && self.trees_equal(*a2, *b2),
            (
                Expr::Call {
                    callee: ca,
                    args: aa,
                },
                Expr::Call {
                    callee: cb,
                    args: ab,
                },
            ) => {
                self.trees_equal(*ca, *cb)
                    && aa.len() == ab.len()
                    && aa.iter().zip(ab).all(|(&x, &y)| self.trees_equal(x, y))
            }
            (Expr::Asm, Expr::Asm) => true,
            (
                Expr::Seq {
                    first: a1,
                    second: a2,
                },
                Expr::Seq {
                    first: b1,
                    second: b2,
                },
            ) => self.trees_equal(*a1, *b1) && self.trees_equal(*a2, *b2),
            _ => false,
        }
    }

    /// Renders the subtree at `id` as a compact string for events and
    /// debugging.
    #[must_use]
    pub fn dump(&self, id: ExprId) -> String {
        match &self.node(id).kind {
            Expr::Leaf(Leaf::IntConst(v)) => format!("{v}"),
            Expr::Leaf(Leaf::FloatConst(v)) => format!("{v}"),
            Expr::Leaf(Leaf::Sym(sym)) => format!("{sym}"),
            Expr::Unary { op, opnd } => format!("{op:?}({})", self.dump(*opnd)),
            Expr::Binary { op, lhs, rhs } => {
                format!("({} {op:?} {})", self.dump(*lhs), self.dump(*rhs))
            }
            Expr::Short { op, lhs, rhs } => {
                format!("({} {op:?} {})", self.dump(*lhs), self.dump(*rhs))
            }
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => format!(
                "({} ? {} : {})",
                self.dump(*cond),
                self.dump(*then_val),
                self.dump(*else_val)
            ),
            Expr::Assign { op, target, value } => {
                format!("({} {op:?} {})", self.dump(*target), self.dump(*value))
            }
            Expr::Call { callee, args } => {
                let args: Vec<_> = args.iter().map(|&a| self.dump(a)).collect();
                format!("call {}({})", self.dump(*callee), args.join(", "))
            }
            Expr::Asm => "asm".to_string(),
            Expr::Seq { first, second } => {
                format!("{}, {}", self.dump(*first), self.dump(*second))
            }
        }
    }
}
