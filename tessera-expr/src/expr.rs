use serde::Deserialize;
use tessera_datatype::{Value, ValueType};

/// Expr is a resolved scalar expression attached to plan nodes.
/// All column references are positional: `tuple_idx` 0 is the outer
/// (or only) tuple and 1 is the inner tuple of a join.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "crate::json::ExprDoc")]
pub struct Expr {
    pub kind: ExprKind,
    /// Declared result type. Null if unknown.
    pub ty: ValueType,
    /// Declared result size of variable-length type.
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    TupleValue { tuple_idx: usize, column_idx: usize },
    /// Address of the current outer tuple in persistent storage.
    TupleAddress,
    Constant(Value),
    Parameter(usize),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conj {
        op: ConjOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    Cast(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConjOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl Expr {
    #[inline]
    pub fn new(kind: ExprKind, ty: ValueType) -> Self {
        Expr { kind, ty, size: 0 }
    }

    #[inline]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    #[inline]
    pub fn tuple_value(column_idx: usize, ty: ValueType) -> Self {
        Expr::new(
            ExprKind::TupleValue {
                tuple_idx: 0,
                column_idx,
            },
            ty,
        )
    }

    #[inline]
    pub fn inner_value(column_idx: usize, ty: ValueType) -> Self {
        Expr::new(
            ExprKind::TupleValue {
                tuple_idx: 1,
                column_idx,
            },
            ty,
        )
    }

    #[inline]
    pub fn tuple_address() -> Self {
        Expr::new(ExprKind::TupleAddress, ValueType::Address)
    }

    #[inline]
    pub fn constant(v: Value) -> Self {
        let ty = v.value_type();
        let size = v.as_bytes().map(|bs| bs.len() as u32).unwrap_or(0);
        Expr::new(ExprKind::Constant(v), ty).with_size(size)
    }

    #[inline]
    pub fn param(idx: usize, ty: ValueType) -> Self {
        Expr::new(ExprKind::Parameter(idx), ty)
    }

    #[inline]
    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::new(
            ExprKind::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ValueType::Boolean,
        )
    }

    #[inline]
    pub fn equal(lhs: Expr, rhs: Expr) -> Self {
        Expr::compare(CompareOp::Equal, lhs, rhs)
    }

    #[inline]
    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::new(
            ExprKind::Conj {
                op: ConjOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ValueType::Boolean,
        )
    }

    #[inline]
    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::new(
            ExprKind::Conj {
                op: ConjOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ValueType::Boolean,
        )
    }

    /// Builds conjunction of all given predicates, None if empty.
    #[inline]
    pub fn conjunction(preds: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        preds.into_iter().reduce(Expr::and)
    }

    #[inline]
    pub fn arith(op: ArithOp, lhs: Expr, rhs: Expr) -> Self {
        let ty = if lhs.ty == ValueType::Double || rhs.ty == ValueType::Double {
            ValueType::Double
        } else {
            ValueType::BigInt
        };
        Expr::new(
            ExprKind::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        )
    }

    #[inline]
    pub fn not(arg: Expr) -> Self {
        Expr::new(ExprKind::Not(Box::new(arg)), ValueType::Boolean)
    }

    #[inline]
    pub fn is_null(arg: Expr) -> Self {
        Expr::new(ExprKind::IsNull(Box::new(arg)), ValueType::Boolean)
    }

    #[inline]
    pub fn cast(arg: Expr, ty: ValueType) -> Self {
        Expr::new(ExprKind::Cast(Box::new(arg)), ty)
    }

    /// Returns column index if this is a plain reference to outer tuple.
    #[inline]
    pub fn as_outer_column(&self) -> Option<usize> {
        match &self.kind {
            ExprKind::TupleValue {
                tuple_idx: 0,
                column_idx,
            } => Some(*column_idx),
            _ => None,
        }
    }

    #[inline]
    pub fn as_param(&self) -> Option<usize> {
        match &self.kind {
            ExprKind::Parameter(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Returns true if the expression reads no tuple at all,
    /// so it can be evaluated once per execution.
    pub fn is_tuple_free(&self) -> bool {
        match &self.kind {
            ExprKind::TupleValue { .. } | ExprKind::TupleAddress => false,
            ExprKind::Constant(_) | ExprKind::Parameter(_) => true,
            ExprKind::Compare { lhs, rhs, .. }
            | ExprKind::Conj { lhs, rhs, .. }
            | ExprKind::Arith { lhs, rhs, .. } => lhs.is_tuple_free() && rhs.is_tuple_free(),
            ExprKind::Not(arg) | ExprKind::IsNull(arg) | ExprKind::Cast(arg) => {
                arg.is_tuple_free()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_builders() {
        let e = Expr::and(
            Expr::equal(
                Expr::tuple_value(0, ValueType::Integer),
                Expr::constant(Value::Integer(1)),
            ),
            Expr::compare(
                CompareOp::Less,
                Expr::inner_value(2, ValueType::BigInt),
                Expr::param(0, ValueType::BigInt),
            ),
        );
        assert_eq!(e.ty, ValueType::Boolean);
        assert!(!e.is_tuple_free());
        assert_eq!(Expr::tuple_value(3, ValueType::Integer).as_outer_column(), Some(3));
        assert_eq!(Expr::inner_value(3, ValueType::Integer).as_outer_column(), None);
        assert_eq!(Expr::param(2, ValueType::Integer).as_param(), Some(2));
        let a = Expr::arith(
            ArithOp::Add,
            Expr::param(0, ValueType::Integer),
            Expr::constant(Value::Double(0.5)),
        );
        assert_eq!(a.ty, ValueType::Double);
        assert!(a.is_tuple_free());
    }

    #[test]
    fn test_conjunction() {
        assert!(Expr::conjunction(vec![]).is_none());
        let single = Expr::conjunction(vec![Expr::constant(Value::Boolean(true))]).unwrap();
        assert!(matches!(single.kind, ExprKind::Constant(_)));
        let multi = Expr::conjunction(vec![
            Expr::constant(Value::Boolean(true)),
            Expr::constant(Value::Boolean(false)),
            Expr::constant(Value::Null),
        ])
        .unwrap();
        assert!(matches!(multi.kind, ExprKind::Conj { op: ConjOp::And, .. }));
    }
}
