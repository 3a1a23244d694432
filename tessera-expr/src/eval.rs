use crate::error::{Error, Result};
use crate::expr::{ArithOp, CompareOp, ConjOp, Expr, ExprKind};
use std::cmp::Ordering;
use tessera_datatype::Value;

/// ColumnSource abstracts a row that expressions can read from.
/// Tuples of tables, key rows and plain value rows all implement it.
pub trait ColumnSource {
    fn column_value(&self, idx: usize) -> Value;

    /// Storage address of the row, if it is a persistent table row.
    #[inline]
    fn address(&self) -> Option<u64> {
        None
    }
}

impl ColumnSource for Vec<Value> {
    #[inline]
    fn column_value(&self, idx: usize) -> Value {
        self[idx].clone()
    }
}

/// Input of one evaluation: the outer tuple, the optional inner
/// tuple of a join, and the parameters of current execution.
#[derive(Clone, Copy)]
pub struct EvalInput<'a> {
    pub outer: Option<&'a dyn ColumnSource>,
    pub inner: Option<&'a dyn ColumnSource>,
    pub params: &'a [Value],
}

impl<'a> EvalInput<'a> {
    #[inline]
    pub fn new(params: &'a [Value]) -> Self {
        EvalInput {
            outer: None,
            inner: None,
            params,
        }
    }

    #[inline]
    pub fn with_outer(params: &'a [Value], outer: &'a dyn ColumnSource) -> Self {
        EvalInput {
            outer: Some(outer),
            inner: None,
            params,
        }
    }

    #[inline]
    pub fn with_join(
        params: &'a [Value],
        outer: &'a dyn ColumnSource,
        inner: &'a dyn ColumnSource,
    ) -> Self {
        EvalInput {
            outer: Some(outer),
            inner: Some(inner),
            params,
        }
    }
}

impl Expr {
    /// Evaluates the expression with SQL three-valued logic.
    /// Comparison with null yields null, AND/OR short-circuit on
    /// false/true respectively.
    pub fn eval(&self, input: &EvalInput<'_>) -> Result<Value> {
        match &self.kind {
            ExprKind::TupleValue {
                tuple_idx,
                column_idx,
            } => {
                let src = match tuple_idx {
                    0 => input.outer.ok_or(Error::MissingTuple("outer"))?,
                    1 => input.inner.ok_or(Error::MissingTuple("inner"))?,
                    other => return Err(Error::TupleIndexOutOfRange(*other)),
                };
                Ok(src.column_value(*column_idx))
            }
            ExprKind::TupleAddress => {
                let src = input.outer.ok_or(Error::MissingTuple("outer"))?;
                Ok(src.address().map(Value::Address).unwrap_or(Value::Null))
            }
            ExprKind::Constant(v) => Ok(v.clone()),
            ExprKind::Parameter(idx) => input
                .params
                .get(*idx)
                .cloned()
                .ok_or(Error::ParamOutOfRange(*idx)),
            ExprKind::Compare { op, lhs, rhs } => {
                let l = lhs.eval(input)?;
                let r = rhs.eval(input)?;
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let ord = l.compare(&r)?;
                Ok(Value::Boolean(compare_holds(*op, ord)))
            }
            ExprKind::Conj { op, lhs, rhs } => {
                let l = lhs.eval(input)?;
                match op {
                    ConjOp::And => {
                        if l.is_false() {
                            return Ok(Value::Boolean(false));
                        }
                        let r = rhs.eval(input)?;
                        if r.is_false() {
                            Ok(Value::Boolean(false))
                        } else if l.is_null() || r.is_null() {
                            Ok(Value::Null)
                        } else {
                            Ok(Value::Boolean(true))
                        }
                    }
                    ConjOp::Or => {
                        if l.is_true() {
                            return Ok(Value::Boolean(true));
                        }
                        let r = rhs.eval(input)?;
                        if r.is_true() {
                            Ok(Value::Boolean(true))
                        } else if l.is_null() || r.is_null() {
                            Ok(Value::Null)
                        } else {
                            Ok(Value::Boolean(false))
                        }
                    }
                }
            }
            ExprKind::Arith { op, lhs, rhs } => {
                let l = lhs.eval(input)?;
                let r = rhs.eval(input)?;
                let res = match op {
                    ArithOp::Add => l.add(&r)?,
                    ArithOp::Sub => l.sub(&r)?,
                    ArithOp::Mul => l.mul(&r)?,
                    ArithOp::Div => l.div(&r)?,
                };
                Ok(res)
            }
            ExprKind::Not(arg) => match arg.eval(input)? {
                Value::Null => Ok(Value::Null),
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                other => Err(Error::InvalidExpression(format!(
                    "NOT applied to {}",
                    other.type_name()
                ))),
            },
            ExprKind::IsNull(arg) => Ok(Value::Boolean(arg.eval(input)?.is_null())),
            ExprKind::Cast(arg) => Ok(arg.eval(input)?.cast_as(self.ty)?),
        }
    }

    /// Evaluates the expression as a predicate. Null is not satisfied.
    #[inline]
    pub fn eval_pred(&self, input: &EvalInput<'_>) -> Result<bool> {
        Ok(self.eval(input)?.is_true())
    }
}

#[inline]
fn compare_holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Equal => ord == Ordering::Equal,
        CompareOp::NotEqual => ord != Ordering::Equal,
        CompareOp::Less => ord == Ordering::Less,
        CompareOp::LessEqual => ord != Ordering::Greater,
        CompareOp::Greater => ord == Ordering::Greater,
        CompareOp::GreaterEqual => ord != Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_datatype::ValueType;

    #[test]
    fn test_eval_join_columns() {
        let outer = vec![Value::Integer(1), Value::varchar("a")];
        let inner = vec![Value::BigInt(1)];
        let pred = Expr::equal(
            Expr::tuple_value(0, ValueType::Integer),
            Expr::inner_value(0, ValueType::BigInt),
        );
        let input = EvalInput::with_join(&[], &outer, &inner);
        assert!(pred.eval_pred(&input).unwrap());
        let missing = EvalInput::with_outer(&[], &outer);
        assert_eq!(pred.eval(&missing), Err(Error::MissingTuple("inner")));
    }

    #[test]
    fn test_eval_three_valued_logic() {
        let null = Expr::constant(Value::Null);
        let t = Expr::constant(Value::Boolean(true));
        let f = Expr::constant(Value::Boolean(false));
        let input = EvalInput::new(&[]);
        assert!(Expr::and(null.clone(), t.clone()).eval(&input).unwrap().is_null());
        assert!(Expr::and(null.clone(), f.clone()).eval(&input).unwrap().is_false());
        assert!(Expr::or(null.clone(), t.clone()).eval(&input).unwrap().is_true());
        assert!(Expr::or(null.clone(), f.clone()).eval(&input).unwrap().is_null());
        assert!(Expr::not(null.clone()).eval(&input).unwrap().is_null());
        let cmp = Expr::equal(null.clone(), Expr::constant(Value::Integer(1)));
        assert!(cmp.eval(&input).unwrap().is_null());
        assert!(!cmp.eval_pred(&input).unwrap());
        assert!(Expr::is_null(null).eval_pred(&input).unwrap());
    }

    #[test]
    fn test_eval_params_and_arith() {
        let params = vec![Value::Integer(40), Value::Integer(0)];
        let input = EvalInput::new(&params);
        let add = Expr::arith(
            ArithOp::Add,
            Expr::param(0, ValueType::Integer),
            Expr::constant(Value::TinyInt(2)),
        );
        assert_eq!(add.eval(&input).unwrap(), Value::BigInt(42));
        let div = Expr::arith(
            ArithOp::Div,
            Expr::param(0, ValueType::Integer),
            Expr::param(1, ValueType::Integer),
        );
        assert!(div.eval(&input).is_err());
        assert_eq!(
            Expr::param(5, ValueType::Integer).eval(&input),
            Err(Error::ParamOutOfRange(5))
        );
        let cast = Expr::cast(Expr::constant(Value::BigInt(300)), ValueType::TinyInt);
        assert_eq!(
            cast.eval(&input),
            Err(Error::Data(tessera_datatype::Error::NumericOverflow))
        );
    }
}
