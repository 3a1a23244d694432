use crate::error::Error;
use crate::expr::{ArithOp, CompareOp, ConjOp, Expr, ExprKind};
use serde::Deserialize;
use std::sync::Arc;
use tessera_datatype::{Value, ValueType};

/// Raw expression node as it appears in a plan document.
/// Fields not used by a given expression type are simply absent.
#[derive(Debug, Deserialize)]
pub(crate) struct ExprDoc {
    #[serde(rename = "TYPE")]
    kind: String,
    #[serde(rename = "VALUE_TYPE", default)]
    value_type: Option<ValueType>,
    #[serde(rename = "VALUE_SIZE", default)]
    value_size: Option<u32>,
    #[serde(rename = "LEFT", default)]
    left: Option<Box<Expr>>,
    #[serde(rename = "RIGHT", default)]
    right: Option<Box<Expr>>,
    #[serde(rename = "COLUMN_IDX", default)]
    column_idx: Option<usize>,
    #[serde(rename = "TABLE_IDX", default)]
    table_idx: Option<usize>,
    #[serde(rename = "PARAM_IDX", default)]
    param_idx: Option<usize>,
    #[serde(rename = "VALUE", default)]
    value: Option<serde_json::Value>,
    #[serde(rename = "ISNULL", default)]
    is_null: bool,
}

impl TryFrom<ExprDoc> for Expr {
    type Error = Error;

    fn try_from(doc: ExprDoc) -> Result<Self, Self::Error> {
        let ty = doc.value_type.unwrap_or(ValueType::Null);
        let size = doc.value_size.unwrap_or(0);
        let kind = match doc.kind.as_str() {
            "VALUE_TUPLE" => ExprKind::TupleValue {
                tuple_idx: doc.table_idx.unwrap_or(0),
                column_idx: doc.column_idx.ok_or_else(|| missing("COLUMN_IDX"))?,
            },
            "VALUE_TUPLE_ADDRESS" => ExprKind::TupleAddress,
            "VALUE_PARAMETER" => {
                ExprKind::Parameter(doc.param_idx.ok_or_else(|| missing("PARAM_IDX"))?)
            }
            "VALUE_CONSTANT" => {
                if doc.is_null {
                    ExprKind::Constant(Value::Null)
                } else {
                    let raw = doc.value.ok_or_else(|| missing("VALUE"))?;
                    ExprKind::Constant(constant_from_json(&raw, ty)?)
                }
            }
            "OPERATOR_NOT" => ExprKind::Not(doc.left.ok_or_else(|| missing("LEFT"))?),
            "OPERATOR_IS_NULL" => ExprKind::IsNull(doc.left.ok_or_else(|| missing("LEFT"))?),
            "OPERATOR_CAST" => ExprKind::Cast(doc.left.ok_or_else(|| missing("LEFT"))?),
            other => {
                let lhs = doc.left.ok_or_else(|| missing("LEFT"))?;
                let rhs = doc.right.ok_or_else(|| missing("RIGHT"))?;
                binary_kind(other, lhs, rhs)?
            }
        };
        let ty = match &kind {
            ExprKind::Compare { .. }
            | ExprKind::Conj { .. }
            | ExprKind::Not(_)
            | ExprKind::IsNull(_) => ValueType::Boolean,
            ExprKind::TupleAddress => ValueType::Address,
            ExprKind::Constant(v) if ty == ValueType::Null => v.value_type(),
            _ => ty,
        };
        Ok(Expr { kind, ty, size })
    }
}

fn binary_kind(name: &str, lhs: Box<Expr>, rhs: Box<Expr>) -> Result<ExprKind, Error> {
    let compare_op = match name {
        "COMPARE_EQUAL" => Some(CompareOp::Equal),
        "COMPARE_NOTEQUAL" => Some(CompareOp::NotEqual),
        "COMPARE_LESSTHAN" => Some(CompareOp::Less),
        "COMPARE_LESSTHANOREQUALTO" => Some(CompareOp::LessEqual),
        "COMPARE_GREATERTHAN" => Some(CompareOp::Greater),
        "COMPARE_GREATERTHANOREQUALTO" => Some(CompareOp::GreaterEqual),
        _ => None,
    };
    if let Some(op) = compare_op {
        return Ok(ExprKind::Compare { op, lhs, rhs });
    }
    let kind = match name {
        "CONJUNCTION_AND" => ExprKind::Conj { op: ConjOp::And, lhs, rhs },
        "CONJUNCTION_OR" => ExprKind::Conj { op: ConjOp::Or, lhs, rhs },
        "OPERATOR_PLUS" => ExprKind::Arith { op: ArithOp::Add, lhs, rhs },
        "OPERATOR_MINUS" => ExprKind::Arith { op: ArithOp::Sub, lhs, rhs },
        "OPERATOR_MULTIPLY" => ExprKind::Arith { op: ArithOp::Mul, lhs, rhs },
        "OPERATOR_DIVIDE" => ExprKind::Arith { op: ArithOp::Div, lhs, rhs },
        other => {
            return Err(Error::InvalidExpression(format!(
                "unsupported expression type {}",
                other
            )))
        }
    };
    Ok(kind)
}

/// Converts a JSON literal into a value of declared type.
fn constant_from_json(raw: &serde_json::Value, ty: ValueType) -> Result<Value, Error> {
    let invalid = || {
        Error::InvalidExpression(format!("constant {} is not a valid {}", raw, ty.name()))
    };
    let v = match ty {
        ValueType::Double => Value::Double(raw.as_f64().ok_or_else(invalid)?),
        ValueType::Varchar => Value::Varchar(Arc::from(raw.as_str().ok_or_else(invalid)?)),
        ValueType::Varbinary => {
            let hex = raw.as_str().ok_or_else(invalid)?;
            Value::Varbinary(Arc::from(decode_hex(hex).ok_or_else(invalid)?))
        }
        ValueType::Boolean => Value::Boolean(raw.as_bool().ok_or_else(invalid)?),
        ValueType::Null => match raw {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::String(s) => Value::varchar(s),
            n => match n.as_i64() {
                Some(i) => Value::BigInt(i),
                None => Value::Double(n.as_f64().ok_or_else(invalid)?),
            },
        },
        ValueType::Address => Value::Address(raw.as_u64().ok_or_else(invalid)?),
        integral => Value::BigInt(raw.as_i64().ok_or_else(invalid)?).cast_as(integral)?,
    };
    Ok(v)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[inline]
fn missing(field: &str) -> Error {
    Error::InvalidExpression(format!("missing field {}", field))
}
