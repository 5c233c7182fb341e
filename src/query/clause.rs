//! Filter operators, where clauses and sort orders.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::Error;

/// Filter operators understood by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Empty,
    NotEmpty,
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    StartsWith,
    EndsWith,
    Contains,
    NotStartsWith,
    NotEndsWith,
    NotContains,
    Between,
    NotBetween,
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Operator::Empty,
        Operator::NotEmpty,
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Gt,
        Operator::Lte,
        Operator::Gte,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Contains,
        Operator::NotStartsWith,
        Operator::NotEndsWith,
        Operator::NotContains,
        Operator::Between,
        Operator::NotBetween,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Operator::Empty => "empty",
            Operator::NotEmpty => "not-empty",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Gte => "gte",
            Operator::StartsWith => "starts-with",
            Operator::EndsWith => "ends-with",
            Operator::Contains => "contains",
            Operator::NotStartsWith => "not-starts-with",
            Operator::NotEndsWith => "not-ends-with",
            Operator::NotContains => "not-contains",
            Operator::Between => "between",
            Operator::NotBetween => "not-between",
        }
    }

    /// Number of operands the operator takes.
    pub const fn arity(&self) -> usize {
        match self {
            Operator::Empty | Operator::NotEmpty => 0,
            Operator::Between | Operator::NotBetween => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown operator [{s}]")))
    }
}

/// One filter constraint. All constraints apply (AND).
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// `column op[:value]`.
    Basic {
        column: String,
        operator: Operator,
        value: Option<Value>,
    },
    /// `column in (values)`.
    In { column: String, values: Vec<Value> },
}

impl Where {
    /// Build a validated basic clause.
    ///
    /// Operators that take operands reject a missing or null value; `between`
    /// operators need exactly two.
    pub fn basic(column: impl Into<String>, operator: Operator, value: Option<Value>) -> crate::error::Result<Self> {
        let column = column.into();
        let value = value.filter(|v| !v.is_null());

        match (operator.arity(), &value) {
            (0, Some(_)) => {
                return Err(Error::InvalidArgument(format!(
                    "operator [{operator}] on [{column}] takes no value"
                )))
            }
            (1, None) | (2, None) => {
                return Err(Error::InvalidArgument(format!(
                    "illegal operator and value combination: [{operator}] on [{column}] needs a value"
                )))
            }
            (2, Some(Value::Array(items))) if items.len() != 2 || items.iter().any(Value::is_null) => {
                return Err(Error::InvalidArgument(format!(
                    "operator [{operator}] on [{column}] needs exactly two values"
                )))
            }
            (2, Some(other)) if !other.is_array() => {
                return Err(Error::InvalidArgument(format!(
                    "operator [{operator}] on [{column}] needs a pair of values"
                )))
            }
            _ => {}
        }

        Ok(Where::Basic {
            column,
            operator,
            value,
        })
    }

    pub fn column(&self) -> &str {
        match self {
            Where::Basic { column, .. } | Where::In { column, .. } => column,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// Anything other than a case-insensitive `asc` sorts descending.
impl From<&str> for Direction {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("asc") {
            Direction::Asc
        } else {
            Direction::Desc
        }
    }
}

/// One sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}
