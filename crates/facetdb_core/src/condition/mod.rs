//! Query condition trees.
//!
//! A condition is a composable, database-independent description of a
//! query filter. It is a closed tagged union so the compiler can match
//! exhaustively; adding a new condition kind without teaching the
//! compiler about it is a compile-time error.

mod compile;

pub use compile::{compile, validate, CompiledCondition};

use facetdb_schema::{FieldValue, FieldValues};

/// How sibling clauses are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOp {
    /// All clauses must match.
    And,
    /// Any clause may match.
    Or,
}

impl JoinOp {
    /// The SQL keyword for this combinator.
    pub fn sql(self) -> &'static str {
        match self {
            JoinOp::And => "AND",
            JoinOp::Or => "OR",
        }
    }
}

/// Comparison operator of a [`Comparison`] condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Equals,
    /// `<>`
    NotEquals,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
    /// `LIKE`
    Like,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
}

impl CompareOp {
    /// The SQL spelling of this operator.
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "<>",
            CompareOp::LessThan => "<",
            CompareOp::LessThanEqual => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanEqual => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::In => "IN",
            CompareOp::NotIn => "NOT IN",
        }
    }

    /// Whether this is a set-membership operator.
    pub fn is_membership(self) -> bool {
        matches!(self, CompareOp::In | CompareOp::NotIn)
    }
}

/// Right-hand side of a comparison: one literal or a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single literal value.
    Value(FieldValue),
    /// A collection, for membership operators.
    Collection(Vec<FieldValue>),
}

/// A single field comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// The field being compared.
    pub field: String,
    /// The comparison operator.
    pub op: CompareOp,
    /// The right-hand side.
    pub operand: Operand,
    /// Case-fold the field side (wraps the column in `UPPER`).
    pub fold_field: bool,
    /// Case-fold the operand side (uppercases string literals).
    pub fold_operand: bool,
}

impl Comparison {
    /// Creates a comparison with no case folding.
    pub fn new(field: impl Into<String>, op: CompareOp, operand: Operand) -> Self {
        Self {
            field: field.into(),
            op,
            operand,
            fold_field: false,
            fold_operand: false,
        }
    }

    /// Enables case folding on the field side.
    #[must_use]
    pub fn fold_field(mut self) -> Self {
        self.fold_field = true;
        self
    }

    /// Enables case folding on the operand side.
    #[must_use]
    pub fn fold_operand(mut self) -> Self {
        self.fold_operand = true;
        self
    }
}

/// A composable query filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A single field comparison.
    Comparison(Comparison),
    /// Field-to-value equality map; compiles in descriptor field order.
    FieldMap {
        /// Field name to expected value.
        fields: FieldValues,
        /// Combinator between the per-field clauses.
        join: JoinOp,
    },
    /// A list of sub-conditions, each parenthesized.
    List {
        /// The sub-conditions.
        items: Vec<Condition>,
        /// Combinator between siblings.
        join: JoinOp,
    },
}

impl Condition {
    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::cmp(field, CompareOp::Equals, value)
    }

    /// `field <> value`
    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::cmp(field, CompareOp::NotEquals, value)
    }

    /// A comparison with an arbitrary operator.
    pub fn cmp(
        field: impl Into<String>,
        op: CompareOp,
        value: impl Into<FieldValue>,
    ) -> Self {
        Condition::Comparison(Comparison::new(field, op, Operand::Value(value.into())))
    }

    /// A case-insensitive comparison: both sides fold.
    pub fn cmp_folded(
        field: impl Into<String>,
        op: CompareOp,
        value: impl Into<FieldValue>,
    ) -> Self {
        Condition::Comparison(
            Comparison::new(field, op, Operand::Value(value.into()))
                .fold_field()
                .fold_operand(),
        )
    }

    /// `field IN (values...)`
    pub fn in_values<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Condition::Comparison(Comparison::new(
            field,
            CompareOp::In,
            Operand::Collection(values.into_iter().map(Into::into).collect()),
        ))
    }

    /// An AND-joined field-value map.
    pub fn field_map(fields: FieldValues) -> Self {
        Condition::FieldMap {
            fields,
            join: JoinOp::And,
        }
    }

    /// A field-value map with an explicit combinator.
    pub fn field_map_join(fields: FieldValues, join: JoinOp) -> Self {
        Condition::FieldMap { fields, join }
    }

    /// An AND-joined list of sub-conditions.
    pub fn and(items: Vec<Condition>) -> Self {
        Condition::List {
            items,
            join: JoinOp::And,
        }
    }

    /// An OR-joined list of sub-conditions.
    pub fn or(items: Vec<Condition>) -> Self {
        Condition::List {
            items,
            join: JoinOp::Or,
        }
    }
}
