//! Condition compiler: condition tree to SQL fragment plus bind values.

use crate::condition::{Comparison, CompareOp, Condition, Operand};
use crate::error::{EngineError, EngineResult};
use facetdb_schema::{EntityDescriptor, FieldValue};
use std::fmt::Write;

/// A compiled condition: SQL fragment and bind values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    /// SQL fragment, with `?` placeholders. Empty for an empty condition.
    pub clause: String,
    /// Bind values, one per placeholder, in order.
    pub binds: Vec<FieldValue>,
}

impl CompiledCondition {
    /// An empty compiled condition: no clause, no binds.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            clause: String::new(),
            binds: Vec::new(),
        }
    }

    /// Whether the condition compiled to nothing (no WHERE clause needed).
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Compiles a condition against a descriptor.
///
/// Compilation is deterministic: the same tree always yields the same
/// fragment and bind order, and field maps emit clauses in the
/// descriptor's declared field order so that logically identical filters
/// are byte-identical. The compiler performs no I/O.
///
/// # Errors
///
/// `Validation` for unknown fields or malformed operands,
/// `NotImplemented` for operator/operand combinations the engine does
/// not support.
pub fn compile(
    condition: &Condition,
    descriptor: &EntityDescriptor,
) -> EngineResult<CompiledCondition> {
    let mut compiled = CompiledCondition {
        clause: String::new(),
        binds: Vec::new(),
    };
    write_condition(condition, descriptor, &mut compiled)?;
    Ok(compiled)
}

/// Checks that every field referenced by a condition exists on the
/// descriptor, failing with the first unknown field found.
///
/// # Errors
///
/// `Validation` naming the first unknown field.
pub fn validate(condition: &Condition, descriptor: &EntityDescriptor) -> EngineResult<()> {
    match condition {
        Condition::Comparison(cmp) => {
            resolve_column(descriptor, &cmp.field)?;
            Ok(())
        }
        Condition::FieldMap { fields, .. } => {
            for field in fields.keys() {
                resolve_column(descriptor, field)?;
            }
            Ok(())
        }
        Condition::List { items, .. } => {
            for item in items {
                validate(item, descriptor)?;
            }
            Ok(())
        }
    }
}

fn resolve_column<'d>(descriptor: &'d EntityDescriptor, field: &str) -> EngineResult<&'d str> {
    descriptor
        .field(field)
        .map(|f| f.column.as_str())
        .ok_or_else(|| {
            EngineError::validation(format!(
                "unknown field {field} on entity {}",
                descriptor.name()
            ))
        })
}

fn write_condition(
    condition: &Condition,
    descriptor: &EntityDescriptor,
    out: &mut CompiledCondition,
) -> EngineResult<()> {
    match condition {
        Condition::Comparison(cmp) => write_comparison(cmp, descriptor, out),
        Condition::FieldMap { fields, join } => {
            // Descriptor order, not insertion order: logically identical
            // filters must compile to byte-identical SQL because the
            // query cache keys on the fragment's field-value set.
            let mut matched = 0usize;
            let mut first = true;
            for field in descriptor.fields() {
                let Some(value) = fields.get(&field.name) else {
                    continue;
                };
                matched += 1;
                if !first {
                    let _ = write!(out.clause, " {} ", join.sql());
                }
                first = false;
                if value.is_null() {
                    let _ = write!(out.clause, "{} IS NULL", field.column);
                } else {
                    let _ = write!(out.clause, "{} = ?", field.column);
                    out.binds.push(value.clone());
                }
            }
            if matched != fields.len() {
                // Some key did not match a declared field; report the first.
                for field in fields.keys() {
                    resolve_column(descriptor, field)?;
                }
            }
            Ok(())
        }
        Condition::List { items, join } => {
            let mut first = true;
            for item in items {
                let mut sub = CompiledCondition {
                    clause: String::new(),
                    binds: Vec::new(),
                };
                write_condition(item, descriptor, &mut sub)?;
                if sub.is_empty() {
                    continue;
                }
                if !first {
                    let _ = write!(out.clause, " {} ", join.sql());
                }
                first = false;
                let _ = write!(out.clause, "({})", sub.clause);
                out.binds.append(&mut sub.binds);
            }
            Ok(())
        }
    }
}

fn write_comparison(
    cmp: &Comparison,
    descriptor: &EntityDescriptor,
    out: &mut CompiledCondition,
) -> EngineResult<()> {
    let column = resolve_column(descriptor, &cmp.field)?;
    let lhs = if cmp.fold_field {
        format!("UPPER({column})")
    } else {
        column.to_string()
    };

    match &cmp.operand {
        Operand::Value(value) => {
            // Equality against a null literal rewrites to IS [NOT] NULL
            // with no bind; other operators pass the null through.
            if value.is_null() && cmp.op == CompareOp::Equals {
                let _ = write!(out.clause, "{lhs} IS NULL");
                return Ok(());
            }
            if value.is_null() && cmp.op == CompareOp::NotEquals {
                let _ = write!(out.clause, "{lhs} IS NOT NULL");
                return Ok(());
            }
            if cmp.op.is_membership() {
                let _ = write!(out.clause, "{lhs} {} (?)", cmp.op.sql());
            } else {
                let _ = write!(out.clause, "{lhs} {} ?", cmp.op.sql());
            }
            out.binds.push(fold_bind(value, cmp.fold_operand));
            Ok(())
        }
        Operand::Collection(values) => {
            if !cmp.op.is_membership() {
                return Err(EngineError::not_implemented(format!(
                    "operator {} does not accept a collection operand",
                    cmp.op.sql()
                )));
            }
            if values.is_empty() {
                return Err(EngineError::validation(format!(
                    "empty collection for {} on field {}",
                    cmp.op.sql(),
                    cmp.field
                )));
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            let _ = write!(out.clause, "{lhs} {} ({placeholders})", cmp.op.sql());
            out.binds
                .extend(values.iter().map(|v| fold_bind(v, cmp.fold_operand)));
            Ok(())
        }
    }
}

fn fold_bind(value: &FieldValue, fold: bool) -> FieldValue {
    if fold {
        value.uppercased()
    } else {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::JoinOp;
    use facetdb_schema::SemanticType;
    use std::collections::BTreeMap;

    fn person() -> EntityDescriptor {
        EntityDescriptor::builder("Person")
            .field("id", SemanticType::Id)
            .field("name", SemanticType::Text)
            .field("age", SemanticType::Integer)
            .primary_key(["id"])
            .build()
            .unwrap()
    }

    #[test]
    fn simple_equality() {
        let desc = person();
        let compiled = compile(&Condition::eq("age", 30i64), &desc).unwrap();
        assert_eq!(compiled.clause, "age = ?");
        assert_eq!(compiled.binds, vec![FieldValue::Integer(30)]);
    }

    #[test]
    fn null_equality_rewrites() {
        let desc = person();
        let compiled = compile(&Condition::eq("name", FieldValue::Null), &desc).unwrap();
        assert_eq!(compiled.clause, "name IS NULL");
        assert!(compiled.binds.is_empty());

        let compiled = compile(&Condition::ne("name", FieldValue::Null), &desc).unwrap();
        assert_eq!(compiled.clause, "name IS NOT NULL");
        assert!(compiled.binds.is_empty());
    }

    #[test]
    fn null_with_other_operator_passes_through() {
        let desc = person();
        let compiled = compile(
            &Condition::cmp("age", CompareOp::LessThan, FieldValue::Null),
            &desc,
        )
        .unwrap();
        assert_eq!(compiled.clause, "age < ?");
        assert_eq!(compiled.binds, vec![FieldValue::Null]);
    }

    #[test]
    fn in_expansion() {
        let desc = person();
        let compiled = compile(&Condition::in_values("age", [1i64, 2, 3]), &desc).unwrap();
        assert_eq!(compiled.clause, "age IN (?, ?, ?)");
        assert_eq!(
            compiled.binds,
            vec![
                FieldValue::Integer(1),
                FieldValue::Integer(2),
                FieldValue::Integer(3)
            ]
        );
    }

    #[test]
    fn in_with_scalar_operand() {
        let desc = person();
        let compiled = compile(&Condition::cmp("age", CompareOp::In, 5i64), &desc).unwrap();
        assert_eq!(compiled.clause, "age IN (?)");
        assert_eq!(compiled.binds, vec![FieldValue::Integer(5)]);
    }

    #[test]
    fn case_folding() {
        let desc = person();
        let compiled = compile(
            &Condition::cmp_folded("name", CompareOp::Equals, "bob"),
            &desc,
        )
        .unwrap();
        assert_eq!(compiled.clause, "UPPER(name) = ?");
        assert_eq!(compiled.binds, vec![FieldValue::Text("BOB".into())]);
    }

    #[test]
    fn folding_leaves_non_strings_alone() {
        let desc = person();
        let compiled = compile(
            &Condition::cmp_folded("age", CompareOp::Equals, 30i64),
            &desc,
        )
        .unwrap();
        assert_eq!(compiled.clause, "UPPER(age) = ?");
        assert_eq!(compiled.binds, vec![FieldValue::Integer(30)]);
    }

    #[test]
    fn field_map_compiles_in_descriptor_order() {
        let desc = person();
        let mut fields = BTreeMap::new();
        // Declared order is id, name, age: name must come first in the
        // output even though the map iterates age first.
        fields.insert("age".to_string(), FieldValue::Integer(30));
        fields.insert("name".to_string(), FieldValue::Text("Ann".into()));
        let compiled = compile(&Condition::field_map(fields), &desc).unwrap();
        assert_eq!(compiled.clause, "name = ? AND age = ?");
        assert_eq!(
            compiled.binds,
            vec![FieldValue::Text("Ann".into()), FieldValue::Integer(30)]
        );
    }

    #[test]
    fn field_map_null_value() {
        let desc = person();
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Null);
        fields.insert("age".to_string(), FieldValue::Integer(30));
        let compiled = compile(
            &Condition::field_map_join(fields, JoinOp::Or),
            &desc,
        )
        .unwrap();
        assert_eq!(compiled.clause, "name IS NULL OR age = ?");
        assert_eq!(compiled.binds, vec![FieldValue::Integer(30)]);
    }

    #[test]
    fn nested_lists_parenthesize() {
        let desc = person();
        let condition = Condition::or(vec![
            Condition::eq("age", 30i64),
            Condition::and(vec![
                Condition::eq("name", "Ann"),
                Condition::cmp("age", CompareOp::GreaterThan, 40i64),
            ]),
        ]);
        let compiled = compile(&condition, &desc).unwrap();
        assert_eq!(compiled.clause, "(age = ?) OR ((name = ?) AND (age > ?))");
        assert_eq!(
            compiled.binds,
            vec![
                FieldValue::Integer(30),
                FieldValue::Text("Ann".into()),
                FieldValue::Integer(40)
            ]
        );
    }

    #[test]
    fn singleton_list_has_no_combinator() {
        let desc = person();
        let compiled = compile(&Condition::and(vec![Condition::eq("age", 1i64)]), &desc).unwrap();
        assert_eq!(compiled.clause, "(age = ?)");
    }

    #[test]
    fn empty_list_compiles_to_nothing() {
        let desc = person();
        let compiled = compile(&Condition::and(vec![]), &desc).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.binds.is_empty());
    }

    #[test]
    fn unknown_field_is_validation_error() {
        let desc = person();
        let err = compile(&Condition::eq("height", 1i64), &desc).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        let mut fields = BTreeMap::new();
        fields.insert("height".to_string(), FieldValue::Integer(1));
        let err = compile(&Condition::field_map(fields), &desc).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn validate_walks_nested_trees() {
        let desc = person();
        let good = Condition::and(vec![
            Condition::eq("age", 30i64),
            Condition::or(vec![Condition::eq("name", "Ann")]),
        ]);
        assert!(validate(&good, &desc).is_ok());

        let bad = Condition::and(vec![
            Condition::eq("age", 30i64),
            Condition::or(vec![Condition::eq("height", 1i64)]),
        ]);
        assert!(matches!(
            validate(&bad, &desc),
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn collection_with_non_membership_operator() {
        let desc = person();
        let condition = Condition::Comparison(Comparison::new(
            "age",
            CompareOp::Equals,
            Operand::Collection(vec![FieldValue::Integer(1)]),
        ));
        let err = compile(&condition, &desc).unwrap_err();
        assert!(matches!(err, EngineError::NotImplemented { .. }));
    }

    #[test]
    fn empty_collection_is_invalid() {
        let desc = person();
        let condition = Condition::in_values("age", Vec::<i64>::new());
        let err = compile(&condition, &desc).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn folded_in_collection_uppercases_strings() {
        let desc = person();
        let condition = Condition::Comparison(
            Comparison::new(
                "name",
                CompareOp::In,
                Operand::Collection(vec![
                    FieldValue::Text("ann".into()),
                    FieldValue::Text("bob".into()),
                ]),
            )
            .fold_field()
            .fold_operand(),
        );
        let compiled = compile(&condition, &desc).unwrap();
        assert_eq!(compiled.clause, "UPPER(name) IN (?, ?)");
        assert_eq!(
            compiled.binds,
            vec![
                FieldValue::Text("ANN".into()),
                FieldValue::Text("BOB".into())
            ]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let desc = person();
        let condition = Condition::or(vec![
            Condition::in_values("age", [3i64, 1, 2]),
            Condition::cmp_folded("name", CompareOp::Like, "a%"),
        ]);
        let first = compile(&condition, &desc).unwrap();
        let second = compile(&condition, &desc).unwrap();
        assert_eq!(first, second);
    }
}
