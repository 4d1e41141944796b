// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{ConceptId, ConceptMap, Label, Value, Variable};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RolePlayer {
    #[serde(default)]
    pub role: Option<Label>,
    pub player: Variable,
}

impl RolePlayer {
    pub fn new(role: Option<&str>, player: &str) -> Self {
        Self {
            role: role.map(Label::new),
            player: Variable::new(player),
        }
    }
}

/// The central pattern of an atomic query. A missing label means the atom is untyped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Atom {
    Isa {
        var: Variable,
        #[serde(default)]
        label: Option<Label>,
    },
    Relation {
        var: Variable,
        #[serde(default)]
        label: Option<Label>,
        role_players: Vec<RolePlayer>,
    },
    Has {
        owner: Variable,
        attribute: Variable,
        #[serde(default)]
        label: Option<Label>,
    },
}

impl Atom {
    pub fn isa(var: &str, label: &str) -> Self {
        Atom::Isa {
            var: Variable::new(var),
            label: Some(Label::new(label)),
        }
    }

    pub fn relation(var: &str, label: &str, role_players: Vec<RolePlayer>) -> Self {
        Atom::Relation {
            var: Variable::new(var),
            label: Some(Label::new(label)),
            role_players,
        }
    }

    pub fn has(owner: &str, attribute: &str, label: &str) -> Self {
        Atom::Has {
            owner: Variable::new(owner),
            attribute: Variable::new(attribute),
            label: Some(Label::new(label)),
        }
    }

    pub fn label(&self) -> Option<&Label> {
        match self {
            Atom::Isa { label, .. } | Atom::Relation { label, .. } | Atom::Has { label, .. } => {
                label.as_ref()
            }
        }
    }

    pub fn with_label(&self, new_label: Label) -> Atom {
        let mut atom = self.clone();
        match &mut atom {
            Atom::Isa { label, .. } | Atom::Relation { label, .. } | Atom::Has { label, .. } => {
                *label = Some(new_label)
            }
        }
        atom
    }

    /// The variable whose concept carries the atom's type.
    pub fn central_variable(&self) -> &Variable {
        match self {
            Atom::Isa { var, .. } | Atom::Relation { var, .. } => var,
            Atom::Has { attribute, .. } => attribute,
        }
    }

    /// Variables in first-appearance order, without duplicates.
    pub fn ordered_variables(&self) -> Vec<Variable> {
        let mut ordered: Vec<Variable> = Vec::new();
        let mut push = |v: &Variable| {
            if !ordered.contains(v) {
                ordered.push(v.clone());
            }
        };
        match self {
            Atom::Isa { var, .. } => push(var),
            Atom::Relation {
                var, role_players, ..
            } => {
                push(var);
                role_players.iter().for_each(|rp| push(&rp.player));
            }
            Atom::Has {
                owner, attribute, ..
            } => {
                push(owner);
                push(attribute);
            }
        }
        ordered
    }

    pub fn variables(&self) -> BTreeSet<Variable> {
        self.ordered_variables().into_iter().collect()
    }

    pub fn rename(&self, f: &impl Fn(&Variable) -> Variable) -> Atom {
        match self {
            Atom::Isa { var, label } => Atom::Isa {
                var: f(var),
                label: label.clone(),
            },
            Atom::Relation {
                var,
                label,
                role_players,
            } => Atom::Relation {
                var: f(var),
                label: label.clone(),
                role_players: role_players
                    .iter()
                    .map(|rp| RolePlayer {
                        role: rp.role.clone(),
                        player: f(&rp.player),
                    })
                    .collect(),
            },
            Atom::Has {
                owner,
                attribute,
                label,
            } => Atom::Has {
                owner: f(owner),
                attribute: f(attribute),
                label: label.clone(),
            },
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Atom::Relation { .. })
    }

    pub fn is_has(&self) -> bool {
        matches!(self, Atom::Has { .. })
    }

    /// Whether answers to this atom need persisted concepts: attribute ownerships always do,
    /// and so does a relation whose instance the caller names explicitly.
    pub fn requires_materialisation(&self) -> bool {
        match self {
            Atom::Isa { .. } => false,
            Atom::Relation { var, .. } => var.is_user_defined(),
            Atom::Has { .. } => true,
        }
    }

    /// Any role player whose role is unspecified needs role expansion.
    pub fn requires_role_expansion(&self) -> bool {
        match self {
            Atom::Relation { role_players, .. } => role_players.iter().any(|rp| rp.role.is_none()),
            _ => false,
        }
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = |l: &Option<Label>| {
            l.as_ref()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "?".into())
        };
        match self {
            Atom::Isa { var, label: l } => write!(f, "{} isa {}", var, label(l)),
            Atom::Relation {
                var,
                label: l,
                role_players,
            } => {
                write!(f, "{} (", var)?;
                for (i, rp) in role_players.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &rp.role {
                        Some(role) => write!(f, "{}: {}", role, rp.player)?,
                        None => write!(f, "{}", rp.player)?,
                    }
                }
                write!(f, ") isa {}", label(l))
            }
            Atom::Has {
                owner,
                attribute,
                label: l,
            } => write!(f, "{} has {} {}", owner, label(l), attribute),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    /// Values of different kinds are only ever unequal.
    pub fn evaluate(&self, lhs: &Value, rhs: &Value) -> bool {
        let same_kind = std::mem::discriminant(lhs) == std::mem::discriminant(rhs);
        match self {
            Comparator::Eq => lhs == rhs,
            Comparator::Neq => lhs != rhs,
            _ if !same_kind => false,
            Comparator::Gt => lhs > rhs,
            Comparator::Gte => lhs >= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Lte => lhs <= rhs,
        }
    }

    /// Does `x self a` imply `x other b` for every `x`?
    pub fn entails(&self, a: &Value, other: Comparator, b: &Value) -> bool {
        use Comparator::*;
        match (self, other) {
            (Eq, _) => other.evaluate(a, b),
            (Neq, Neq) => a == b,
            (Gt, Gt) | (Gt, Gte) | (Gte, Gte) => Gte.evaluate(a, b),
            (Gte, Gt) => Gt.evaluate(a, b),
            (Lt, Lt) | (Lt, Lte) | (Lte, Lte) => Lte.evaluate(a, b),
            (Lte, Lt) => Lt.evaluate(a, b),
            _ => false,
        }
    }
}

impl Display for Comparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Comparator::Eq => "=",
            Comparator::Neq => "!=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
        };
        write!(f, "{}", symbol)
    }
}

/// Auxiliary constraint attached to atoms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Id {
        var: Variable,
        id: ConceptId,
    },
    Value {
        var: Variable,
        comparator: Comparator,
        value: Value,
    },
    Type {
        var: Variable,
        label: Label,
    },
    Has {
        var: Variable,
        attribute: Label,
        value: Value,
    },
    Neq {
        left: Variable,
        right: Variable,
    },
}

impl Predicate {
    pub fn id(var: &str, id: &str) -> Self {
        Predicate::Id {
            var: Variable::new(var),
            id: ConceptId::new(id),
        }
    }

    pub fn value(var: &str, comparator: Comparator, value: Value) -> Self {
        Predicate::Value {
            var: Variable::new(var),
            comparator,
            value,
        }
    }

    pub fn has(var: &str, attribute: &str, value: Value) -> Self {
        Predicate::Has {
            var: Variable::new(var),
            attribute: Label::new(attribute),
            value,
        }
    }

    pub fn variables(&self) -> Vec<&Variable> {
        match self {
            Predicate::Id { var, .. }
            | Predicate::Value { var, .. }
            | Predicate::Type { var, .. }
            | Predicate::Has { var, .. } => vec![var],
            Predicate::Neq { left, right } => vec![left, right],
        }
    }

    pub fn is_identifying(&self) -> bool {
        matches!(self, Predicate::Id { .. })
    }

    pub fn rename(&self, f: &impl Fn(&Variable) -> Variable) -> Predicate {
        match self {
            Predicate::Id { var, id } => Predicate::Id {
                var: f(var),
                id: id.clone(),
            },
            Predicate::Value {
                var,
                comparator,
                value,
            } => Predicate::Value {
                var: f(var),
                comparator: *comparator,
                value: value.clone(),
            },
            Predicate::Type { var, label } => Predicate::Type {
                var: f(var),
                label: label.clone(),
            },
            Predicate::Has {
                var,
                attribute,
                value,
            } => Predicate::Has {
                var: f(var),
                attribute: attribute.clone(),
                value: value.clone(),
            },
            Predicate::Neq { left, right } => Predicate::Neq {
                left: f(left),
                right: f(right),
            },
        }
    }

    /// Checks the predicate against an answer. Variables the answer does not bind leave the
    /// predicate unconstrained.
    pub fn evaluate(&self, answer: &ConceptMap, schema: &Schema) -> bool {
        match self {
            Predicate::Id { var, id } => answer.get(var).map_or(true, |c| &c.id == id),
            Predicate::Value {
                var,
                comparator,
                value,
            } => answer.get(var).map_or(true, |c| {
                c.value
                    .as_ref()
                    .is_some_and(|actual| comparator.evaluate(actual, value))
            }),
            Predicate::Type { var, label } => answer
                .get(var)
                .map_or(true, |c| schema.is_subtype(&c.label, label)),
            Predicate::Has {
                var,
                attribute,
                value,
            } => answer.get(var).map_or(true, |c| c.owns(attribute, value)),
            Predicate::Neq { left, right } => match (answer.get(left), answer.get(right)) {
                (Some(l), Some(r)) => l != r,
                _ => true,
            },
        }
    }

    /// Does every answer satisfying `self` also satisfy `other`?
    pub fn entails(&self, other: &Predicate, schema: &Schema) -> bool {
        match (self, other) {
            (
                Predicate::Value {
                    var: v1,
                    comparator: c1,
                    value: a,
                },
                Predicate::Value {
                    var: v2,
                    comparator: c2,
                    value: b,
                },
            ) => v1 == v2 && c1.entails(a, *c2, b),
            (Predicate::Type { var: v1, label: l1 }, Predicate::Type { var: v2, label: l2 }) => {
                v1 == v2 && schema.is_subtype(l1, l2)
            }
            (
                Predicate::Neq {
                    left: l1,
                    right: r1,
                },
                Predicate::Neq {
                    left: l2,
                    right: r2,
                },
            ) => (l1 == l2 && r1 == r2) || (l1 == r2 && r1 == l2),
            _ => self == other,
        }
    }

    /// Key fragment with variables replaced through `name`; identifier values are left out
    /// because they index answers rather than partition queries.
    pub(crate) fn key_fragment(&self, name: &impl Fn(&Variable) -> String) -> String {
        match self {
            Predicate::Id { var, .. } => format!("id({})", name(var)),
            Predicate::Value {
                var,
                comparator,
                value,
            } => format!("val({}{}{})", name(var), comparator, value),
            Predicate::Type { var, label } => format!("type({},{})", name(var), label),
            Predicate::Has {
                var,
                attribute,
                value,
            } => format!("has({},{},{})", name(var), attribute, value),
            Predicate::Neq { left, right } => {
                let (l, r) = (name(left), name(right));
                if l <= r {
                    format!("neq({},{})", l, r)
                } else {
                    format!("neq({},{})", r, l)
                }
            }
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Id { var, id } => write!(f, "{} iid {}", var, id),
            Predicate::Value {
                var,
                comparator,
                value,
            } => write!(f, "{} {} {}", var, comparator, value),
            Predicate::Type { var, label } => write!(f, "{} isa {}", var, label),
            Predicate::Has {
                var,
                attribute,
                value,
            } => write!(f, "{} has {} {}", var, attribute, value),
            Predicate::Neq { left, right } => write!(f, "{} != {}", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparator_entailment() {
        let thirty = Value::Long(30);
        let twenty = Value::Long(20);
        assert!(Comparator::Eq.entails(&thirty, Comparator::Gt, &twenty));
        assert!(Comparator::Gt.entails(&thirty, Comparator::Gt, &twenty));
        assert!(!Comparator::Gt.entails(&twenty, Comparator::Gt, &thirty));
        assert!(Comparator::Lte.entails(&twenty, Comparator::Lt, &thirty));
        assert!(!Comparator::Neq.entails(&twenty, Comparator::Eq, &twenty));
    }

    #[test]
    fn mixed_value_kinds_never_compare() {
        let number = Value::Long(1);
        let text = Value::String("1".into());
        assert!(!Comparator::Gt.evaluate(&number, &text));
        assert!(!Comparator::Eq.evaluate(&number, &text));
        assert!(Comparator::Neq.evaluate(&number, &text));
    }

    #[test]
    fn relation_variables_keep_first_appearance_order() {
        let atom = Atom::relation(
            "r",
            "friendship",
            vec![RolePlayer::new(Some("friend"), "y"), RolePlayer::new(Some("friend"), "x")],
        );
        let names: Vec<String> = atom
            .ordered_variables()
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(names, vec!["r", "y", "x"]);
    }

    #[test]
    fn materialisation_demand_by_atom_shape() {
        assert!(Atom::has("x", "a", "age").requires_materialisation());
        assert!(Atom::relation("r", "friendship", vec![]).requires_materialisation());
        assert!(!Atom::relation("_r", "friendship", vec![]).requires_materialisation());
        assert!(!Atom::isa("x", "person").requires_materialisation());
    }
}
