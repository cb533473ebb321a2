//! Bottom-up evaluation: stratification + semi-naive fixed point.

use crate::ast::{is_extensional, Literal, Program, Rule, Term, Value};
use crate::DatalogError;
use std::collections::{HashMap, HashSet};

/// A stored relation with single-column indexes.
#[derive(Debug, Clone, Default)]
pub struct Relation {
    tuples: Vec<Vec<Value>>,
    set: HashSet<Vec<Value>>,
    index: HashMap<(usize, Value), Vec<usize>>,
    indexed_columns: Vec<usize>,
}

impl Relation {
    pub fn new(indexed_columns: Vec<usize>) -> Relation {
        Relation {
            indexed_columns,
            ..Relation::default()
        }
    }

    pub fn insert(&mut self, tuple: Vec<Value>) -> bool {
        if !self.set.insert(tuple.clone()) {
            return false;
        }
        let position = self.tuples.len();
        for &column in &self.indexed_columns {
            if let Some(value) = tuple.get(column) {
                self.index
                    .entry((column, value.clone()))
                    .or_default()
                    .push(position);
            }
        }
        self.tuples.push(tuple);
        true
    }

    pub fn contains(&self, tuple: &[Value]) -> bool {
        self.set.contains(tuple)
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn tuples(&self) -> &[Vec<Value>] {
        &self.tuples
    }

    /// Enumerate tuples matching a partial binding pattern. Uses the most
    /// selective available index so joins stay linear in matching tuples.
    pub fn select<'r>(&'r self, pattern: &[Option<Value>]) -> Vec<&'r Vec<Value>> {
        let indexed = pattern.iter().enumerate().find_map(|(column, value)| {
            let value = value.as_ref()?;
            if self.indexed_columns.contains(&column) {
                Some((column, value.clone()))
            } else {
                None
            }
        });

        let matches = |tuple: &Vec<Value>| {
            pattern
                .iter()
                .zip(tuple.iter())
                .all(|(p, v)| p.as_ref().is_none_or(|p| p == v))
        };

        match indexed {
            Some(key) => self
                .index
                .get(&key)
                .map(|positions| {
                    positions
                        .iter()
                        .map(|&i| &self.tuples[i])
                        .filter(|t| matches(t))
                        .collect()
                })
                .unwrap_or_default(),
            None => self.tuples.iter().filter(|t| matches(t)).collect(),
        }
    }
}

/// Assign strata; negation must step strictly upward. Rejects programs
/// whose negation is cyclic.
pub fn stratify(program: &Program) -> Result<HashMap<String, usize>, DatalogError> {
    let predicates: HashSet<&str> = program
        .rules
        .iter()
        .map(|r| r.head.predicate.as_str())
        .collect();
    let mut strata: HashMap<String, usize> =
        predicates.iter().map(|p| (p.to_string(), 0)).collect();
    let bound = predicates.len() + 1;

    for _ in 0..=bound {
        let mut changed = false;
        for rule in &program.rules {
            let head_stratum = strata[&rule.head.predicate];
            for literal in &rule.body {
                let body_stratum = strata
                    .get(&literal.atom.predicate)
                    .copied()
                    .unwrap_or(0);
                let required = if literal.negated {
                    body_stratum + 1
                } else {
                    body_stratum
                };
                if head_stratum < required {
                    strata.insert(rule.head.predicate.clone(), required);
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(strata);
        }
    }
    Err(DatalogError::CyclicNegation(
        "program has a cycle through negation".to_string(),
    ))
}

/// Evaluate a program against the extensional database, returning every
/// derived (intensional) relation.
pub fn evaluate(
    program: &Program,
    edb: &HashMap<String, Relation>,
) -> Result<HashMap<String, Relation>, DatalogError> {
    let strata = stratify(program)?;
    let max_stratum = strata.values().copied().max().unwrap_or(0);

    let mut idb: HashMap<String, Relation> = strata
        .keys()
        .map(|p| (p.clone(), Relation::new(vec![0])))
        .collect();

    for stratum in 0..=max_stratum {
        let rules: Vec<&Rule> = program
            .rules
            .iter()
            .filter(|r| strata[&r.head.predicate] == stratum)
            .collect();
        if rules.is_empty() {
            continue;
        }

        // First round is naive: evaluate every rule against the full state.
        let mut delta: HashMap<String, Relation> = HashMap::new();
        for rule in &rules {
            for tuple in eval_rule(rule, edb, &idb, None)? {
                if !idb[&rule.head.predicate].contains(&tuple) {
                    delta
                        .entry(rule.head.predicate.clone())
                        .or_insert_with(|| Relation::new(vec![0]))
                        .insert(tuple);
                }
            }
        }
        merge(&mut idb, &delta);

        // Semi-naive rounds: each recursive rule re-fires only through the
        // delta of one of its positive in-stratum literals.
        while !delta.is_empty() {
            let mut next: HashMap<String, Relation> = HashMap::new();
            for rule in &rules {
                for (position, literal) in rule.body.iter().enumerate() {
                    if literal.negated {
                        continue;
                    }
                    let Some(changed) = delta.get(&literal.atom.predicate) else {
                        continue;
                    };
                    if changed.is_empty() {
                        continue;
                    }
                    for tuple in eval_rule(rule, edb, &idb, Some((position, changed)))? {
                        if !idb[&rule.head.predicate].contains(&tuple) {
                            next.entry(rule.head.predicate.clone())
                                .or_insert_with(|| Relation::new(vec![0]))
                                .insert(tuple);
                        }
                    }
                }
            }
            merge(&mut idb, &next);
            delta = next;
        }
    }
    Ok(idb)
}

fn merge(idb: &mut HashMap<String, Relation>, delta: &HashMap<String, Relation>) {
    for (predicate, relation) in delta {
        let target = idb
            .entry(predicate.clone())
            .or_insert_with(|| Relation::new(vec![0]));
        for tuple in relation.tuples() {
            target.insert(tuple.clone());
        }
    }
}

/// One rule firing: join positive literals left to right, then filter
/// through the negated ones (whose variables are all bound by then), then
/// instantiate the head.
fn eval_rule(
    rule: &Rule,
    edb: &HashMap<String, Relation>,
    idb: &HashMap<String, Relation>,
    delta_at: Option<(usize, &Relation)>,
) -> Result<Vec<Vec<Value>>, DatalogError> {
    let positives: Vec<(usize, &Literal)> = rule
        .body
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.negated)
        .collect();
    let negatives: Vec<&Literal> = rule.body.iter().filter(|l| l.negated).collect();

    let mut results = Vec::new();
    let mut binding: HashMap<String, Value> = HashMap::new();

    // Ground facts: empty body, constant head.
    if rule.body.is_empty() {
        let tuple: Option<Vec<Value>> = rule
            .head
            .terms
            .iter()
            .map(|t| match t {
                Term::Value(v) => Some(v.clone()),
                Term::Var(_) => None,
            })
            .collect();
        if let Some(tuple) = tuple {
            results.push(tuple);
        }
        return Ok(results);
    }

    fn relation_for<'a>(
        predicate: &str,
        edb: &'a HashMap<String, Relation>,
        idb: &'a HashMap<String, Relation>,
    ) -> Option<&'a Relation> {
        if is_extensional(predicate) {
            edb.get(predicate)
        } else {
            idb.get(predicate)
        }
    }

    fn walk(
        positives: &[(usize, &Literal)],
        depth: usize,
        binding: &mut HashMap<String, Value>,
        edb: &HashMap<String, Relation>,
        idb: &HashMap<String, Relation>,
        delta_at: Option<(usize, &Relation)>,
        negatives: &[&Literal],
        head_terms: &[Term],
        results: &mut Vec<Vec<Value>>,
    ) {
        if depth == positives.len() {
            // All positives satisfied; apply negation-as-failure.
            for negative in negatives {
                let pattern: Vec<Option<Value>> = negative
                    .atom
                    .terms
                    .iter()
                    .map(|t| match t {
                        Term::Value(v) => Some(v.clone()),
                        Term::Var(v) => binding.get(v).cloned(),
                    })
                    .collect();
                let found = relation_for(&negative.atom.predicate, edb, idb)
                    .map(|r| !r.select(&pattern).is_empty())
                    .unwrap_or(false);
                if found {
                    return;
                }
            }
            let tuple: Option<Vec<Value>> = head_terms
                .iter()
                .map(|t| match t {
                    Term::Value(v) => Some(v.clone()),
                    Term::Var(v) => binding.get(v).cloned(),
                })
                .collect();
            if let Some(tuple) = tuple {
                results.push(tuple);
            }
            return;
        }

        let (position, literal) = positives[depth];
        let relation = match delta_at {
            Some((delta_position, delta)) if delta_position == position => Some(delta),
            _ => relation_for(&literal.atom.predicate, edb, idb),
        };
        let Some(relation) = relation else {
            return;
        };

        let pattern: Vec<Option<Value>> = literal
            .atom
            .terms
            .iter()
            .map(|t| match t {
                Term::Value(v) => Some(v.clone()),
                Term::Var(v) => binding.get(v).cloned(),
            })
            .collect();

        for tuple in relation.select(&pattern) {
            let mut bound_here: Vec<String> = Vec::new();
            let mut consistent = true;
            for (term, value) in literal.atom.terms.iter().zip(tuple.iter()) {
                if let Term::Var(name) = term {
                    match binding.get(name) {
                        Some(existing) if existing != value => {
                            consistent = false;
                            break;
                        }
                        Some(_) => {}
                        None => {
                            binding.insert(name.clone(), value.clone());
                            bound_here.push(name.clone());
                        }
                    }
                }
            }
            if consistent {
                walk(
                    positives, depth + 1, binding, edb, idb, delta_at, negatives, head_terms,
                    results,
                );
            }
            for name in bound_here {
                binding.remove(&name);
            }
        }
    }

    walk(
        &positives,
        0,
        &mut binding,
        edb,
        idb,
        delta_at,
        &negatives,
        &rule.head.terms,
        &mut results,
    );
    Ok(results)
}
