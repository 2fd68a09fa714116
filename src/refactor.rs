use crate::database::Database;
use crate::error::{MmError, Result};
use crate::proof::{grow, ProofNode};
use crate::stat;
use crate::types::*;
use crate::verify::{Checked, Mode};
use itertools::Itertools;
use std::collections::HashMap;

/// The result of [`Database::refactor_all`].
#[derive(Debug, Default)]
pub struct RefactorReport {
  /// Names of the theorems that were candidates for rewriting.
  pub originals: Vec<String>,
  /// Names of the new theorems used as rewrite rules, shortest proof first.
  pub theorems: Vec<String>,
  /// `counts[i][j]` is the number of times theorem `j` was applied in original `i`.
  pub counts: Vec<Vec<u32>>,
  /// The rewritten proofs, named `refactored_{original}`.
  pub refactored: Vec<ProofNode>,
}

impl RefactorReport {
  pub fn total(&self) -> u32 { self.counts.iter().flatten().sum() }
}

/// Matches `node` against the proof `pattern`. Assertion steps must agree on the label all the
/// way down; hypothesis leaves of the pattern match any subtree, and are returned left to right
/// with the subtree they matched.
pub fn match_pattern<'a, 'b>(
  node: &'a ProofNode, pattern: &'b ProofNode,
) -> Option<Vec<(&'b ProofNode, &'a ProofNode)>> {
  fn go<'a, 'b>(
    node: &'a ProofNode, pattern: &'b ProofNode, out: &mut Vec<(&'b ProofNode, &'a ProofNode)>,
  ) -> bool {
    match pattern.kind() {
      Some(k) if k.is_hyp() => {
        out.push((pattern, node));
        true
      }
      Some(_) =>
        node.label == pattern.label
          && node.vars().len() == pattern.vars().len()
          && node.hyps().len() == pattern.hyps().len()
          && grow(|| node.children().zip(pattern.children()).all(|(n, p)| go(n, p, out))),
      None => false,
    }
  }
  let mut out = vec![];
  go(node, pattern, &mut out).then_some(out)
}

/// Builds the arguments of an application of theorem `a` from the bindings of a match: for
/// each mandatory variable the subtree bound to its first occurrence, for each hypothesis the
/// subtree bound to the leaf with that statement. Fails if a variable is bound to two
/// different statements, or is not bound at all.
///
/// The bucket check runs once, on the bindings of the matched root. It has no depth setting.
fn arguments(
  a: &Assertion, bindings: &[(&ProofNode, &ProofNode)],
) -> Option<(Vec<ProofNode>, Vec<ProofNode>)> {
  let mut vars = vec![];
  for (tc, v) in &a.floating {
    let mut bucket = (bindings.iter())
      .filter(|(p, _)| p.kind() == Some(Kind::Floating) && p.expr.len() == 2)
      .filter(|(p, _)| p.expr[0] == *tc && p.expr[1] == *v);
    let (_, first) = bucket.next()?;
    if !bucket.all(|(_, n)| n.expr == first.expr) {
      vprintln!("variable {v} is bound inconsistently");
      return None
    }
    vars.push((*first).clone())
  }
  let hyps = (a.essential.iter())
    .map(|h| {
      (bindings.iter())
        .find(|(p, _)| p.kind() == Some(Kind::Essential) && p.expr == *h)
        .map(|(_, n)| (*n).clone())
    })
    .collect::<Option<Vec<_>>>()?;
  Some((vars, hyps))
}

/// Gives the `$e` leaves of a tree fresh labels `{name}.{k}`, one per distinct label.
pub fn relabel_hyps(tree: &mut ProofNode, name: &str) {
  let mut fresh: HashMap<Tok, Tok> = HashMap::new();
  for leaf in tree.leaves_mut() {
    if leaf.kind() == Some(Kind::Essential) {
      let n = fresh.len() + 1;
      let label = fresh.entry(leaf.label.clone()).or_insert_with(|| tok(&format!("{name}.{n}")));
      leaf.label = label.clone()
    }
  }
}

impl Database {
  /// Rewrites every occurrence of the proof of `theorem` in `tree` into a single `$p` step,
  /// one at a time and re-checking after each rewrite. Returns the number of rewrites.
  pub fn refactor_with(
    &self, tree: &mut ProofNode, theorem: &str, pattern: &ProofNode,
  ) -> Result<u32> {
    let Some(a) = self.assertion(theorem).cloned() else {
      return Err(MmError::KeyNotFound(theorem.to_owned()))
    };
    let mut count = 0;
    'outer: loop {
      for path in tree.postorder_paths() {
        let Some(node) = tree.at_path(&path) else { continue };
        let Some(bindings) = match_pattern(node, pattern) else { continue };
        let Some((vars, hyps)) = arguments(&a, &bindings) else { continue };
        let expr = node.expr.clone();
        let step = ProofNode::assert(tok(theorem), Kind::Theorem, expr, vars, hyps);
        if let Some(slot) = tree.at_path_mut(&path) {
          *slot = step
        }
        let name = tree.name.clone().unwrap_or_default();
        let dj = self.cfg.derived_disjoint;
        match self.verify(&tree.expr, &tree.summarize(), "", Mode::Probe, dj)? {
          Checked::Valid(mut p) => {
            p.name = tree.name.take();
            *tree = p
          }
          Checked::Invalid(_) => {
            let theorem = theorem.to_owned();
            return Err(MmError::RefactorVerificationFailed { proof: name, theorem })
          }
        }
        vprintln!("{name}: applied {theorem}");
        stat("refactor");
        count += 1;
        continue 'outer
      }
      return Ok(count)
    }
  }

  /// Uses every stored theorem whose name carries the new theorem prefix (and whose proof is
  /// more than two levels deep) as a rewrite rule on every other stored theorem. Proofs are
  /// tried against the rules in order of increasing proof length.
  pub fn refactor_all(&self) -> Result<RefactorReport> {
    let prefix = &self.cfg.new_theorem_prefix;
    let (new, originals): (Vec<_>, Vec<_>) =
      self.theorems().partition(|(name, _)| name.contains(&**prefix));
    let new = (new.into_iter())
      .filter(|(_, p)| p.find_max_height() > 2)
      .sorted_by_key(|(_, p)| p.summarize().len())
      .collect_vec();
    let mut report = RefactorReport {
      originals: originals.iter().map(|(n, _)| n.to_string()).collect(),
      theorems: new.iter().map(|(n, _)| n.to_string()).collect(),
      ..Default::default()
    };
    for (name, proof) in originals {
      if let Some(p) = &self.progress {
        p.inc(1);
        p.set_message(name.to_owned())
      }
      let mut tree = proof.clone();
      tree.name = Some(format!("refactored_{name}"));
      let row = (new.iter())
        .map(|(theorem, pattern)| self.refactor_with(&mut tree, theorem, pattern))
        .collect::<Result<Vec<_>>>()?;
      if row.iter().any(|&n| n > 0) {
        let label = tree.name.clone().unwrap_or_default();
        relabel_hyps(&mut tree, &label);
        report.refactored.push(tree)
      }
      report.counts.push(row)
    }
    eprintln!("total refactor operations: {}", report.total());
    eprintln!("total proofs refactored: {}", report.refactored.len());
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn f(v: &str) -> ProofNode {
    ProofNode::leaf(tok(&format!("w{v}")), Kind::Floating, expr_of(&format!("wff {v}")))
  }

  fn e(l: &str, s: &str) -> ProofNode { ProofNode::leaf(tok(l), Kind::Essential, expr_of(s)) }

  fn imp(a: ProofNode, b: ProofNode) -> ProofNode {
    let e = expr_of(&format!("wff ( {} -> {} )", fmt_expr(&a.expr[1..]), fmt_expr(&b.expr[1..])));
    ProofNode::assert(tok("wi"), Kind::Axiom, e, vec![a, b], vec![])
  }

  #[test]
  fn hypothesis_leaves_are_wildcards() {
    let pattern = imp(imp(f("ph"), f("ps")), f("ph"));
    let node = imp(imp(imp(f("ch"), f("ch")), f("ps")), imp(f("ch"), f("ch")));
    let b = match_pattern(&node, &pattern).unwrap();
    let bound = b.iter().map(|(p, n)| (p.label.to_string(), fmt_expr(&n.expr))).collect_vec();
    assert_eq!(bound, [
      ("wph".to_owned(), "wff ( ch -> ch )".to_owned()),
      ("wps".to_owned(), "wff ps".to_owned()),
      ("wph".to_owned(), "wff ( ch -> ch )".to_owned()),
    ]);
    assert!(match_pattern(&f("ph"), &pattern).is_none());
  }

  #[test]
  fn buckets_must_agree() {
    let a = Assertion {
      floating: vec![(tok("wff"), tok("ph")), (tok("wff"), tok("ps"))],
      essential: vec![expr_of("|- ph")],
      ..Default::default()
    };
    let pattern = imp(imp(f("ph"), f("ps")), f("ph"));
    let hyp = e("h", "|- ph");
    let consistent = imp(imp(f("ch"), f("ps")), f("ch"));
    let bound = e("x", "|- ch");
    let mut b = match_pattern(&consistent, &pattern).unwrap();
    b.push((&hyp, &bound));
    let (vars, hyps) = arguments(&a, &b).unwrap();
    assert_eq!(vars.iter().map(|n| n.label.to_string()).collect_vec(), ["wch", "wps"]);
    assert_eq!(hyps[0].label.to_string(), "x");

    let inconsistent = imp(imp(f("ch"), f("ps")), f("ps"));
    let b = match_pattern(&inconsistent, &pattern).unwrap();
    assert!(arguments(&a, &b).is_none());
  }

  #[test]
  fn essential_leaves_get_fresh_labels() {
    let mut t = ProofNode::assert(
      tok("ax-mp"),
      Kind::Axiom,
      expr_of("|- ps"),
      vec![f("ph"), f("ps")],
      vec![e("a1i.1", "|- ph"), e("a1i.1", "|- ph")],
    );
    relabel_hyps(&mut t, "refactored_x");
    let labels = t.leaves().iter().map(|n| n.label.to_string()).collect_vec();
    assert_eq!(labels, ["wph", "wps", "refactored_x.1", "refactored_x.1"]);
  }
}
