use crate::database::Database;
use crate::error::{MmError, Result};
use crate::export::{edges, is_tree, recolor};
use crate::proof::{grow, ProofNode, Step};
use crate::stat;
use crate::types::*;
use crate::verify::Mode;
use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

/// The first substituted node in preorder.
pub fn find_root(root: &ProofNode) -> Option<&ProofNode> {
  root.preorder().into_iter().find(|n| n.subst)
}

/// A colored region can only be cut out as a theorem if no node in it has children of mixed
/// colors.
pub fn is_meaningful(root: &ProofNode) -> bool {
  root.preorder().into_iter().all(|n| n.children().map(|c| c.subst).all_equal())
}

/// Copies the colored region rooted at `root`. A node with an uncolored child loses all of its
/// children and becomes a [`Step::Special`] placeholder. Returns `None` if nothing of the root
/// step survives.
pub fn extract(root: &ProofNode) -> Option<ProofNode> {
  fn prune(n: &mut ProofNode) {
    if n.children().any(|c| !c.subst) {
      n.step = Step::Special
    } else {
      grow(|| n.children_mut().for_each(prune))
    }
  }
  let mut new = root.clone();
  prune(&mut new);
  match new.step {
    Step::Assert { .. } if !new.is_leaf() => Some(new),
    _ => None,
  }
}

fn is_synthetic(label: &str) -> bool {
  let digits = label.strip_prefix("sub").unwrap_or_default();
  !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl Database {
  /// Renames the hypotheses of an extracted tree into a stand-alone theorem `name`: `$e`
  /// leaves become `{name}.{k}`, and every distinct `$f` leaf statement is replaced by an
  /// unused top-level floating hypothesis of the same type. The statements are then
  /// re-derived and the result is checked. `Ok(None)` means the check failed.
  pub fn standardize(&mut self, mut tree: ProofNode, name: &str) -> Result<Option<ProofNode>> {
    let mut essentials = vec![];
    let mut replace: HashMap<Expr, Tok> = HashMap::new();
    let mut used_exprs: HashSet<Expr> = HashSet::new();
    for leaf in tree.leaves_mut() {
      match leaf.kind() {
        Some(Kind::Essential) => {
          leaf.label = tok(&format!("{name}.{}", essentials.len() + 1));
          essentials.push((leaf.label.clone(), leaf.expr.clone()))
        }
        Some(Kind::Floating) => {
          let Some(tc) = leaf.expr.first().cloned() else {
            return Err(MmError::Syntax(format!("empty floating hypothesis {}", leaf.label)))
          };
          if !replace.contains_key(&leaf.expr) {
            let pick = self.top_floats.iter().find_map(|k| match self.labels.get(k) {
              Some(LabelData::Hyp(Kind::Floating, e))
                if e.first() == Some(&tc)
                  && !is_synthetic(k)
                  && !used_exprs.contains(e)
                  && !replace.values().any(|v| v == k) =>
                Some((k, e)),
              _ => None,
            });
            let Some((k, e)) = pick else {
              return Err(MmError::VocabularyExhausted { typecode: tc })
            };
            used_exprs.insert(e.clone());
            replace.insert(leaf.expr.clone(), k.clone());
          }
          let k = &replace[&leaf.expr];
          if let Some(LabelData::Hyp(_, e)) = self.labels.get(k) {
            leaf.expr = e.clone()
          }
          leaf.label = k.clone()
        }
        _ => {}
      }
    }
    for (label, expr) in essentials {
      self.register_essential(label, expr)
    }
    self.propagate_substituting_hyps(&mut tree);
    let dj = self.cfg.derived_disjoint;
    let checked = self.verify(&tree.expr, &tree.summarize(), "", Mode::Probe, dj)?;
    Ok(checked.valid().map(|mut p| {
      p.name = Some(name.to_owned());
      p
    }))
  }

  /// Tries to turn one predicted coloring of the dataset tree `name` into a new theorem
  /// numbered `k`. Predictions that are not a single subtree, or that reproduce the recorded
  /// coloring exactly, give no result.
  pub fn extract_from(
    &mut self, name: &str, predictions: &[f64], k: usize,
  ) -> Result<Option<ProofNode>> {
    let Some(tree) = self.dataset_tree(name) else {
      return Err(MmError::KeyNotFound(name.to_owned()))
    };
    let truth = tree.preorder().into_iter().map(|n| n.subst).collect_vec();
    let mut tree = tree.clone();
    recolor(&mut tree, predictions)?;
    let (source, target) = edges(&tree);
    if !is_tree(&source, &target, predictions) {
      stat("extract_not_tree");
      return Ok(None)
    }
    if tree.preorder().into_iter().map(|n| n.subst).eq(truth) {
      stat("extract_correct");
      return Ok(None)
    }
    let Some(root) = find_root(&tree) else { return Ok(None) };
    if !is_meaningful(root) {
      stat("extract_not_meaningful");
      return Ok(None)
    }
    let Some(mut new) = extract(root) else { return Ok(None) };
    new.classify_special();
    let source = name.replacen("expand_", "extracted_", 1);
    let theorem = format!("{}_{k}_from_{source}", self.cfg.new_theorem_prefix);
    vprintln!("extracting {theorem}: {}", fmt_expr(&new.summarize()));
    match self.standardize(new, &theorem) {
      Ok(Some(p)) => {
        stat("extracted");
        Ok(Some(p))
      }
      Ok(None) => {
        stat("extract_invalid");
        Ok(None)
      }
      Err(e @ MmError::VocabularyExhausted { .. }) => {
        e.report();
        stat("extract_exhausted");
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  /// Runs [`Database::extract_from`] over every prediction set in order and drops redundant
  /// candidates.
  pub fn extract_all(
    &mut self, predictions: &IndexMap<String, Vec<f64>>,
  ) -> Result<Vec<ProofNode>> {
    let mut found = vec![];
    for (name, preds) in predictions {
      if let Some(p) = &self.progress {
        p.inc(1);
        p.set_message(name.clone())
      }
      if let Some(new) = self.extract_from(name, preds, found.len())? {
        found.push(new)
      }
    }
    Ok(self.remove_redundant(found))
  }

  /// The label sequence of a proof with hypothesis labels blanked out.
  fn shape(&self, p: &ProofNode) -> Vec<Option<Tok>> {
    (p.summarize().into_iter())
      .map(|l| match self.labels.get(&l) {
        Some(LabelData::Hyp(..)) | None => None,
        Some(LabelData::Assert(..)) => Some(l),
      })
      .collect()
  }

  /// Drops every candidate whose proof has the same shape as a stored theorem or an earlier
  /// candidate, ignoring hypothesis labels.
  pub fn remove_redundant(&self, candidates: Vec<ProofNode>) -> Vec<ProofNode> {
    let mut seen: HashSet<_> = self.theorems().map(|(_, p)| self.shape(p)).collect();
    (candidates.into_iter())
      .filter(|c| {
        let fresh = seen.insert(self.shape(c));
        if !fresh {
          stat("extract_redundant")
        }
        fresh
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn f(v: &str) -> ProofNode {
    ProofNode::leaf(tok(&format!("w{v}")), Kind::Floating, expr_of(&format!("wff {v}")))
  }

  fn imp(a: ProofNode, b: ProofNode) -> ProofNode {
    let e = expr_of(&format!("wff ( {} -> {} )", fmt_expr(&a.expr[1..]), fmt_expr(&b.expr[1..])));
    ProofNode::assert(tok("wi"), Kind::Axiom, e, vec![a, b], vec![])
  }

  fn colored(mut t: ProofNode, flags: &[bool]) -> ProofNode {
    assert!(t.recolor(&mut flags.iter().copied()));
    t
  }

  #[test]
  fn meaningful_regions() {
    // wi(wi(ph, ps), ch)
    let t = imp(imp(f("ph"), f("ps")), f("ch"));
    let good = colored(t.clone(), &[false, true, true, true, false]);
    assert_eq!(find_root(&good).unwrap().expr, expr_of("wff ( ph -> ps )"));
    assert!(is_meaningful(find_root(&good).unwrap()));
    let mixed = colored(t, &[true, true, true, false, true]);
    assert!(!is_meaningful(find_root(&mixed).unwrap()));
  }

  #[test]
  fn extraction_cuts_at_uncolored_children() {
    let t = imp(imp(imp(f("ph"), f("ps")), f("ch")), f("th"));
    // root, wi(wi(ph, ps), ch), wi(ph, ps), ph, ps, ch, th
    let t = colored(t, &[true, true, true, false, false, true, true]);
    let mut new = extract(&t).unwrap();
    let shape = new.preorder().iter().map(|n| n.step == Step::Special).collect_vec();
    assert_eq!(shape, [false, false, true, false, false]);
    assert!(new.classify_special());
    assert!(new.preorder().iter().all(|n| n.step != Step::Special));
    let kinds = new.leaves().iter().map(|n| n.kind()).collect_vec();
    assert_eq!(kinds, [Some(Kind::Floating); 3]);
    assert!(!new.classify_special());
  }

  #[test]
  fn extraction_needs_a_step() {
    let t = colored(imp(f("ph"), f("ps")), &[true, false, true]);
    assert!(extract(&t).is_none());
    assert!(extract(&f("ph")).is_none());
  }

  #[test]
  fn synthetic_labels() {
    assert!(is_synthetic("sub0"));
    assert!(is_synthetic("sub12"));
    assert!(!is_synthetic("sub"));
    assert!(!is_synthetic("subid"));
  }
}
