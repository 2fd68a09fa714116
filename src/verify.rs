use crate::database::Database;
use crate::error::{MmError, Result, VerifyError};
use crate::proof::{ProofEntry, ProofNode, Step};
use crate::types::*;
use crate::stat;
use itertools::{iproduct, Itertools};
use std::collections::{HashMap, HashSet};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
  /// Any violation is an error.
  Strict,
  /// Violations are reported as [`Checked::Invalid`]; only missing labels are errors.
  Probe,
}

/// How `$d` restrictions of the invoked assertions are enforced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DisjointCheck {
  /// Substituted variables must be distinct and declared disjoint in an active scope.
  Scoped,
  /// Substituted variables must be distinct.
  Overlap,
  Off,
}

#[derive(Debug)]
pub enum Checked {
  Valid(ProofNode),
  /// Carries the top of the stack when the proof completed but proved something else.
  Invalid(Option<ProofNode>),
}

impl Checked {
  pub fn valid(self) -> Option<ProofNode> {
    match self {
      Checked::Valid(p) => Some(p),
      Checked::Invalid(_) => None,
    }
  }
}

pub fn apply_subst(e: &[Tok], subst: &HashMap<&str, &[Tok]>) -> Expr {
  let mut out = Vec::with_capacity(e.len());
  for t in e {
    match subst.get(&**t) {
      Some(s) => out.extend_from_slice(s),
      None => out.push(t.clone()),
    }
  }
  out
}

/// Renames temporary variables of an expanded callee proof that would clash with the symbols
/// of the subproofs about to be spliced in. Each clashing `$f` leaf label becomes `subN` (and
/// so does the variable it declares), reusing the same name for repeated labels. Returns the
/// new `$f` declarations as `(label, [typecode, variable])`.
pub fn avoid_conflict(
  tree: &mut ProofNode, sources: &HashMap<Expr, ProofNode>, reserved: &HashSet<Tok>,
) -> Vec<(Tok, Expr)> {
  let mut fresh = vec![];
  if sources.is_empty() {
    return fresh
  }
  let mut renamed: HashMap<Tok, Tok> = HashMap::new();
  for leaf in tree.leaves_mut() {
    if leaf.kind() != Some(Kind::Floating)
      || leaf.expr.len() != 2
      || sources.contains_key(&leaf.expr)
      || !reserved.contains(&leaf.label)
    {
      continue
    }
    let n = renamed.len();
    let name = renamed.entry(leaf.label.clone()).or_insert_with(|| {
      let name = tok(&format!("sub{n}"));
      vprintln!("renaming {} to {name}", leaf.label);
      fresh.push((name.clone(), vec![leaf.expr[0].clone(), name.clone()]));
      name
    });
    leaf.label = name.clone();
    leaf.expr[1] = name.clone();
  }
  fresh
}

impl Database {
  /// The distinct variables of `e`, in order of first occurrence.
  pub fn find_vars<'a>(&self, e: &'a [Tok]) -> Vec<&'a Tok> {
    e.iter().filter(|t| self.variables.contains(*t)).unique().collect()
  }

  fn check_disjoint(
    &self, a: &Assertion, subst: &HashMap<&str, &[Tok]>, dj: DisjointCheck,
  ) -> std::result::Result<(), VerifyError> {
    if dj == DisjointCheck::Off {
      return Ok(())
    }
    for (x, y) in &a.disjoint {
      let xs = self.find_vars(subst.get(&**x).copied().unwrap_or_default());
      let ys = self.find_vars(subst.get(&**y).copied().unwrap_or_default());
      for (u, v) in iproduct!(&xs, &ys) {
        if u == v || (dj == DisjointCheck::Scoped && !self.frames.lookup_disjoint(u, v)) {
          vprintln!("$d {x} {y} violated by {u}, {v}");
          return Err(VerifyError::DisjointViolation((*u).clone(), (*v).clone()))
        }
      }
    }
    Ok(())
  }

  /// Replays `proof` on the stack machine and returns the final stack.
  fn replay(&self, proof: &[Tok], name: &str, dj: DisjointCheck) -> Result<Vec<ProofNode>> {
    let mut stack: Vec<ProofNode> = vec![];
    for label in proof {
      match self.get_label(label)? {
        LabelData::Hyp(kind, e) => stack.push(ProofNode::leaf(label.clone(), *kind, e.clone())),
        LabelData::Assert(kind, a) => {
          let fail = |kind| MmError::verify(name, Some(label.clone()), kind);
          let n = a.arity();
          if stack.len() < n {
            return Err(fail(VerifyError::StackUnderflow { needed: n, available: stack.len() }))
          }
          let mut hyps = stack.split_off(stack.len() - n);
          let vars = hyps.drain(..a.floating.len()).collect_vec();
          let mut subst: HashMap<&str, &[Tok]> = HashMap::new();
          for ((tc, v), node) in a.floating.iter().zip(&vars) {
            match node.expr.split_first() {
              Some((head, rest)) if head == tc => {
                subst.insert(&**v, rest);
              }
              _ =>
                return Err(fail(VerifyError::TypeMismatch {
                  typecode: tc.clone(),
                  var: v.clone(),
                  found: node.expr.clone(),
                })),
            }
          }
          self.check_disjoint(a, &subst, dj).map_err(fail)?;
          for (h, node) in a.essential.iter().zip(&hyps) {
            let expected = apply_subst(h, &subst);
            if node.expr != expected {
              return Err(fail(VerifyError::HypothesisMismatch {
                expected,
                found: node.expr.clone(),
              }))
            }
          }
          let expr = apply_subst(&a.result, &subst);
          drop(subst);
          stack.push(ProofNode::assert(label.clone(), *kind, expr, vars, hyps))
        }
      }
    }
    Ok(stack)
  }

  /// Checks that `proof` proves `stat` and returns its tree. The root is named `name` unless
  /// it is empty.
  pub fn prove(
    &self, stat: &[Tok], proof: &[Tok], name: &str, dj: DisjointCheck,
  ) -> Result<ProofNode> {
    let mut stack = self.replay(proof, name, dj)?;
    let n = stack.len();
    let (Some(mut root), 1) = (stack.pop(), n) else {
      return Err(MmError::verify(name, None, VerifyError::StackNotSingleton(n)))
    };
    if root.expr != stat {
      let kind =
        VerifyError::ConclusionMismatch { expected: stat.to_vec(), found: root.expr.clone() };
      return Err(MmError::verify(name, None, kind).with_partial(root))
    }
    debug_assert_eq!(root.summarize(), proof);
    if !name.is_empty() {
      root.name = Some(name.to_owned())
    }
    Ok(root)
  }

  pub fn verify(
    &self, stat: &[Tok], proof: &[Tok], name: &str, mode: Mode, dj: DisjointCheck,
  ) -> Result<Checked> {
    match self.prove(stat, proof, name, dj) {
      Ok(p) => Ok(Checked::Valid(p)),
      Err(MmError::Verify(f)) if mode == Mode::Probe => Ok(Checked::Invalid(f.partial)),
      Err(e) => Err(e),
    }
  }

  /// Re-derives the statements of a tree bottom-up after its leaves have been rewritten. Each
  /// hypothesis child takes the instance of the hypothesis it discharges under the
  /// substitution given by the step's variable children, and `$e` leaves are re-registered
  /// with their new statement. Nothing is checked; verify the result afterwards.
  pub fn propagate_substituting_hyps(&mut self, node: &mut ProofNode) {
    let Some(a) = self.assertion(&node.label).cloned() else { return };
    let Step::Assert { vars, hyps, .. } = &mut node.step else { return };
    for c in vars.iter_mut().chain(hyps.iter_mut()) {
      crate::proof::grow(|| self.propagate_substituting_hyps(c))
    }
    let subst: HashMap<&str, &[Tok]> = (a.floating.iter().zip(&*vars))
      .map(|((_, v), c)| (&**v, c.expr.get(1..).unwrap_or_default()))
      .collect();
    for (h, c) in a.essential.iter().zip(hyps) {
      c.expr = apply_subst(h, &subst);
      if c.kind() == Some(Kind::Essential) && c.is_leaf() {
        self.register_essential(c.label.clone(), c.expr.clone())
      }
    }
    node.expr = apply_subst(&a.result, &subst);
  }

  /// Produces expansion variants of theorem `name`: for each of its first `threshold` `$p`
  /// steps in post-order, the step is replaced by the callee's own proof instantiated at the
  /// step. Each variant is verified and appended to the variant list `expand_{callee}_in_{name}`.
  /// Returns the number of variants made.
  pub fn expand_theorem(&mut self, name: &str) -> Result<usize> {
    let Some(max_len) = self.cfg.expand_max_len else { return Ok(0) };
    let Some(root) = self.proofs.get(name).and_then(ProofEntry::single).cloned() else {
      return Ok(0)
    };
    if root.summarize().len() > max_len {
      stat("expand_skipped_long");
      return Ok(0)
    }
    let steps = root.count_theorem_steps();
    let times = self.cfg.threshold.map_or(steps, |t| steps.min(t));
    let paths = (root.postorder_paths().into_iter())
      .filter(|p| root.at_path(p).and_then(|n| n.kind()) == Some(Kind::Theorem))
      .take(times)
      .collect_vec();
    let mut made = 0;
    for path in paths {
      match self.expand_step(&root, &path, name, max_len) {
        Ok(None) => {}
        Ok(Some(tree)) => {
          stat("expansion");
          made += 1;
          let key = tree.name.clone().unwrap_or_default();
          self.add_variant(key, tree)
        }
        Err(e) if e.verify_kind().is_some() && !self.cfg.panic_on_fail => {
          e.report();
          stat("expand_failed")
        }
        Err(e) => return Err(e),
      }
    }
    Ok(made)
  }

  fn expand_step(
    &mut self, root: &ProofNode, path: &[usize], name: &str, max_len: usize,
  ) -> Result<Option<ProofNode>> {
    let Some(step) = root.at_path(path) else { return Ok(None) };
    let callee = step.label.clone();
    if self.cfg.exclude.iter().any(|l| **l == *callee) {
      return Ok(None)
    }
    let Some(template) = self.proofs.get(&*callee).and_then(ProofEntry::single) else {
      return Ok(None)
    };
    if template.is_leaf() || template.summarize().len() > max_len {
      return Ok(None)
    }
    let Some(a) = self.assertion(&callee).cloned() else { return Ok(None) };
    let mut copy = template.clone();
    copy.color_all();

    let mut sources: HashMap<Expr, ProofNode> = HashMap::new();
    for ((tc, v), child) in a.floating.iter().zip(step.vars()) {
      sources.insert(vec![tc.clone(), v.clone()], child.clone());
    }
    for (h, child) in a.essential.iter().zip(step.hyps()) {
      sources.insert(h.clone(), child.clone());
    }
    let reserved: HashSet<Tok> = sources.values().flat_map(|s| s.summarize()).collect();
    let before = copy.summarize();
    for (label, expr) in avoid_conflict(&mut copy, &sources, &reserved) {
      self.register_floating(label, expr)
    }
    let dj = self.cfg.derived_disjoint;
    let after = copy.summarize();
    if after != before {
      copy = self.prove(&copy.expr, &after, "", dj)?;
      copy.color_all()
    }
    copy.splice(&sources);
    let mut spliced = self.prove(&step.expr, &copy.summarize(), "", dj)?;
    spliced.copy_subst_from(&copy);

    let mut whole = root.clone();
    let Some(slot) = whole.at_path_mut(path) else { return Ok(None) };
    *slot = spliced;
    let variant = format!("expand_{callee}_in_{name}");
    let mut tree = self.prove(&root.expr, &whole.summarize(), &variant, dj)?;
    tree.mark_subst(&whole, self.cfg.propagation);
    vprintln!("{variant}: {} steps", tree.count());
    Ok(Some(tree))
  }
}
