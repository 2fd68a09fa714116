use crate::types::*;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

/// How substitution flags flow from children to parents after being copied from another tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Propagation {
  /// Copy the flags only.
  Copy,
  /// If any child is substituted, mark the node and all its children.
  Any,
  /// Mark a node if all of its children are substituted.
  All,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
  /// A `$f` or `$e` leaf.
  Hyp(Kind),
  /// A placeholder for a subtree cut off during extraction. It becomes a hypothesis of the
  /// extracted theorem once its position (variable or hypothesis) is known.
  Special,
  /// An application of an `$a` or `$p`, with one child per mandatory hypothesis.
  Assert { kind: Kind, vars: Vec<ProofNode>, hyps: Vec<ProofNode> },
}

/// One step of a derivation tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofNode {
  pub label: Tok,
  pub step: Step,
  /// The statement proved by this step.
  pub expr: Expr,
  /// Only set on roots.
  pub name: Option<String>,
  /// Whether this node came from a subproof expansion (or was predicted to).
  pub subst: bool,
}

pub fn grow<R>(f: impl FnOnce() -> R) -> R { stacker::maybe_grow(32 * 1024, 1024 * 1024, f) }

impl ProofNode {
  pub fn leaf(label: Tok, kind: Kind, expr: Expr) -> Self {
    ProofNode { label, step: Step::Hyp(kind), expr, name: None, subst: false }
  }

  pub fn assert(label: Tok, kind: Kind, expr: Expr, vars: Vec<Self>, hyps: Vec<Self>) -> Self {
    ProofNode { label, step: Step::Assert { kind, vars, hyps }, expr, name: None, subst: false }
  }

  pub fn kind(&self) -> Option<Kind> {
    match self.step {
      Step::Hyp(k) | Step::Assert { kind: k, .. } => Some(k),
      Step::Special => None,
    }
  }

  pub fn vars(&self) -> &[ProofNode] {
    match &self.step {
      Step::Assert { vars, .. } => vars,
      _ => &[],
    }
  }

  pub fn hyps(&self) -> &[ProofNode] {
    match &self.step {
      Step::Assert { hyps, .. } => hyps,
      _ => &[],
    }
  }

  /// Variable children, then hypothesis children.
  pub fn children(&self) -> impl DoubleEndedIterator<Item = &ProofNode> {
    self.vars().iter().chain(self.hyps())
  }

  pub fn children_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut ProofNode> {
    let (vars, hyps): (&mut [ProofNode], &mut [ProofNode]) = match &mut self.step {
      Step::Assert { vars, hyps, .. } => (&mut vars[..], &mut hyps[..]),
      _ => Default::default(),
    };
    vars.iter_mut().chain(hyps)
  }

  pub fn is_leaf(&self) -> bool { self.children().next().is_none() }

  pub fn child_mut(&mut self, i: usize) -> Option<&mut ProofNode> { self.children_mut().nth(i) }

  /// The node reached by following child indices from this node.
  pub fn at_path(&self, path: &[usize]) -> Option<&ProofNode> {
    path.iter().try_fold(self, |n, &i| n.children().nth(i))
  }

  pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut ProofNode> {
    match path.split_first() {
      None => Some(self),
      Some((&i, rest)) => self.child_mut(i)?.at_path_mut(rest),
    }
  }

  /// The label sequence of the proof: each node after the proofs of its children.
  pub fn summarize(&self) -> Vec<Tok> {
    fn go(n: &ProofNode, out: &mut Vec<Tok>) {
      grow(|| n.children().for_each(|c| go(c, out)));
      out.push(n.label.clone())
    }
    let mut out = vec![];
    go(self, &mut out);
    out
  }

  /// Nodes in depth-first order: a node, then its variable children, then its hypothesis
  /// children. This is the order of graph export and prediction re-ingestion.
  pub fn preorder(&self) -> Vec<&ProofNode> {
    let mut out = vec![];
    let mut stack = vec![self];
    while let Some(n) = stack.pop() {
      out.push(n);
      stack.extend(n.children().rev())
    }
    out
  }

  /// Child-index paths of all nodes, children before parents.
  pub fn postorder_paths(&self) -> Vec<Vec<usize>> {
    fn go(n: &ProofNode, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
      grow(|| {
        for (i, c) in n.children().enumerate() {
          path.push(i);
          go(c, path, out);
          path.pop();
        }
      });
      out.push(path.clone())
    }
    let mut out = vec![];
    go(self, &mut vec![], &mut out);
    out
  }

  pub fn count(&self) -> usize { self.preorder().len() }

  /// Number of `$p` steps in the tree.
  pub fn count_theorem_steps(&self) -> usize {
    self.preorder().into_iter().filter(|n| n.kind() == Some(Kind::Theorem)).count()
  }

  /// Longest root-to-leaf path; a leaf has height 1.
  pub fn find_max_height(&self) -> usize {
    grow(|| self.children().map(|c| c.find_max_height()).max().map_or(1, |h| h + 1))
  }

  /// Shortest root-to-leaf path; a leaf has height 1.
  pub fn find_min_height(&self) -> usize {
    grow(|| self.children().map(|c| c.find_min_height()).min().map_or(1, |h| h + 1))
  }

  /// The leaves below this node, left to right. The root itself is never included.
  pub fn leaves(&self) -> Vec<&ProofNode> {
    let mut out = vec![];
    let mut stack = self.children().rev().collect::<Vec<_>>();
    while let Some(n) = stack.pop() {
      if n.is_leaf() {
        out.push(n)
      } else {
        stack.extend(n.children().rev())
      }
    }
    out
  }

  pub fn leaves_mut(&mut self) -> Vec<&mut ProofNode> {
    let mut out = vec![];
    let mut stack = self.children_mut().rev().collect::<Vec<_>>();
    while let Some(n) = stack.pop() {
      if n.is_leaf() {
        out.push(n)
      } else {
        stack.extend(n.children_mut().rev())
      }
    }
    out
  }

  /// Turns every [`Step::Special`] placeholder below this node into a hypothesis according to
  /// its position: `$f` in variable position, `$e` in hypothesis position. Returns whether any
  /// placeholder was found.
  pub fn classify_special(&mut self) -> bool {
    let mut found = false;
    if let Step::Assert { vars, hyps, .. } = &mut self.step {
      for (children, kind) in [(vars, Kind::Floating), (hyps, Kind::Essential)] {
        for c in children {
          if c.step == Step::Special {
            c.step = Step::Hyp(kind);
            found = true
          } else {
            found |= grow(|| c.classify_special())
          }
        }
      }
    }
    found
  }

  pub fn color_all(&mut self) {
    self.subst = true;
    grow(|| self.children_mut().for_each(|c| c.color_all()))
  }

  /// Copies substitution flags from a tree of the same shape, without propagation.
  pub fn copy_subst_from(&mut self, other: &ProofNode) {
    self.subst = other.subst;
    grow(|| {
      for (c, d) in self.children_mut().zip(other.children()) {
        c.copy_subst_from(d)
      }
    })
  }

  /// Copies substitution flags from a tree of the same shape, then propagates them upwards.
  /// Propagation only ever sets flags, so a substituted node stays substituted.
  pub fn mark_subst(&mut self, other: &ProofNode, prop: Propagation) {
    self.subst = other.subst;
    grow(|| {
      for (c, d) in self.children_mut().zip(other.children()) {
        c.mark_subst(d, prop)
      }
    });
    if self.is_leaf() {
      return
    }
    match prop {
      Propagation::Copy => {}
      Propagation::Any =>
        if self.children().any(|c| c.subst) {
          self.subst = true;
          self.children_mut().for_each(|c| c.subst = true)
        },
      Propagation::All =>
        if self.children().all(|c| c.subst) {
          self.subst = true
        },
    }
  }

  /// Sets flags from a sequence in preorder. Returns false if the sequence was too short.
  pub fn recolor(&mut self, flags: &mut impl Iterator<Item = bool>) -> bool {
    let Some(b) = flags.next() else { return false };
    self.subst = b;
    grow(|| self.children_mut().all(|c| c.recolor(flags)))
  }

  /// Replaces every leaf below the root whose statement is a key of `sources` with a copy of
  /// the corresponding source subtree, flagged as substituted at its top.
  pub fn splice(&mut self, sources: &HashMap<Expr, ProofNode>) {
    for c in self.children_mut() {
      if c.is_leaf() {
        if let Some(src) = sources.get(&c.expr) {
          *c = src.clone();
          c.subst = true
        }
      } else {
        grow(|| c.splice(sources))
      }
    }
  }
}

/// A stored proof: a single tree, or the list of expansion variants of one theorem pair.
#[derive(Clone, Debug)]
pub enum ProofEntry {
  Single(ProofNode),
  Variants(Vec<ProofNode>),
}

impl ProofEntry {
  pub fn trees(&self) -> &[ProofNode] {
    match self {
      ProofEntry::Single(p) => std::slice::from_ref(p),
      ProofEntry::Variants(v) => v,
    }
  }

  pub fn single(&self) -> Option<&ProofNode> {
    match self {
      ProofEntry::Single(p) => Some(p),
      ProofEntry::Variants(_) => None,
    }
  }
}

/// The flat form of a tree used for persistence: nodes in post-order, each consuming the
/// previous `vars + hyps` records as its children. Flat records keep deep trees within the
/// recursion limits of the JSON reader.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct FlatNode {
  pub label: Tok,
  /// `None` for extraction placeholders.
  pub kind: Option<Kind>,
  pub vars: u32,
  pub hyps: u32,
  pub expr: Expr,
  pub subst: bool,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct FlatProof {
  pub name: Option<String>,
  pub nodes: Vec<FlatNode>,
}

impl From<&ProofNode> for FlatProof {
  fn from(root: &ProofNode) -> Self {
    fn go(n: &ProofNode, out: &mut Vec<FlatNode>) {
      grow(|| n.children().for_each(|c| go(c, out)));
      out.push(FlatNode {
        label: n.label.clone(),
        kind: n.kind(),
        vars: n.vars().len() as u32,
        hyps: n.hyps().len() as u32,
        expr: n.expr.clone(),
        subst: n.subst,
      })
    }
    let mut nodes = vec![];
    go(root, &mut nodes);
    FlatProof { name: root.name.clone(), nodes }
  }
}

impl FlatProof {
  pub fn to_tree(&self) -> Option<ProofNode> {
    let mut stack: Vec<ProofNode> = vec![];
    for n in &self.nodes {
      let (nv, nh) = (n.vars as usize, n.hyps as usize);
      let step = match n.kind {
        None => Step::Special,
        Some(k) if k.is_hyp() => Step::Hyp(k),
        Some(kind) => {
          let hyps = stack.split_off(stack.len().checked_sub(nh)?);
          let vars = stack.split_off(stack.len().checked_sub(nv)?);
          Step::Assert { kind, vars, hyps }
        }
      };
      stack.push(ProofNode {
        label: n.label.clone(),
        step,
        expr: n.expr.clone(),
        name: None,
        subst: n.subst,
      })
    }
    let mut root = stack.pop()?;
    if !stack.is_empty() {
      return None
    }
    root.name = self.name.clone();
    Some(root)
  }
}
