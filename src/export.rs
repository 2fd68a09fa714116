use crate::database::Database;
use crate::error::{MmError, Result};
use crate::proof::{ProofEntry, ProofNode};
use crate::stat;
use crate::types::*;
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashSet;

/// The character vocabulary shared by a whole dataset. Ids are assigned in first-seen order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary(pub IndexMap<char, u32>);

impl Vocabulary {
  /// Encodes the characters of `s`. New characters are added if `grow` is set, and are an
  /// error otherwise.
  pub fn encode(&mut self, s: &str, grow: bool) -> Result<Vec<u32>> {
    s.chars()
      .map(|c| match self.0.get(&c) {
        Some(&i) => Ok(i),
        None if grow => {
          let i = self.0.len() as u32;
          self.0.insert(c, i);
          Ok(i)
        }
        None => Err(MmError::UnknownToken(c)),
      })
      .collect()
  }
}

/// One node of an exported graph: encoded statement, encoded label, substitution flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord(pub Vec<u32>, pub Vec<u32>, pub u8);

/// A proof tree as a graph. Nodes are numbered in preorder (root 0) and every edge points from
/// a child to its parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofGraph {
  pub name: String,
  pub source: Vec<NodeId>,
  pub target: Vec<NodeId>,
  pub nodes: IdxVec<NodeId, NodeRecord>,
}

/// The child-to-parent edges of `root`, with nodes numbered in preorder. Edges are listed in
/// the order their child is numbered.
pub fn edges(root: &ProofNode) -> (Vec<NodeId>, Vec<NodeId>) {
  let (mut source, mut target) = (vec![], vec![]);
  let mut next = 0;
  let mut stack = vec![(root, None)];
  while let Some((n, parent)) = stack.pop() {
    let id = NodeId(next);
    next += 1;
    if let Some(p) = parent {
      source.push(id);
      target.push(p)
    }
    stack.extend(n.children().rev().map(|c| (c, Some(id))))
  }
  (source, target)
}

impl ProofGraph {
  pub fn new(name: String, root: &ProofNode, vocab: &mut Vocabulary, grow: bool) -> Result<Self> {
    let (source, target) = edges(root);
    let mut nodes = IdxVec::default();
    for n in root.preorder() {
      let expr = vocab.encode(&fmt_expr(&n.expr), grow)?;
      let label = vocab.encode(&n.label, grow)?;
      nodes.push(NodeRecord(expr, label, n.subst as u8));
    }
    Ok(ProofGraph { name, source, target, nodes })
  }

  /// Number of characters in the longest node (statement plus label).
  fn widest_node(&self) -> usize {
    self.nodes.0.iter().map(|n| n.0.len() + n.1.len()).max().unwrap_or(0)
  }
}

/// Limits on the graphs kept in a dataset.
#[derive(Copy, Clone, Debug, Default)]
pub struct Filter {
  pub max_nodes: Option<usize>,
  pub max_node_chars: Option<usize>,
  /// Keep at most this many variants of each theorem, the first ones in variant order.
  pub max_per_theorem: Option<usize>,
}

impl Filter {
  fn keep(&self, g: &ProofGraph) -> bool {
    self.max_nodes.map_or(true, |m| g.nodes.len() <= m)
      && self.max_node_chars.map_or(true, |m| g.widest_node() <= m)
  }
}

/// The flat label sequence of each stored proof, for inspection and for the prediction side.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum Summary {
  Single(Vec<Tok>),
  Variants(Vec<Vec<Tok>>),
}

impl Database {
  /// Exports every expansion variant as `{key}_variant_{i}`, growing `vocab` as needed.
  pub fn export_dataset(&self, vocab: &mut Vocabulary, filter: Filter) -> Result<Vec<ProofGraph>> {
    let mut out = vec![];
    for (key, trees) in self.variants() {
      let mut kept = 0;
      for (i, tree) in trees.iter().enumerate() {
        if filter.max_per_theorem.is_some_and(|m| kept >= m) {
          stat("export_over_limit");
          continue
        }
        let g = ProofGraph::new(format!("{key}_variant_{i}"), tree, vocab, true)?;
        if filter.keep(&g) {
          kept += 1;
          out.push(g)
        } else {
          stat("export_filtered")
        }
      }
    }
    Ok(out)
  }

  /// Exports the plain theorems with a frozen vocabulary. Theorems using characters the
  /// vocabulary has never seen are skipped with a warning.
  pub fn export_unexpanded(&self, vocab: &mut Vocabulary) -> Result<Vec<ProofGraph>> {
    let mut out = vec![];
    for (key, tree) in self.theorems() {
      match ProofGraph::new(key.to_owned(), tree, vocab, false) {
        Ok(g) => out.push(g),
        Err(e @ MmError::UnknownToken(_)) => {
          eprintln!("warning: skipping {key}: {e}");
          stat("export_unknown_token")
        }
        Err(e) => return Err(e),
      }
    }
    Ok(out)
  }

  pub fn summaries(&self) -> IndexMap<String, Summary> {
    (self.proofs.iter())
      .map(|(k, e)| {
        let s = match e {
          ProofEntry::Single(p) => Summary::Single(p.summarize()),
          ProofEntry::Variants(v) => Summary::Variants(v.iter().map(|p| p.summarize()).collect()),
        };
        (k.clone(), s)
      })
      .collect()
  }

  /// Looks up the tree exported under `name`: a plain theorem label or `{key}_variant_{i}`.
  pub fn dataset_tree(&self, name: &str) -> Option<&ProofNode> {
    if let Some(p) = self.proofs.get(name) {
      return p.single()
    }
    let (key, i) = name.rsplit_once("_variant_")?;
    self.proofs.get(key)?.trees().get(i.parse::<usize>().ok()?)
  }
}

fn colored(p: f64) -> bool { p > 0.5 }

/// Checks that the nodes predicted as substituted form a single tree: there are at least two
/// of them and, keeping only the edges between them, exactly one has no parent.
pub fn is_tree(source: &[NodeId], target: &[NodeId], predictions: &[f64]) -> bool {
  let marked: HashSet<NodeId> = (predictions.iter().enumerate())
    .filter(|&(_, &p)| colored(p))
    .map(|(i, _)| NodeId(i as u32))
    .collect();
  if marked.len() <= 1 {
    return false
  }
  let with_parent: HashSet<NodeId> = (source.iter().zip(target))
    .filter(|&(s, t)| marked.contains(s) && marked.contains(t))
    .map(|(s, _)| *s)
    .collect();
  marked.len() - with_parent.len() == 1
}

/// Overwrites the substitution flags of `root` in preorder from `predictions`.
pub fn recolor(root: &mut ProofNode, predictions: &[f64]) -> Result<()> {
  let expected = root.count();
  if predictions.len() != expected {
    return Err(MmError::PredictionCount { expected, found: predictions.len() })
  }
  root.recolor(&mut predictions.iter().map(|&p| colored(p)));
  Ok(())
}
