use crate::database::Database;
use crate::error::{MmError, Result};
use crate::proof::ProofNode;
use crate::types::*;
use itertools::{iproduct, Itertools};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// The variables a subtree contributes to a `$d` condition: the variable of a `$f` leaf, or
/// the distinct variables of the `$f` leaves below an inner node.
fn dv_vars(n: &ProofNode) -> Vec<Tok> {
  let var = |n: &ProofNode| match n.kind() {
    Some(Kind::Floating) => n.expr.get(1).cloned(),
    _ => None,
  };
  if n.is_leaf() {
    return var(n).into_iter().collect()
  }
  n.leaves().into_iter().filter_map(var).unique().collect()
}

impl Database {
  /// The `$d` conditions a stand-alone statement of `proof` needs, gathered from the steps
  /// directly above a leaf that invoke an assertion with `$d` conditions. Pairs are ordered,
  /// distinct, and listed in discovery order.
  pub fn get_dvs(&self, proof: &ProofNode) -> Vec<(Tok, Tok)> {
    let mut out = vec![];
    for n in proof.preorder() {
      if n.find_min_height() != 2 {
        continue
      }
      let Some(a) = self.assertion(&n.label) else { continue };
      if a.disjoint.is_empty() {
        continue
      }
      let index: HashMap<&Tok, usize> =
        a.floating.iter().enumerate().map(|(i, (_, v))| (v, i)).collect();
      for (x, y) in &a.disjoint {
        let (Some(cx), Some(cy)) = (index.get(x), index.get(y)) else { continue };
        let (Some(cx), Some(cy)) = (n.vars().get(*cx), n.vars().get(*cy)) else { continue };
        for (u, v) in iproduct!(dv_vars(cx), dv_vars(cy)) {
          let pair = match u.cmp(&v) {
            std::cmp::Ordering::Less => (u, v),
            std::cmp::Ordering::Equal => continue,
            std::cmp::Ordering::Greater => (v, u),
          };
          if !out.contains(&pair) {
            out.push(pair)
          }
        }
      }
    }
    out
  }

  /// Metamath text for `proof` as a theorem in its own block, with its `$d` conditions and
  /// one `$e` line per distinct hypothesis label.
  pub fn write_theorem(&self, proof: &ProofNode) -> String {
    let name = proof.name.as_deref().unwrap_or_default();
    let mut s = String::from("  ${\n");
    for (x, y) in self.get_dvs(proof) {
      s += &format!("    $d {x} {y} $.\n")
    }
    let mut seen = HashSet::new();
    for leaf in proof.leaves() {
      if leaf.kind() == Some(Kind::Essential) && seen.insert(&leaf.label) {
        s += &format!("    {} $e {} $.\n", leaf.label, fmt_expr(&leaf.expr))
      }
    }
    let (expr, labels) = (fmt_expr(&proof.expr), fmt_expr(&proof.summarize()));
    s += &format!("    {name} $p {expr} $= {labels} $.\n  $}}\n\n");
    s
  }

  /// Copies the database this one was read from to `out` and appends `theorems` to it.
  pub fn write_augmented(&self, out: &Path, theorems: &[ProofNode]) -> Result<()> {
    let Some(source) = &self.source else {
      return Err(MmError::Syntax("no source file to augment".into()))
    };
    std::fs::copy(source, out).map_err(|e| MmError::Io(source.clone(), e))?;
    let io = |e| MmError::Io(out.to_owned(), e);
    let mut w = BufWriter::new(OpenOptions::new().append(true).open(out).map_err(io)?);
    for t in theorems {
      w.write_all(self.write_theorem(t).as_bytes()).map_err(io)?
    }
    w.flush().map_err(io)?;
    vprintln!("appended {} theorems to {}", theorems.len(), out.display());
    Ok(())
  }
}
