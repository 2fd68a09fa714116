use crate::error::{MmError, Result};
use crate::frame::FrameStack;
use crate::proof::{FlatProof, ProofEntry, ProofNode};
use crate::types::*;
use crate::Config;
use enum_map::EnumMap;
use indexmap::IndexMap;
use indicatif::ProgressBar;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Everything known after reading a database: the label table, the verified proofs and their
/// expansion variants.
pub struct Database {
  pub cfg: Config,
  pub frames: FrameStack,
  pub labels: IndexMap<Tok, LabelData>,
  /// Proof trees keyed by theorem label, or by `expand_{callee}_in_{theorem}` for expansion
  /// variants.
  pub proofs: IndexMap<String, ProofEntry>,
  /// Every variable ever declared, in any scope, plus synthetic `subN` variables.
  pub variables: HashSet<Tok>,
  /// `$f` labels declared outside of any block, in declaration order.
  pub top_floats: Vec<Tok>,
  pub counts: EnumMap<Kind, u32>,
  /// Number of `$p` statements whose proof was rejected.
  pub failures: u32,
  /// The file the database was read from.
  pub source: Option<PathBuf>,
  pub progress: Option<ProgressBar>,
}

impl Database {
  pub fn new(cfg: Config) -> Self {
    Database {
      cfg,
      frames: Default::default(),
      labels: Default::default(),
      proofs: Default::default(),
      variables: Default::default(),
      top_floats: vec![],
      counts: Default::default(),
      failures: 0,
      source: None,
      progress: None,
    }
  }

  pub fn get_label(&self, label: &str) -> Result<&LabelData> {
    self.labels.get(label).ok_or_else(|| MmError::KeyNotFound(label.to_owned()))
  }

  pub fn assertion(&self, label: &str) -> Option<&std::rc::Rc<Assertion>> {
    self.labels.get(label)?.assertion()
  }

  /// Registers a floating hypothesis that exists only in derived proofs, such as the `subN`
  /// variables introduced to avoid capture during expansion. An existing entry is replaced.
  pub fn register_floating(&mut self, label: Tok, expr: Expr) {
    if let Some(var) = expr.get(1) {
      self.variables.insert(var.clone());
    }
    self.labels.insert(label, LabelData::Hyp(Kind::Floating, expr));
  }

  /// Registers an essential hypothesis of an extracted theorem.
  pub fn register_essential(&mut self, label: Tok, expr: Expr) {
    self.labels.insert(label, LabelData::Hyp(Kind::Essential, expr));
  }

  /// The expansion variants of every theorem, in insertion order.
  pub fn variants(&self) -> impl Iterator<Item = (&str, &[ProofNode])> {
    self.proofs.iter().filter_map(|(k, e)| match e {
      ProofEntry::Variants(v) => Some((&**k, &**v)),
      ProofEntry::Single(_) => None,
    })
  }

  /// The plain (unexpanded) proof trees, in insertion order.
  pub fn theorems(&self) -> impl Iterator<Item = (&str, &ProofNode)> {
    self.proofs.iter().filter_map(|(k, e)| Some((&**k, e.single()?)))
  }

  pub fn add_variant(&mut self, key: String, tree: ProofNode) {
    let entry = self.proofs.entry(key).or_insert_with(|| ProofEntry::Variants(vec![]));
    if let ProofEntry::Single(old) = entry {
      *entry = ProofEntry::Variants(vec![old.clone()])
    }
    if let ProofEntry::Variants(v) = entry {
      v.push(tree)
    }
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| MmError::Io(path.to_owned(), e))?;
    serde_json::to_writer(BufWriter::new(file), &Snapshot::from(self))?;
    vprintln!("saved {} proofs to {}", self.proofs.len(), path.display());
    Ok(())
  }

  /// Restores a database saved with [`Database::save`]. The scope stack is not saved, so the
  /// result can only check derived proofs without scoped disjointness.
  pub fn load(cfg: Config, path: &Path) -> Result<Self> {
    let file = std::fs::File::open(path).map_err(|e| MmError::Io(path.to_owned(), e))?;
    let snap: Snapshot = serde_json::from_reader(BufReader::new(file))?;
    let mut db = Database::new(cfg);
    db.source = snap.source;
    for (label, data) in &snap.labels {
      db.counts[data.kind()] += 1;
      db.labels.insert(label.clone(), data.clone());
    }
    db.variables = snap.variables.into_iter().collect();
    db.top_floats = snap.top_floats;
    for (key, entry) in snap.proofs {
      let bad = || MmError::Syntax(format!("{}: corrupt proof {key}", path.display()));
      let entry = match entry {
        SnapshotEntry::Single(p) => ProofEntry::Single(p.to_tree().ok_or_else(bad)?),
        SnapshotEntry::Variants(ps) => ProofEntry::Variants(
          ps.iter().map(|p| p.to_tree().ok_or_else(bad)).collect::<Result<_>>()?,
        ),
      };
      db.proofs.insert(key, entry);
    }
    Ok(db)
  }
}

#[derive(Serialize, Deserialize)]
enum SnapshotEntry {
  Single(FlatProof),
  Variants(Vec<FlatProof>),
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
  source: Option<PathBuf>,
  labels: IndexMap<Tok, LabelData>,
  variables: Vec<Tok>,
  top_floats: Vec<Tok>,
  proofs: IndexMap<String, SnapshotEntry>,
}

impl From<&Database> for Snapshot {
  fn from(db: &Database) -> Self {
    let mut variables = db.variables.iter().cloned().collect::<Vec<_>>();
    variables.sort();
    Snapshot {
      source: db.source.clone(),
      labels: db.labels.clone(),
      variables,
      top_floats: db.top_floats.clone(),
      proofs: (db.proofs.iter())
        .map(|(k, e)| {
          let e = match e {
            ProofEntry::Single(p) => SnapshotEntry::Single(p.into()),
            ProofEntry::Variants(v) => SnapshotEntry::Variants(v.iter().map(Into::into).collect()),
          };
          (k.clone(), e)
        })
        .collect(),
    }
  }
}
