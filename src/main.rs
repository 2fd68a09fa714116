use crate::database::Database;
use crate::error::{MmError, Result};
use crate::export::{Filter, Vocabulary};
use crate::proof::Propagation;
use crate::verify::DisjointCheck;
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

#[macro_export]
macro_rules! vprintln {
  ($($args:tt)*) => {
    if $crate::verbose() {
      eprintln!($($args)*)
    }
  };
}

mod database;
mod decompress;
mod error;
mod export;
mod extract;
mod format;
mod frame;
mod parser;
mod proof;
mod reader;
mod refactor;
mod types;
mod verify;
mod write;

#[cfg(test)]
mod tests;

pub fn stat(s: &'static str) {
  *STATS.lock().unwrap().get_or_insert_with(HashMap::new).entry(s).or_default() += 1;
}

static VERBOSE: AtomicBool = AtomicBool::new(false);
pub fn verbose() -> bool { DEBUG && VERBOSE.load(std::sync::atomic::Ordering::SeqCst) }
pub fn set_verbose(b: bool) { VERBOSE.store(b, std::sync::atomic::Ordering::SeqCst) }

static STATS: Mutex<Option<HashMap<&'static str, u32>>> = Mutex::new(None);

fn print_stats() {
  let mut g = STATS.lock().unwrap();
  let mut vec: Vec<_> = g.get_or_insert_with(HashMap::new).iter().collect();
  vec.sort();
  for (s, i) in vec {
    println!("{s}: {i}");
  }
}

fn print_stats_and_exit() {
  print_stats();
  std::process::exit(0)
}

const DEBUG: bool = cfg!(debug_assertions);

#[derive(Clone, Debug)]
pub struct Config {
  /// Maximum number of expansion variants made per theorem. `None` expands every `$p` step.
  pub threshold: Option<usize>,
  /// Proofs with more steps than this are neither expanded nor inlined into other proofs.
  /// `None` disables expansion.
  pub expand_max_len: Option<usize>,
  /// Theorems whose proofs are never inlined.
  pub exclude: Vec<String>,
  /// Disjointness check for the proofs of the database itself.
  pub theorem_disjoint: DisjointCheck,
  /// Disjointness check for proofs made by expansion, extraction and refactoring.
  pub derived_disjoint: DisjointCheck,
  pub propagation: Propagation,
  /// Theorems whose label contains this are treated as extracted theorems.
  pub new_theorem_prefix: String,
  /// Stop at the first invalid proof instead of counting it and moving on.
  pub panic_on_fail: bool,
  pub verbose: bool,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      threshold: None,
      expand_max_len: None,
      exclude: ["dummylink", "idi", "iin1", "iin3"].map(String::from).to_vec(),
      theorem_disjoint: DisjointCheck::Scoped,
      derived_disjoint: DisjointCheck::Overlap,
      propagation: Propagation::Any,
      new_theorem_prefix: "new_theorem".into(),
      panic_on_fail: false,
      verbose: false,
    }
  }
}

fn progress_bar(len: Option<usize>) -> Option<ProgressBar> {
  if std::env::var("NO_PROGRESS").is_ok() {
    return None
  }
  let bar = ProgressBar::with_draw_target(len.map(|n| n as u64), ProgressDrawTarget::stderr());
  if bar.is_hidden() {
    return None
  }
  let template = match len {
    Some(_) => "{msg:24} [{pos:>6}] {wide_bar} {elapsed_precise}",
    None => "{msg:24} [{pos:>6}] {spinner} {elapsed_precise}",
  };
  bar.set_style(ProgressStyle::with_template(template).ok()?);
  Some(bar)
}

#[derive(Parser)]
#[clap(
  name = "mm-expand",
  about = "Metamath verifier with subproof expansion and proof refactoring",
  version = env!("CARGO_PKG_VERSION")
)]
struct Args {
  /// Trace every proof step (debug builds only)
  #[clap(long, global = true)]
  verbose: bool,

  /// Disjointness check for the proofs in the database
  #[clap(long, global = true, value_enum, default_value = "scoped")]
  theorem_disjoint: DisjointCheck,

  /// Disjointness check for generated proofs
  #[clap(long, global = true, value_enum, default_value = "overlap")]
  derived_disjoint: DisjointCheck,

  /// Label prefix of extracted theorems
  #[clap(long, global = true, default_value = "new_theorem")]
  prefix: String,

  #[clap(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Read and verify a database
  Verify {
    #[clap(value_name = "FILE")]
    file: PathBuf,
  },

  /// Verify a database, expand its proofs and export the training data
  Expand {
    #[clap(value_name = "FILE")]
    file: PathBuf,

    /// Directory to write dataset.json, vocab.json, unexpanded.json, summaries.json and
    /// snapshot.json to
    #[clap(short, long, value_name = "DIR")]
    out: PathBuf,

    /// Maximum number of variants per theorem
    #[clap(long)]
    threshold: Option<usize>,

    /// Longest proof that is expanded or inlined
    #[clap(long, default_value_t = 1000)]
    max_len: usize,

    /// How substitution flags spread to parent steps
    #[clap(long, value_enum, default_value = "any")]
    propagation: Propagation,

    /// Theorems that are never inlined (comma separated)
    #[clap(long, value_delimiter = ',')]
    exclude: Option<Vec<String>>,

    /// Drop graphs with more nodes than this
    #[clap(long)]
    max_nodes: Option<usize>,

    /// Drop graphs with a node longer than this many characters
    #[clap(long)]
    max_node_chars: Option<usize>,

    /// Export at most this many variants of each theorem
    #[clap(long)]
    max_per_theorem: Option<usize>,
  },

  /// Turn predicted substitution flags into new theorems
  Extract {
    /// Snapshot written by `expand`
    #[clap(value_name = "SNAPSHOT")]
    snapshot: PathBuf,

    /// JSON map from graph name to one prediction per node
    #[clap(value_name = "PREDICTIONS")]
    predictions: PathBuf,

    /// Where to write the database with the new theorems appended
    #[clap(short, long, value_name = "FILE")]
    out: PathBuf,
  },

  /// Rewrite proofs to use the extracted theorems of a database
  Refactor {
    #[clap(value_name = "FILE")]
    file: PathBuf,

    /// Where to write the database with the refactored proofs appended
    #[clap(short, long, value_name = "FILE")]
    out: PathBuf,
  },

  /// Print a stored proof tree
  Show {
    /// A database, or a snapshot written by `expand`
    #[clap(value_name = "FILE")]
    file: PathBuf,

    /// A theorem label, or `{key}_variant_{i}` for an expansion variant
    #[clap(value_name = "LABEL")]
    label: String,
  },
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
  let file = std::fs::File::create(path).map_err(|e| MmError::Io(path.to_owned(), e))?;
  serde_json::to_writer(BufWriter::new(file), value)?;
  vprintln!("wrote {}", path.display());
  Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let file = std::fs::File::open(path).map_err(|e| MmError::Io(path.to_owned(), e))?;
  Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn read_database(cfg: Config, path: &Path) -> Result<Database> {
  let mut db = Database::new(cfg);
  db.progress = progress_bar(None);
  let res = db.read_file(path);
  if let Some(p) = db.progress.take() {
    p.finish_and_clear()
  }
  res?;
  let counts = db.counts.iter().map(|(k, n)| format!("{n} {k}")).collect::<Vec<_>>();
  eprintln!("{}: {}, {} failed", path.display(), counts.join(", "), db.failures);
  Ok(db)
}

fn run(args: Args) -> Result<bool> {
  let mut cfg = Config {
    theorem_disjoint: args.theorem_disjoint,
    derived_disjoint: args.derived_disjoint,
    new_theorem_prefix: args.prefix,
    verbose: args.verbose,
    ..Config::default()
  };
  cfg.verbose |= std::env::var("VERBOSE").is_ok();
  cfg.panic_on_fail |= std::env::var("PANIC_ON_FAIL").is_ok();
  set_verbose(cfg.verbose);
  match args.command {
    Command::Verify { file } => {
      let db = read_database(cfg, &file)?;
      Ok(db.failures == 0)
    }
    Command::Expand {
      file,
      out,
      threshold,
      max_len,
      propagation,
      exclude,
      max_nodes,
      max_node_chars,
      max_per_theorem,
    } => {
      cfg.threshold = threshold;
      cfg.expand_max_len = Some(max_len);
      cfg.propagation = propagation;
      if let Some(exclude) = exclude {
        cfg.exclude = exclude
      }
      let db = read_database(cfg, &file)?;
      std::fs::create_dir_all(&out).map_err(|e| MmError::Io(out.clone(), e))?;
      let mut vocab = Vocabulary::default();
      let filter = Filter { max_nodes, max_node_chars, max_per_theorem };
      let dataset = db.export_dataset(&mut vocab, filter)?;
      let unexpanded = db.export_unexpanded(&mut vocab)?;
      eprintln!("{} variants, {} theorems exported", dataset.len(), unexpanded.len());
      write_json(&out.join("dataset.json"), &dataset)?;
      write_json(&out.join("vocab.json"), &vocab)?;
      write_json(&out.join("unexpanded.json"), &unexpanded)?;
      write_json(&out.join("summaries.json"), &db.summaries())?;
      db.save(&out.join("snapshot.json"))?;
      Ok(db.failures == 0)
    }
    Command::Extract { snapshot, predictions, out } => {
      let mut db = Database::load(cfg, &snapshot)?;
      let predictions: IndexMap<String, Vec<f64>> = read_json(&predictions)?;
      db.progress = progress_bar(Some(predictions.len()));
      let res = db.extract_all(&predictions);
      if let Some(p) = db.progress.take() {
        p.finish_and_clear()
      }
      let theorems = res?;
      eprintln!("{} new theorems from {} predictions", theorems.len(), predictions.len());
      db.write_augmented(&out, &theorems)?;
      Ok(true)
    }
    Command::Refactor { file, out } => {
      let mut db = read_database(cfg, &file)?;
      db.progress = progress_bar(Some(db.theorems().count()));
      let res = db.refactor_all();
      if let Some(p) = db.progress.take() {
        p.finish_and_clear()
      }
      let report = res?;
      for (i, theorem) in report.theorems.iter().enumerate() {
        let uses: u32 = report.counts.iter().map(|row| row[i]).sum();
        vprintln!("{theorem}: used {uses} times");
      }
      eprintln!(
        "{} of {} proofs refactored with {} new theorems",
        report.refactored.len(),
        report.originals.len(),
        report.theorems.len()
      );
      db.write_augmented(&out, &report.refactored)?;
      Ok(true)
    }
    Command::Show { file, label } => {
      let db = match file.extension() {
        Some(ext) if ext == "json" => Database::load(cfg, &file)?,
        _ => read_database(cfg, &file)?,
      };
      let tree = db.dataset_tree(&label).ok_or(MmError::KeyNotFound(label))?;
      println!("{tree}");
      Ok(true)
    }
  }
}

fn main() {
  let args = Args::parse();
  ctrlc::set_handler(print_stats_and_exit).expect("Error setting Ctrl-C handler");
  let start = std::time::Instant::now();
  let ok = match run(args) {
    Ok(ok) => ok,
    Err(e) => !e.report(),
  };
  print_stats();
  eprintln!("done in {:.3}s", start.elapsed().as_secs_f32());
  std::process::exit(if ok { 0 } else { 1 })
}
