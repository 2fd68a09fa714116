use crate::database::Database;
use crate::error::{MmError, Result};
use crate::parser::Tokens;
use crate::Config;
use std::path::PathBuf;

/// A tiny implicational fragment: `wi`, modus ponens, one axiom and two theorems.
pub const PROP: &str = "
$( implication only $)
$c ( ) -> wff |- $.
$v ph ps ch $.
wph $f wff ph $.
wps $f wff ps $.
wch $f wff ch $.
wi $a wff ( ph -> ps ) $.
${
  min $e |- ph $.
  maj $e |- ( ph -> ps ) $.
  ax-mp $a |- ps $.
$}
ax-1 $a |- ( ph -> ( ps -> ph ) ) $.
${
  a1i.1 $e |- ph $.
  a1i $p |- ( ps -> ph ) $= wph wps wph wi a1i.1 wph wps ax-1 ax-mp $.
$}
${
  a12.1 $e |- ch $.
  a12 $p |- ( ph -> ( ps -> ch ) ) $= wps wch wi wph wch wps a12.1 a1i a1i $.
$}
";

/// An axiom with a disjointness condition, for use after [`PROP`].
pub const DISJOINT: &str = "
${
  $d ph ps $.
  ax-d $a |- ( ph -> ps ) $.
$}
";

pub fn try_load(cfg: Config, text: &str) -> Result<Database> {
  let mut db = Database::new(cfg);
  db.read(&mut Tokens::from_str("test.mm", text))?;
  Ok(db)
}

pub fn load(text: &str) -> Database { try_load(Config::default(), text).unwrap() }

pub fn expanding() -> Config { Config { expand_max_len: Some(1000), ..Config::default() } }

/// Strips the location from a reading error.
pub fn unlocated(e: MmError) -> MmError {
  match e {
    MmError::At(_, e) => *e,
    e => e,
  }
}

/// A fresh directory for files written by one test.
pub fn scratch(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("mm-expand-{name}-{}", std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  dir
}
