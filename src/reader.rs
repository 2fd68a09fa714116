use crate::database::Database;
use crate::error::{Loc, MmError, Result};
use crate::parser::Tokens;
use crate::proof::ProofEntry;
use crate::types::*;
use crate::stat;
use std::path::Path;
use std::rc::Rc;

fn located(loc: Option<Loc>) -> impl FnOnce(MmError) -> MmError {
  move |e| match loc {
    Some(loc) => e.at(loc),
    None => e,
  }
}

impl Database {
  /// Reads the database at `path` (and the files it includes) into this one.
  pub fn read_file(&mut self, path: &Path) -> Result<()> {
    let mut toks = Tokens::from_file(path)?;
    self.source = Some(path.to_owned());
    self.read(&mut toks)
  }

  /// Reads a whole database from `toks`, verifying (and expanding, if enabled) each theorem as
  /// it is encountered.
  pub fn read(&mut self, toks: &mut Tokens) -> Result<()> {
    self.scope(|this| this.read_block(toks, false))
  }

  fn scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
    self.frames.push();
    let r = f(self);
    self.frames.pop();
    r
  }

  /// Reads statements up to the `$}` closing this block, or to the end of input at top level.
  fn read_block(&mut self, toks: &mut Tokens, nested: bool) -> Result<()> {
    let mut label: Option<Tok> = None;
    loop {
      let Some(t) = toks.read()? else {
        if nested {
          return Err(toks.syntax("EOF inside ${ block"))
        }
        return match label {
          Some(l) => Err(toks.syntax(format!("label {l} is not followed by a statement"))),
          None => Ok(()),
        }
      };
      match &*t {
        "${" | "$}" if label.is_some() =>
          return Err(toks.syntax(format!("{t} cannot be labeled"))),
        "${" => self.scope(|this| this.read_block(toks, true))?,
        "$}" if nested => return Ok(()),
        "$}" => return Err(toks.syntax("$} without matching ${")),
        _ if t.starts_with('$') => {
          let loc = toks.loc();
          self.read_statement(toks, &t, label.take(), loc.clone()).map_err(located(loc))?
        }
        _ if label.is_some() => return Err(toks.syntax(format!("unexpected token {t}"))),
        _ => label = Some(t),
      }
    }
  }

  fn fresh_label(&self, label: Option<Tok>, kw: &str) -> Result<Tok> {
    let Some(label) = label else {
      return Err(MmError::Syntax(format!("{kw} statement requires a label")))
    };
    if self.labels.contains_key(&label) {
      return Err(MmError::Redeclaration { what: "label", name: label })
    }
    Ok(label)
  }

  fn add_label(&mut self, label: Tok, data: LabelData) {
    self.counts[data.kind()] += 1;
    self.labels.insert(label, data);
  }

  fn check_symbols(&self, stat: &[Tok]) -> Result<()> {
    let declared = |t: &&Tok| self.frames.lookup_constant(t) || self.frames.lookup_variable(t);
    match stat.iter().find(|t| !declared(t)) {
      Some(t) => Err(MmError::Undeclared { what: "math symbol", name: t.clone() }),
      None => Ok(()),
    }
  }

  fn read_statement(
    &mut self, toks: &mut Tokens, kw: &str, label: Option<Tok>, loc: Option<Loc>,
  ) -> Result<()> {
    if matches!(kw, "$c" | "$v" | "$d") && label.is_some() {
      return Err(MmError::Syntax(format!("{kw} statement cannot be labeled")))
    }
    match kw {
      "$c" =>
        for c in toks.read_statement()? {
          self.frames.declare_constant(c)?
        },
      "$v" =>
        for v in toks.read_statement()? {
          self.frames.declare_variable(v.clone())?;
          self.variables.insert(v);
        },
      "$d" => {
        let stat = toks.read_statement()?;
        if let Some(v) = stat.iter().find(|v| !self.frames.lookup_variable(v)) {
          return Err(MmError::Undeclared { what: "variable", name: v.clone() })
        }
        self.frames.declare_disjoint(&stat)
      }
      "$f" => {
        let label = self.fresh_label(label, kw)?;
        let stat = toks.read_statement()?;
        let [tc, var] = &*stat else {
          return Err(MmError::Syntax("$f statement must have exactly two tokens".into()))
        };
        self.frames.declare_floating(var.clone(), tc.clone(), label.clone())?;
        if self.frames.depth() == 1 {
          self.top_floats.push(label.clone())
        }
        self.add_label(label, LabelData::Hyp(Kind::Floating, stat))
      }
      "$e" => {
        let label = self.fresh_label(label, kw)?;
        let stat = toks.read_statement()?;
        self.check_symbols(&stat)?;
        self.frames.declare_essential(stat.clone(), label.clone());
        self.add_label(label, LabelData::Hyp(Kind::Essential, stat))
      }
      "$a" => {
        let label = self.fresh_label(label, kw)?;
        let stat = toks.read_statement()?;
        self.check_symbols(&stat)?;
        let a = self.frames.make_assertion(stat);
        self.add_label(label, LabelData::Assert(Kind::Axiom, Rc::new(a)))
      }
      "$p" => {
        let label = self.fresh_label(label, kw)?;
        self.read_theorem(toks, label, loc)?
      }
      _ => return Err(MmError::Syntax(format!("unknown keyword {kw}"))),
    }
    Ok(())
  }

  fn read_theorem(&mut self, toks: &mut Tokens, label: Tok, loc: Option<Loc>) -> Result<()> {
    let mut expr = toks.read_statement()?;
    let Some(i) = expr.iter().position(|t| &**t == "$=") else {
      return Err(MmError::Syntax("$p statement requires a proof after $=".into()))
    };
    let proof = expr.split_off(i + 1);
    expr.pop();
    self.check_symbols(&expr)?;
    let a = self.frames.make_assertion(expr);
    if let Some(p) = &self.progress {
      p.inc(1);
      p.set_message(label.to_string())
    }
    vprintln!("verifying {label}");
    let tree = (self.decompress(&a, &proof))
      .and_then(|labels| self.prove(&a.result, &labels, &label, self.cfg.theorem_disjoint));
    let verified = match tree {
      Ok(tree) => {
        stat("proof_verified");
        self.proofs.insert(label.to_string(), ProofEntry::Single(tree));
        true
      }
      Err(e) if e.verify_kind().is_some() && !self.cfg.panic_on_fail => {
        located(loc)(e).report();
        stat("proof_failed");
        self.failures += 1;
        false
      }
      Err(e) => return Err(e),
    };
    self.add_label(label.clone(), LabelData::Assert(Kind::Theorem, Rc::new(a)));
    if verified && self.cfg.expand_max_len.is_some() {
      self.expand_theorem(&label)?;
    }
    Ok(())
  }
}
