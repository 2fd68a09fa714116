use crate::error::{MmError, Result};
use crate::types::*;
use itertools::Itertools;
use paste::paste;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// The declarations of one `${ ... $}` block.
#[derive(Default, Debug)]
pub struct Frame {
  constants: HashSet<Tok>,
  variables: HashSet<Tok>,
  disjoint: HashSet<(Tok, Tok)>,
  /// `(variable, typecode)` in declaration order.
  floating: Vec<(Tok, Tok)>,
  floating_labels: HashMap<Tok, Tok>,
  essential: Vec<Expr>,
  essential_labels: HashMap<Expr, Tok>,
}

fn ordered(x: &Tok, y: &Tok) -> (Tok, Tok) {
  if x <= y {
    (x.clone(), y.clone())
  } else {
    (y.clone(), x.clone())
  }
}

/// The active scopes, outermost first.
#[derive(Default, Debug)]
pub struct FrameStack(Vec<Frame>);

macro_rules! symbols {
  ($($name:ident: $field:ident;)*) => { paste! {
    $(
      /// Is this token declared in any active frame?
      pub fn [<lookup_ $name>](&self, tok: &str) -> bool {
        self.0.iter().rev().any(|fr| fr.$field.contains(tok))
      }

      pub fn [<declare_ $name>](&mut self, tok: Tok) -> Result<()> {
        if self.lookup_constant(&tok) {
          return Err(MmError::Redeclaration { what: "constant", name: tok })
        }
        if self.lookup_variable(&tok) {
          return Err(MmError::Redeclaration { what: "variable", name: tok })
        }
        self.top().$field.insert(tok);
        Ok(())
      }
    )*
  }};
}

impl FrameStack {
  pub fn push(&mut self) { self.0.push(Frame::default()) }

  pub fn pop(&mut self) { self.0.pop(); }

  pub fn depth(&self) -> usize { self.0.len() }

  fn top(&mut self) -> &mut Frame {
    if self.0.is_empty() {
      self.push()
    }
    let n = self.0.len();
    &mut self.0[n - 1]
  }

  symbols! {
    constant: constants;
    variable: variables;
  }

  pub fn declare_floating(&mut self, var: Tok, typecode: Tok, label: Tok) -> Result<()> {
    if !self.lookup_variable(&var) {
      return Err(MmError::Undeclared { what: "variable", name: var })
    }
    if !self.lookup_constant(&typecode) {
      return Err(MmError::Undeclared { what: "constant", name: typecode })
    }
    let frame = self.top();
    if frame.floating_labels.contains_key(&var) {
      return Err(MmError::Redeclaration { what: "floating hypothesis for", name: var })
    }
    frame.floating.push((var.clone(), typecode));
    frame.floating_labels.insert(var, label);
    Ok(())
  }

  pub fn declare_essential(&mut self, stat: Expr, label: Tok) {
    let frame = self.top();
    frame.essential.push(stat.clone());
    frame.essential_labels.insert(stat, label);
  }

  pub fn declare_disjoint(&mut self, stat: &[Tok]) {
    let pairs =
      stat.iter().tuple_combinations().filter(|(x, y)| x != y).map(|(x, y)| ordered(x, y));
    self.top().disjoint.extend(pairs)
  }

  pub fn lookup_floating(&self, var: &str) -> Result<&Tok> {
    self.0.iter().rev().find_map(|fr| fr.floating_labels.get(var)).ok_or_else(|| {
      MmError::KeyNotFound(format!("floating hypothesis for {var}"))
    })
  }

  pub fn lookup_essential(&self, stat: &[Tok]) -> Result<&Tok> {
    self.0.iter().rev().find_map(|fr| fr.essential_labels.get(stat)).ok_or_else(|| {
      MmError::KeyNotFound(format!("essential hypothesis '{}'", fmt_expr(stat)))
    })
  }

  pub fn lookup_disjoint(&self, x: &Tok, y: &Tok) -> bool {
    let p = ordered(x, y);
    self.0.iter().rev().any(|fr| fr.disjoint.contains(&p))
  }

  /// Computes the frame of an assertion with conclusion `stat` in the current scope.
  pub fn make_assertion(&self, stat: Expr) -> Assertion {
    let essential = self.0.iter().flat_map(|fr| fr.essential.iter().cloned()).collect_vec();
    let mut mand: HashSet<&Tok> = (essential.iter().chain([&stat]).flatten())
      .filter(|tok| self.lookup_variable(tok))
      .collect();
    let disjoint: BTreeSet<(Tok, Tok)> = (self.0.iter().flat_map(|fr| &fr.disjoint))
      .filter(|(x, y)| mand.contains(x) && mand.contains(y))
      .cloned()
      .collect();
    let mut floating = VecDeque::new();
    for fr in self.0.iter().rev() {
      for (v, k) in fr.floating.iter().rev() {
        if mand.remove(v) {
          floating.push_front((k.clone(), v.clone()))
        }
      }
    }
    Assertion {
      disjoint: disjoint.into_iter().collect(),
      floating: floating.into(),
      essential,
      result: stat,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn setup() -> FrameStack {
    let mut fs = FrameStack::default();
    fs.push();
    for c in ["wff", "|-", "->"] {
      fs.declare_constant(tok(c)).unwrap();
    }
    for v in ["ph", "ps", "ch"] {
      fs.declare_variable(tok(v)).unwrap();
    }
    fs.declare_floating(tok("ph"), tok("wff"), tok("wph")).unwrap();
    fs.declare_floating(tok("ps"), tok("wff"), tok("wps")).unwrap();
    fs.declare_floating(tok("ch"), tok("wff"), tok("wch")).unwrap();
    fs
  }

  #[test]
  fn redeclaration_is_rejected_across_frames() {
    let mut fs = setup();
    fs.push();
    assert!(matches!(fs.declare_variable(tok("wff")), Err(MmError::Redeclaration { .. })));
    assert!(matches!(fs.declare_constant(tok("ph")), Err(MmError::Redeclaration { .. })));
    assert!(matches!(fs.declare_constant(tok("|-")), Err(MmError::Redeclaration { .. })));
    fs.declare_variable(tok("th")).unwrap();
    fs.pop();
    assert!(!fs.lookup_variable("th"));
  }

  #[test]
  fn floating_checks() {
    let mut fs = setup();
    let e = fs.declare_floating(tok("ph"), tok("wff"), tok("wph2"));
    assert!(matches!(e, Err(MmError::Redeclaration { .. })));
    let e = fs.declare_floating(tok("x"), tok("wff"), tok("wx"));
    assert!(matches!(e, Err(MmError::Undeclared { .. })));
    let e = fs.declare_floating(tok("ph"), tok("set"), tok("sph"));
    assert!(matches!(e, Err(MmError::Undeclared { .. })));
    // a nested frame may rebind the variable
    fs.push();
    fs.declare_floating(tok("ph"), tok("wff"), tok("wph2")).unwrap();
    assert_eq!(&**fs.lookup_floating("ph").unwrap(), "wph2");
    fs.pop();
    assert_eq!(&**fs.lookup_floating("ph").unwrap(), "wph");
    assert!(matches!(fs.lookup_floating("zz"), Err(MmError::KeyNotFound(_))));
  }

  #[test]
  fn mandatory_hypotheses() {
    let mut fs = setup();
    fs.push();
    fs.declare_disjoint(&expr_of("ph ps ch"));
    fs.declare_essential(expr_of("|- ch"), tok("h1"));
    let a = fs.make_assertion(expr_of("|- ( ph -> ch )"));
    assert_eq!(a.floating, [(tok("wff"), tok("ph")), (tok("wff"), tok("ch"))]);
    assert_eq!(a.essential, [expr_of("|- ch")]);
    assert_eq!(a.disjoint, [(tok("ch"), tok("ph"))]);
    assert!(fs.lookup_disjoint(&tok("ps"), &tok("ph")));
    assert_eq!(&**fs.lookup_essential(&expr_of("|- ch")).unwrap(), "h1");
    fs.pop();
    assert!(!fs.lookup_disjoint(&tok("ps"), &tok("ph")));
  }
}
