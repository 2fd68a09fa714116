use enum_map::Enum;
use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::Index;
use std::rc::Rc;

/// A math symbol or label. Tokens are shared between the label table and every proof tree
/// built from it, so they are reference counted.
pub type Tok = Rc<str>;

/// A statement: a typecode followed by math symbols.
pub type Expr = Vec<Tok>;

pub fn tok(s: &str) -> Tok { s.into() }

pub fn expr_of(s: &str) -> Expr { s.split_whitespace().map(tok).collect() }

/// A trait for newtyped integers, that can be used as index types in vectors.
pub trait Idx: Copy + Eq + std::hash::Hash + Ord {
  /// Convert from `T` to `usize`
  fn into_usize(self) -> usize;
  /// Convert from `usize` to `T`
  fn from_usize(_: usize) -> Self;
}

/// A vector indexed by a custom indexing type `I`, usually a newtyped integer.
pub struct IdxVec<I, T>(pub Vec<T>, PhantomData<I>);

impl<I, T: std::fmt::Debug> std::fmt::Debug for IdxVec<I, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

impl<I, T: Clone> Clone for IdxVec<I, T> {
  fn clone(&self) -> Self { Self(self.0.clone(), PhantomData) }
}

impl<I, T: PartialEq> PartialEq for IdxVec<I, T> {
  fn eq(&self, other: &Self) -> bool { self.0 == other.0 }
}

impl<I, T: serde::Serialize> serde::Serialize for IdxVec<I, T> {
  fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> { self.0.serialize(s) }
}

impl<'de, I, T: serde::Deserialize<'de>> serde::Deserialize<'de> for IdxVec<I, T> {
  fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    <Vec<T> as serde::Deserialize>::deserialize(d).map(Into::into)
  }
}

impl<I, T> IdxVec<I, T> {
  /// Construct a new empty [`IdxVec`].
  #[must_use]
  pub const fn new() -> Self { Self(vec![], PhantomData) }

  /// The number of elements in the [`IdxVec`].
  #[must_use]
  pub fn len(&self) -> usize { self.0.len() }

  /// Returns `true` if the vector contains no elements.
  #[must_use]
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Returns the value that would be returned by the next call to `push`.
  pub fn peek(&self) -> I
  where I: Idx {
    I::from_usize(self.0.len())
  }

  /// Insert a new value at the end of the vector.
  pub fn push(&mut self, val: T) -> I
  where I: Idx {
    let id = self.peek();
    self.0.push(val);
    id
  }
}

impl<I, T> From<Vec<T>> for IdxVec<I, T> {
  fn from(vec: Vec<T>) -> Self { Self(vec, PhantomData) }
}

impl<I, T> std::iter::FromIterator<T> for IdxVec<I, T> {
  fn from_iter<J: IntoIterator<Item = T>>(iter: J) -> Self { Vec::from_iter(iter).into() }
}

impl<I, T> Default for IdxVec<I, T> {
  fn default() -> Self { vec![].into() }
}

impl<I: Idx, T> Index<I> for IdxVec<I, T> {
  type Output = T;
  fn index(&self, index: I) -> &Self::Output { &self.0[I::into_usize(index)] }
}

#[macro_export]
macro_rules! mk_id {
  ($($id:ident,)*) => {
    $(
      #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
      #[derive(serde_derive::Serialize, serde_derive::Deserialize)]
      #[serde(transparent)]
      pub struct $id(pub u32);
      impl Idx for $id {
        fn from_usize(n: usize) -> Self { Self(n as u32) }
        fn into_usize(self) -> usize { self.0 as usize }
      }
      impl std::fmt::Debug for $id {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
      }
    )*
  };
}

mk_id! {
  FileId,
  NodeId,
}

#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Position {
  pub line: u32,
  pub col: u32,
}

impl std::fmt::Debug for Position {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.line, self.col)
  }
}

/// The four kinds of labelled statements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum Kind {
  Floating,
  Essential,
  Axiom,
  Theorem,
}

impl Kind {
  pub fn keyword(self) -> &'static str {
    match self {
      Kind::Floating => "$f",
      Kind::Essential => "$e",
      Kind::Axiom => "$a",
      Kind::Theorem => "$p",
    }
  }

  pub fn is_hyp(self) -> bool { matches!(self, Kind::Floating | Kind::Essential) }
}

impl std::fmt::Display for Kind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.keyword()) }
}

/// The frame of an axiom or theorem, as computed by `FrameStack::make_assertion`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
  /// Disjoint variable pairs `(x, y)` with `x < y`, restricted to mandatory variables.
  pub disjoint: Vec<(Tok, Tok)>,
  /// Mandatory floating hypotheses as `(typecode, variable)`, in stack order.
  pub floating: Vec<(Tok, Tok)>,
  /// Mandatory essential hypotheses, outermost scope first.
  pub essential: Vec<Expr>,
  pub result: Expr,
}

impl Assertion {
  pub fn arity(&self) -> usize { self.floating.len() + self.essential.len() }
}

/// An entry in the label table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelData {
  /// `$f` (data is `[typecode, variable]`) or `$e` (data is the statement).
  Hyp(Kind, Expr),
  /// `$a` or `$p`.
  Assert(Kind, Rc<Assertion>),
}

impl LabelData {
  pub fn kind(&self) -> Kind {
    match *self {
      LabelData::Hyp(k, _) | LabelData::Assert(k, _) => k,
    }
  }

  pub fn assertion(&self) -> Option<&Rc<Assertion>> {
    match self {
      LabelData::Assert(_, a) => Some(a),
      LabelData::Hyp(..) => None,
    }
  }
}

pub fn fmt_expr(e: &[Tok]) -> String { e.iter().join(" ") }
