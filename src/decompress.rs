//! Compressed proof decoding.
//!
//! A compressed proof has the form `( l1 l2 ... ) CHARS`. The labels `0..hyp_end` are the
//! mandatory hypotheses of the theorem, followed by the labels in parentheses. `CHARS` encodes a
//! sequence of numbers: `U..Y` are base 5 digits (1-5) that continue a number and `A..T` are
//! base 20 digits (1-20) that end it. `Z` saves the most recently completed subproof so that later
//! numbers past the label list can refer back to it.

use crate::database::Database;
use crate::error::{MmError, Result, VerifyError};
use crate::types::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Code {
  /// A zero-based index into labels, then saved subproofs.
  Index(usize),
  /// `Z`: save the last completed subproof.
  Save,
}

fn malformed(msg: impl Into<String>) -> MmError {
  MmError::verify("", None, VerifyError::MalformedProof(msg.into()))
}

/// Appends the one-based digit `d + 1` in base `base` to `cur`.
fn digit(cur: usize, base: usize, d: u8) -> Result<usize> {
  (cur.checked_mul(base))
    .and_then(|n| n.checked_add(d as usize + 1))
    .ok_or_else(|| malformed("step number out of range"))
}

pub fn decode(chars: &str) -> Result<Vec<Code>> {
  let mut out = vec![];
  let mut cur = 0usize;
  for ch in chars.bytes() {
    match ch {
      b'Z' if cur == 0 => out.push(Code::Save),
      b'A'..=b'T' => {
        out.push(Code::Index(digit(cur, 20, ch - b'A')? - 1));
        cur = 0
      }
      b'U'..=b'Y' => cur = digit(cur, 5, ch - b'U')?,
      b'Z' => return Err(malformed("Z inside a number")),
      _ => return Err(malformed(format!("unexpected character {:?}", ch as char))),
    }
  }
  if cur != 0 {
    return Err(malformed("proof ends inside a number"))
  }
  Ok(out)
}

/// Expand decoded steps into the label sequence they stand for.
///
/// `arity` gives the number of stack entries each label consumes (zero for hypotheses).
pub fn expand(
  codes: &[Code], labels: &[Tok], hyp_end: usize, mut arity: impl FnMut(&Tok) -> Result<usize>,
) -> Result<Vec<Tok>> {
  let label_end = labels.len();
  let mut out: Vec<usize> = vec![];
  let mut subproofs: Vec<Vec<usize>> = vec![];
  let mut prev: Vec<Vec<usize>> = vec![];
  for &code in codes {
    match code {
      Code::Save => {
        let last = prev.last().ok_or_else(|| malformed("Z with no prior subproof"))?;
        subproofs.push(last.clone())
      }
      Code::Index(i) if i < hyp_end => {
        prev.push(vec![i]);
        out.push(i)
      }
      Code::Index(i) if i < label_end => {
        out.push(i);
        let n = arity(&labels[i])?;
        if n > prev.len() {
          return Err(malformed(format!("step {} needs {n} subproofs", labels[i])))
        }
        let mut pf = prev.drain(prev.len() - n..).flatten().collect::<Vec<_>>();
        pf.push(i);
        prev.push(pf)
      }
      Code::Index(i) => {
        let pf = subproofs
          .get(i - label_end)
          .ok_or_else(|| malformed(format!("reference to unsaved subproof {}", i - label_end)))?;
        out.extend_from_slice(pf);
        prev.push(pf.clone())
      }
    }
  }
  Ok(out.into_iter().map(|i| labels[i].clone()).collect())
}

/// Splits a raw compressed proof `( labels ) chars` into its label list and character string.
/// Returns `None` if the proof is not compressed.
pub fn split_compressed(proof: &[Tok]) -> Result<Option<(&[Tok], String)>> {
  if proof.first().map(|t| &**t) != Some("(") {
    return Ok(None)
  }
  let end = (proof.iter().position(|t| &**t == ")"))
    .ok_or_else(|| malformed("compressed proof without closing parenthesis"))?;
  Ok(Some((&proof[1..end], proof[end + 1..].concat())))
}

impl Database {
  /// Turns the proof of a `$p` with frame `a` into a plain label sequence, decompressing it
  /// if needed. Must be called while the theorem's scope is still open.
  pub fn decompress(&self, a: &Assertion, proof: &[Tok]) -> Result<Vec<Tok>> {
    let Some((local, chars)) = split_compressed(proof)? else { return Ok(proof.to_vec()) };
    let mut labels = Vec::with_capacity(a.arity() + local.len());
    for (_, v) in &a.floating {
      labels.push(self.frames.lookup_floating(v)?.clone())
    }
    for e in &a.essential {
      labels.push(self.frames.lookup_essential(e)?.clone())
    }
    let hyp_end = labels.len();
    labels.extend_from_slice(local);
    let codes = decode(&chars)?;
    expand(&codes, &labels, hyp_end, |l| {
      Ok(self.get_label(l)?.assertion().map_or(0, |a| a.arity()))
    })
  }
}
