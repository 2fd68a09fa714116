use super::common::*;
use crate::error::{MmError, VerifyError};
use crate::types::*;
use crate::verify::{Checked, DisjointCheck, Mode};
use crate::Config;

fn read_error(text: &str) -> MmError {
  match try_load(Config::default(), text) {
    Ok(_) => panic!("expected a reading error"),
    Err(e) => unlocated(e),
  }
}

fn verify_error(db: &crate::database::Database, stat: &str, proof: &str) -> VerifyError {
  match db.prove(&expr_of(stat), &expr_of(proof), "t", DisjointCheck::Scoped) {
    Ok(_) => panic!("expected {proof} to be rejected"),
    Err(MmError::Verify(f)) => f.kind,
    Err(e) => panic!("unexpected error {e}"),
  }
}

#[test]
fn reads_and_verifies() {
  let db = load(PROP);
  assert_eq!(db.failures, 0);
  assert_eq!(db.counts[Kind::Floating], 3);
  assert_eq!(db.counts[Kind::Essential], 4);
  assert_eq!(db.counts[Kind::Axiom], 3);
  assert_eq!(db.counts[Kind::Theorem], 2);
  assert_eq!(db.top_floats, [tok("wph"), tok("wps"), tok("wch")]);
  let a = db.assertion("a12").unwrap();
  let vars = a.floating.iter().map(|(_, v)| v.to_string()).collect::<Vec<_>>();
  assert_eq!(vars, ["ph", "ps", "ch"]);
  assert_eq!(a.essential, [expr_of("|- ch")]);
  let tree = db.proofs["a12"].single().unwrap();
  assert_eq!(tree.name.as_deref(), Some("a12"));
  assert_eq!(tree.summarize(), expr_of("wps wch wi wph wch wps a12.1 a1i a1i"));
  assert_eq!(tree.count(), 9);
  assert_eq!(tree.count_theorem_steps(), 2);
  assert_eq!(tree.hyps()[0].expr, expr_of("|- ( ps -> ch )"));
}

#[test]
fn compressed_proofs() {
  let proof = "( wi ax-1 ax-mp ) ABADCABEF";
  let text = format!("{PROP} ${{ c.1 $e |- ph $. c $p |- ( ps -> ph ) $= {proof} $. $}}");
  let db = load(&text);
  assert_eq!(db.failures, 0);
  let tree = db.proofs["c"].single().unwrap();
  assert_eq!(tree.summarize(), expr_of("wph wps wph wi c.1 wph wps ax-1 ax-mp"));
}

#[test]
fn malformed_compressed_proof_is_a_failure() {
  let proof = "( wi ax-1 ax-mp ) ABADCABEU";
  let text = format!("{PROP} ${{ c.1 $e |- ph $. c $p |- ( ps -> ph ) $= {proof} $. $}}");
  let db = load(&text);
  assert_eq!(db.failures, 1);
  assert!(!db.proofs.contains_key("c"));
  assert!(db.labels.contains_key("c"));
}

#[test]
fn disjointness_modes() {
  let text = [
    PROP,
    DISJOINT,
    "${ $d ph ps $. dj1 $p |- ( ph -> ps ) $= wph wps ax-d $. $}
     dj2 $p |- ( ps -> ph ) $= wps wph ax-d $.
     dj3 $p |- ( ph -> ph ) $= wph wph ax-d $.",
  ]
  .concat();
  let db = load(&text);
  assert_eq!(db.failures, 2);
  assert!(db.proofs.contains_key("dj1"));
  assert!(!db.proofs.contains_key("dj2"));
  let overlap = Config { theorem_disjoint: DisjointCheck::Overlap, ..Config::default() };
  assert_eq!(try_load(overlap, &text).unwrap().failures, 1);
  let off = Config { theorem_disjoint: DisjointCheck::Off, ..Config::default() };
  assert_eq!(try_load(off, &text).unwrap().failures, 0);

  let (stat, proof) = (expr_of("|- ( ph -> ph )"), expr_of("wph wph ax-d"));
  let kind = match db.prove(&stat, &proof, "x", DisjointCheck::Overlap) {
    Err(MmError::Verify(f)) => f.kind,
    _ => panic!("expected a disjointness violation"),
  };
  assert_eq!(kind, VerifyError::DisjointViolation(tok("ph"), tok("ph")));
}

#[test]
fn stack_machine_failures() {
  let db = load(PROP);
  let underflow = VerifyError::StackUnderflow { needed: 4, available: 1 };
  assert_eq!(verify_error(&db, "|- ps", "wph ax-mp"), underflow);
  assert!(matches!(
    verify_error(&db, "|- ps", "wph wps wph wps ax-1 wph wps ax-1 ax-mp"),
    VerifyError::HypothesisMismatch { .. }
  ));
  let e = verify_error(&db, "|- ph", "a1i.1 wps ax-1");
  assert!(matches!(e, VerifyError::TypeMismatch { .. }));
  assert_eq!(verify_error(&db, "wff ph", "wph wps"), VerifyError::StackNotSingleton(2));
  assert!(matches!(
    verify_error(&db, "|- ps", "wph wps ax-1"),
    VerifyError::ConclusionMismatch { .. }
  ));
}

#[test]
fn probe_mode() {
  let db = load(PROP);
  let probe = |stat: &str, proof: &str| {
    db.verify(&expr_of(stat), &expr_of(proof), "", Mode::Probe, DisjointCheck::Scoped)
  };
  match probe("|- ps", "wph wps ax-1").unwrap() {
    Checked::Invalid(Some(p)) => assert_eq!(p.expr, expr_of("|- ( ph -> ( ps -> ph ) )")),
    r => panic!("unexpected {r:?}"),
  }
  assert!(matches!(probe("|- ps", "wph ax-mp").unwrap(), Checked::Invalid(None)));
  let p = probe("wff ( ph -> ps )", "wph wps wi").unwrap().valid().unwrap();
  assert_eq!(p.name, None);
  assert!(matches!(probe("|- ps", "wph nope"), Err(MmError::KeyNotFound(_))));
}

#[test]
fn reading_errors() {
  assert!(matches!(read_error("$c a $. $}"), MmError::Syntax(_)));
  assert!(matches!(read_error("${ $c a $."), MmError::Syntax(_)));
  assert!(matches!(read_error("$c wff $. $a wff $."), MmError::Syntax(_)));
  assert!(matches!(read_error("$c a $. $c a $."), MmError::Redeclaration { .. }));
  let e = read_error(&[PROP, "wph $f wff ch $."].concat());
  assert!(matches!(e, MmError::Redeclaration { what: "label", .. }));
  let e = read_error(&[PROP, "x $a |- foo $."].concat());
  assert!(matches!(e, MmError::Undeclared { what: "math symbol", .. }));
  assert!(matches!(read_error(&[PROP, "t $p |- ph $."].concat()), MmError::Syntax(_)));
  assert!(matches!(read_error(&[PROP, "t $p |- ph $= t $."].concat()), MmError::KeyNotFound(_)));
  assert!(matches!(read_error("$c wff $. $v x $. $d x y $."), MmError::Undeclared { .. }));
  assert!(matches!(read_error("$c wff $. $v x $. wx $f wff x y $."), MmError::Syntax(_)));
}

#[test]
fn failing_proofs_stop_the_reader_on_request() {
  let cfg = Config { panic_on_fail: true, ..Config::default() };
  let e = try_load(cfg, &[PROP, "t $p |- ph $= wph $."].concat()).map(|_| ()).unwrap_err();
  assert!(matches!(e.verify_kind(), Some(VerifyError::ConclusionMismatch { .. })));
}

#[test]
fn includes_are_read_once() {
  let dir = scratch("include");
  std::fs::write(dir.join("base.mm"), PROP).unwrap();
  let main = dir.join("main.mm");
  let text = "$[ base.mm $] $[ base.mm $] t $p wff ( ph -> ps ) $= wph wps wi $.";
  std::fs::write(&main, text).unwrap();
  let mut db = crate::database::Database::new(Config::default());
  db.read_file(&main).unwrap();
  assert_eq!(db.failures, 0);
  assert_eq!(db.counts[Kind::Theorem], 3);
  assert_eq!(db.source.as_deref(), Some(main.as_path()));
}
