use super::common::*;
use crate::database::Database;
use crate::export::{Filter, Summary, Vocabulary};
use crate::proof::{ProofNode, Propagation};
use crate::types::*;
use crate::Config;

/// `ax-dum` lets `dum` go through the dummy variable `ch`, which clashes with the argument
/// `usedum` passes to it.
const DUMMY: &str = "
${
  ax-dum.1 $e |- ( ch -> ph ) $.
  ax-dum $a |- ph $.
$}
${
  dum.1 $e |- ph $.
  dum $p |- ph $= wph wch wph wch dum.1 a1i ax-dum $.
$}
${
  usedum.1 $e |- ( ch -> ch ) $.
  usedum $p |- ( ch -> ch ) $= wch wch wi usedum.1 dum $.
$}
";

fn flags(p: &ProofNode) -> Vec<bool> { p.preorder().iter().map(|n| n.subst).collect() }

#[test]
fn every_theorem_step_gives_a_variant() {
  let db = try_load(expanding(), PROP).unwrap();
  assert!(!db.proofs.contains_key("expand_ax-mp_in_a1i"));
  let variants = db.proofs["expand_a1i_in_a12"].trees();
  assert_eq!(variants.len(), 2);
  let inner = &variants[0];
  assert_eq!(inner.name.as_deref(), Some("expand_a1i_in_a12"));
  assert_eq!(inner.expr, expr_of("|- ( ph -> ( ps -> ch ) )"));
  let summary = "wps wch wi wph wch wps wch wi a12.1 wch wps ax-1 ax-mp a1i";
  assert_eq!(inner.summarize(), expr_of(summary));
  // the root gains a substituted child, so it and its direct children are marked too
  let mut expected = vec![true, true, false, false];
  expected.extend([true; 10]);
  assert_eq!(flags(inner), expected);
  assert_eq!(
    variants[1].summarize(),
    expr_of("wps wch wi wph wps wch wi wi wch wps a12.1 a1i wps wch wi wph ax-1 ax-mp")
  );
  assert!(variants[1].subst);
}

#[test]
fn copy_propagation_keeps_flags() {
  let cfg = Config { propagation: Propagation::Copy, ..expanding() };
  let db = try_load(cfg, PROP).unwrap();
  let inner = &db.proofs["expand_a1i_in_a12"].trees()[0];
  let mut expected = vec![false; 5];
  expected.extend([true; 9]);
  assert_eq!(flags(inner), expected);
}

#[test]
fn expansion_limits() {
  let cfg = Config { threshold: Some(1), ..expanding() };
  assert_eq!(try_load(cfg, PROP).unwrap().proofs["expand_a1i_in_a12"].trees().len(), 1);

  let cfg = Config { exclude: vec!["a1i".into()], ..expanding() };
  assert!(!try_load(cfg, PROP).unwrap().proofs.contains_key("expand_a1i_in_a12"));

  let cfg = Config { expand_max_len: Some(8), ..expanding() };
  let db = try_load(cfg, PROP).unwrap();
  assert_eq!(db.variants().count(), 0);

  assert_eq!(load(PROP).variants().count(), 0);
}

#[test]
fn clashing_dummy_variables_are_renamed() {
  let db = try_load(expanding(), &[PROP, DUMMY].concat()).unwrap();
  assert_eq!(db.failures, 0);
  let variant = &db.proofs["expand_dum_in_usedum"].trees()[0];
  assert_eq!(
    variant.summarize(),
    expr_of("wch wch wi sub0 wch wch wi sub0 usedum.1 a1i ax-dum")
  );
  assert_eq!(db.labels["sub0"], LabelData::Hyp(Kind::Floating, expr_of("wff sub0")));
  assert!(db.variables.contains("sub0"));
}

#[test]
fn dataset_export() {
  let db = try_load(expanding(), PROP).unwrap();
  let mut vocab = Vocabulary::default();
  let dataset = db.export_dataset(&mut vocab, Filter::default()).unwrap();
  let names: Vec<_> = dataset.iter().map(|g| g.name.as_str()).collect();
  assert_eq!(names, ["expand_a1i_in_a12_variant_0", "expand_a1i_in_a12_variant_1"]);
  assert_eq!(dataset[0].nodes.len(), 14);
  assert_eq!(dataset[0].source.len(), 13);
  let unexpanded = db.export_unexpanded(&mut vocab).unwrap();
  assert_eq!(unexpanded.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(), ["a1i", "a12"]);
  assert!(unexpanded[1].nodes.0.iter().all(|n| n.2 == 0));

  let small = Filter { max_nodes: Some(14), ..Filter::default() };
  assert_eq!(db.export_dataset(&mut vocab, small).unwrap().len(), 1);
  let capped = Filter { max_per_theorem: Some(1), ..Filter::default() };
  let names = db.export_dataset(&mut vocab, capped).unwrap().into_iter().map(|g| g.name);
  assert_eq!(names.collect::<Vec<_>>(), ["expand_a1i_in_a12_variant_0"]);
  let none = Filter { max_per_theorem: Some(0), ..Filter::default() };
  assert!(db.export_dataset(&mut vocab, none).unwrap().is_empty());

  let tree = db.dataset_tree("expand_a1i_in_a12_variant_1").unwrap();
  assert_eq!(tree, &db.proofs["expand_a1i_in_a12"].trees()[1]);
  assert!(db.dataset_tree("a12").is_some());
  assert!(db.dataset_tree("expand_a1i_in_a12_variant_2").is_none());
  assert!(db.dataset_tree("nope").is_none());

  let summaries = db.summaries();
  let a1i = expr_of("wph wps wph wi a1i.1 wph wps ax-1 ax-mp");
  assert_eq!(summaries["a1i"], Summary::Single(a1i));
  assert!(matches!(&summaries["expand_a1i_in_a12"], Summary::Variants(v) if v.len() == 2));
}

#[test]
fn snapshot_round_trip() {
  let db = try_load(expanding(), &[PROP, DUMMY].concat()).unwrap();
  let path = scratch("snapshot").join("snapshot.json");
  db.save(&path).unwrap();
  let back = Database::load(Config::default(), &path).unwrap();
  assert_eq!(back.labels, db.labels);
  assert_eq!(back.top_floats, db.top_floats);
  assert_eq!(back.variables, db.variables);
  assert_eq!(back.proofs.len(), db.proofs.len());
  for ((k1, e1), (k2, e2)) in back.proofs.iter().zip(&db.proofs) {
    assert_eq!(k1, k2);
    assert_eq!(e1.trees(), e2.trees());
  }
}
