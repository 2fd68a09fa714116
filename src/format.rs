use crate::proof::{grow, ProofNode, Step};
use crate::types::fmt_expr;
use pretty::{Arena, DocAllocator, DocBuilder};

struct Pretty<'a> {
  arena: &'a Arena<'a>,
}

impl Pretty<'_> {
  fn with<R>(f: impl for<'b> FnOnce(&'b Pretty<'b>) -> R) -> R {
    let arena = Arena::new();
    f(&Pretty { arena: &arena })
  }
}

impl<'a> std::ops::Deref for Pretty<'a> {
  type Target = &'a Arena<'a>;
  fn deref(&self) -> &Self::Target { &self.arena }
}

type Doc<'a> = DocBuilder<'a, Arena<'a>>;

impl<'a> Pretty<'a> {
  /// The label of a step, `?`-prefixed for placeholders and `*`-suffixed if substituted.
  fn label(&self, n: &ProofNode) -> Doc<'a> {
    let mark = if n.subst { "*" } else { "" };
    match n.step {
      Step::Special => self.text(format!("?{}{mark}", n.label)),
      _ => self.text(format!("{}{mark}", n.label)),
    }
  }

  fn node(&self, n: &ProofNode) -> Doc<'a> {
    if n.is_leaf() {
      return self.label(n)
    }
    let children = n.children().map(|c| grow(|| self.node(c)));
    let args = self.line().append(self.intersperse(children, self.line()));
    self.label(n).append(args).nest(2).group().parens()
  }
}

/// Prints the statement, then the tree as nested `(label children...)` groups.
impl std::fmt::Display for ProofNode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let head = match &self.name {
      Some(name) => format!("{name}: {}", fmt_expr(&self.expr)),
      None => fmt_expr(&self.expr),
    };
    Pretty::with(|p| p.text(head).append(p.hardline()).append(p.node(self)).render_fmt(100, f))
  }
}

#[cfg(test)]
mod tests {
  use crate::proof::ProofNode;
  use crate::types::*;

  #[test]
  fn short_trees_fit_on_one_line() {
    let mut wps = ProofNode::leaf(tok("wps"), Kind::Floating, expr_of("wff ps"));
    wps.subst = true;
    let wph = ProofNode::leaf(tok("wph"), Kind::Floating, expr_of("wff ph"));
    let e = expr_of("wff ( ph -> ps )");
    let mut t = ProofNode::assert(tok("wi"), Kind::Axiom, e, vec![wph, wps], vec![]);
    t.name = Some("th".into());
    assert_eq!(t.to_string(), "th: wff ( ph -> ps )\n(wi wph wps*)");
  }
}
