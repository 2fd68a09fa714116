use crate::error::{Loc, MmError, Result};
use crate::types::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct SourceFile {
  pub path: PathBuf,
  text: Vec<u8>,
}

impl SourceFile {
  fn position(&self, offset: usize) -> Position {
    let before = &self.text[..offset.min(self.text.len())];
    let line = bytecount::count(before, b'\n') + 1;
    let col = before.iter().rev().take_while(|&&c| c != b'\n').count() + 1;
    Position { line: line as u32, col: col as u32 }
  }
}

#[derive(Copy, Clone)]
struct Cursor {
  file: FileId,
  offset: usize,
}

/// A whitespace-delimited token reader over a stack of included files.
pub struct Tokens {
  pub files: IdxVec<FileId, SourceFile>,
  stack: Vec<Cursor>,
  opened: HashSet<PathBuf>,
  /// Where the most recently returned token starts.
  last: Option<Cursor>,
}

fn canonical(path: &Path) -> PathBuf { path.canonicalize().unwrap_or_else(|_| path.to_owned()) }

impl Tokens {
  pub fn from_file(path: &Path) -> Result<Self> {
    let mut toks = Tokens::new();
    toks.open(path)?;
    Ok(toks)
  }

  pub fn from_str(name: &str, text: &str) -> Self {
    let mut toks = Tokens::new();
    let file = toks.files.push(SourceFile { path: name.into(), text: text.as_bytes().to_vec() });
    toks.stack.push(Cursor { file, offset: 0 });
    toks
  }

  fn new() -> Self {
    Tokens { files: IdxVec::new(), stack: vec![], opened: HashSet::new(), last: None }
  }

  fn open(&mut self, path: &Path) -> Result<()> {
    let path = canonical(path);
    if self.opened.insert(path.clone()) {
      let text = std::fs::read(&path).map_err(|e| MmError::Io(path.clone(), e))?;
      vprintln!("opened {}", path.display());
      let file = self.files.push(SourceFile { path, text });
      self.stack.push(Cursor { file, offset: 0 })
    }
    Ok(())
  }

  /// The location of the last token read, for error reporting.
  pub fn loc(&self) -> Option<Loc> {
    let c = self.last?;
    let file = &self.files[c.file];
    Some(Loc { file: file.path.clone(), pos: file.position(c.offset) })
  }

  pub fn syntax(&self, msg: impl Into<String>) -> MmError {
    let e = MmError::Syntax(msg.into());
    match self.loc() {
      Some(loc) => e.at(loc),
      None => e,
    }
  }

  /// Reads one raw token, popping exhausted files. Tokens must be valid UTF-8.
  fn read_raw(&mut self) -> Result<Option<Tok>> {
    let (file, start, end) = loop {
      let Some(cur) = self.stack.last_mut() else { return Ok(None) };
      let text = &self.files[cur.file].text;
      let mut i = cur.offset;
      while i < text.len() && text[i].is_ascii_whitespace() {
        i += 1
      }
      if i == text.len() {
        self.stack.pop();
        continue
      }
      let start = i;
      while i < text.len() && !text[i].is_ascii_whitespace() {
        i += 1
      }
      cur.offset = i;
      break (cur.file, start, i)
    };
    self.last = Some(Cursor { file, offset: start });
    match std::str::from_utf8(&self.files[file].text[start..end]) {
      Ok(t) => Ok(Some(t.into())),
      Err(_) => Err(self.syntax("invalid UTF-8 in token")),
    }
  }

  /// Reads a token, transparently entering `$[ file $]` inclusions.
  fn read_includes(&mut self) -> Result<Option<Tok>> {
    loop {
      match self.read_raw()? {
        Some(t) if &*t == "$[" => {
          let Some(name) = self.read_raw()? else { return Err(self.syntax("EOF in inclusion")) };
          if self.read_raw()?.as_deref() != Some("$]") {
            return Err(self.syntax("inclusion command not terminated"))
          }
          let base = self.last.and_then(|c| self.files[c.file].path.parent().map(Path::to_owned));
          let path = match base {
            Some(dir) => dir.join(&*name),
            None => PathBuf::from(&*name),
          };
          self.open(&path)?
        }
        t => return Ok(t),
      }
    }
  }

  /// Reads the next token outside of comments, or `None` at end of input.
  pub fn read(&mut self) -> Result<Option<Tok>> {
    loop {
      match self.read_includes()? {
        Some(t) if &*t == "$(" => loop {
          match self.read_raw()? {
            None => return Err(self.syntax("EOF in comment")),
            Some(t) if &*t == "$)" => break,
            Some(_) => {}
          }
        },
        t => return Ok(t),
      }
    }
  }

  /// Reads the tokens of a statement, up to and excluding `$.`.
  pub fn read_statement(&mut self) -> Result<Vec<Tok>> {
    let mut stat = vec![];
    loop {
      match self.read()? {
        None => return Err(self.syntax("EOF before $.")),
        Some(t) if &*t == "$." => return Ok(stat),
        Some(t) => stat.push(t),
      }
    }
  }
}
