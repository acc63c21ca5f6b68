use std::{
   str::Chars,
   sync::Arc,
};

use bass_runtime::{
   Annotate,
   Error,
   Position,
   Range,
   Result,
   Value,
};
use peekmore::{
   PeekMore as _,
   PeekMoreIterator as PeekMore,
};

use crate::token;

enum Item {
   Form(Annotate),
   Close(char, Position),
}

/// Reads forms one at a time out of a source file.
///
/// Every form is yielded as a [`Value::Annotate`] carrying its range, any
/// comment preceding it (or trailing it on the same line) and any `^meta`
/// binds. Nested forms are annotated the same way.
pub struct Reader<'a> {
   file:     Arc<str>,
   chars:    PeekMore<Chars<'a>>,
   position: Position,
}

impl<'a> Reader<'a> {
   #[must_use]
   pub fn new(file: &str, source: &'a str) -> Self {
      Self {
         file:     Arc::from(file),
         chars:    source.chars().peekmore(),
         position: Position { line: 1, column: 1 },
      }
   }

   fn error(&self, position: Position, cause: impl Into<String>) -> Error {
      Error::Read {
         file: self.file.clone(),
         position,
         cause: cause.into(),
      }
   }

   fn peek(&mut self) -> Option<char> {
      self.chars.peek().copied()
   }

   fn peek_second(&mut self) -> Option<char> {
      self.chars.peek_nth(1).copied()
   }

   fn advance(&mut self) -> Option<char> {
      let c = self.chars.next()?;

      if c == '\n' {
         self.position.line += 1;
         self.position.column = 1;
      } else {
         self.position.column += 1;
      }

      Some(c)
   }

   fn skip_line(&mut self) {
      while let Some(c) = self.advance() {
         if c == '\n' {
            break;
         }
      }
   }

   fn skip_line_spaces(&mut self) {
      while self.peek().is_some_and(|c| c == ' ' || c == '\t') {
         self.advance();
      }
   }

   fn skip_space(&mut self) {
      loop {
         match self.peek() {
            Some(c) if token::is_space(c) => {
               self.advance();
            },

            // `#!` and `# ` lines, as in Dockerfile frontend directives.
            Some('#') if matches!(self.peek_second(), Some('!' | ' ')) => self.skip_line(),

            _ => break,
         }
      }
   }

   fn read_item(&mut self) -> Result<Option<Item>> {
      self.skip_space();

      let start = self.position;
      let Some(c) = self.peek() else {
         return Ok(None);
      };

      let form = match c {
         ')' | ']' | '}' => {
            self.advance();
            return Ok(Some(Item::Close(c, start)));
         },

         ';' => {
            match self.read_commented()? {
               Some(form) => form,
               None => return self.read_item(),
            }
         },

         '^' => {
            self.advance();
            self.read_meta()?
         },

         _ => {
            let value = self.read_value(start)?;

            let mut form = Annotate::new(value, Range {
               file: self.file.clone(),
               start,
               end: self.position,
            });
            form.comment = self.read_trailing_comment().map(Arc::from);

            form
         },
      };

      Ok(Some(Item::Form(form)))
   }

   /// Reads a form that must be there, as after `^`.
   fn expect_form(&mut self, context: &str) -> Result<Annotate> {
      match self.read_item()? {
         Some(Item::Form(form)) => Ok(form),
         Some(Item::Close(c, position)) => {
            Err(self.error(position, format!("expected a form after {context}, found {c:?}")))
         },
         None => Err(self.error(self.position, format!("expected a form after {context}"))),
      }
   }

   fn read_comment_line(&mut self) -> String {
      while self.peek() == Some(';') {
         self.advance();
      }

      self.skip_line_spaces();

      let mut line = String::new();
      while let Some(c) = self.advance() {
         if c == '\n' {
            break;
         }

         line.push(c);
      }

      line.truncate(line.trim_end().len());
      line
   }

   /// Reads a block of `;` lines and the form they document. Blank comment
   /// lines separate paragraphs.
   ///
   /// Returns [`None`] if no form follows the comment before the end of the
   /// enclosing form or file, in which case the comment is discarded.
   fn read_commented(&mut self) -> Result<Option<Annotate>> {
      let mut paragraphs = Vec::new();
      let mut paragraph = Vec::new();

      loop {
         let line = self.read_comment_line();

         if line.is_empty() {
            if !paragraph.is_empty() {
               paragraphs.push(paragraph.join(" "));
               paragraph.clear();
            }
         } else {
            paragraph.push(line);
         }

         self.skip_line_spaces();
         if self.peek() != Some(';') {
            break;
         }
      }

      if !paragraph.is_empty() {
         paragraphs.push(paragraph.join(" "));
      }

      self.skip_space();
      if matches!(self.peek(), None | Some(')' | ']' | '}')) {
         return Ok(None);
      }

      let mut form = self.expect_form("a comment")?;
      if !paragraphs.is_empty() {
         form.comment = Some(Arc::from(paragraphs.join("\n\n")));
      }

      Ok(Some(form))
   }

   fn read_trailing_comment(&mut self) -> Option<String> {
      self.skip_line_spaces();

      (self.peek() == Some(';')).then(|| self.read_comment_line())
   }

   /// Reads `^meta form`, prepending any meta the form already carries.
   fn read_meta(&mut self) -> Result<Annotate> {
      let meta = self.expect_form("^")?;
      let mut form = self.expect_form("^")?;

      let binds = match meta.value {
         Value::Bind(ref binds) => binds.to_vec(),
         Value::Keyword(ref keyword) => vec![Value::Keyword(keyword.clone()), Value::Bool(true)],
         Value::Symbol(_) | Value::String(_) => vec![Value::keyword("tag"), meta.value.clone()],

         ref other => {
            return Err(self.error(
               meta.range.start,
               format!("meta (^): given {other}, need a bind, keyword, symbol or string"),
            ));
         },
      };

      form.meta = Some(match form.meta.take() {
         Some(existing) => existing.iter().cloned().chain(binds).collect(),
         None => Arc::from(binds),
      });

      Ok(form)
   }

   fn read_value(&mut self, start: Position) -> Result<Value> {
      match self.peek() {
         Some('(') => {
            self.advance();
            self.read_list(start, ')', Value::pair)
         },

         Some('[') => {
            self.advance();
            self.read_list(start, ']', Value::cons)
         },

         Some('{') => {
            self.advance();

            let binds = self
               .read_elements(start, '}')?
               .into_iter()
               .map(|form| Value::Annotate(Arc::new(form)))
               .collect();

            Ok(Value::Bind(binds))
         },

         Some('"') => {
            self.advance();
            self.read_string(start).map(Value::string)
         },

         _ => self.read_atom(start),
      }
   }

   fn read_elements(&mut self, open: Position, close: char) -> Result<Vec<Annotate>> {
      let mut elements = Vec::new();

      loop {
         match self.read_item()? {
            Some(Item::Form(form)) => elements.push(form),

            Some(Item::Close(c, _)) if c == close => return Ok(elements),

            Some(Item::Close(c, position)) => {
               return Err(self.error(position, format!("expected {close:?}, found {c:?}")));
            },

            None => return Err(self.error(open, format!("unexpected end of file, expected {close:?}"))),
         }
      }
   }

   /// Reads the elements of a list up to `close`, with an optional `& tail`.
   fn read_list(&mut self, open: Position, close: char, cell: fn(Value, Value) -> Value) -> Result<Value> {
      let mut elements = self.read_elements(open, close)?;

      let delimiter = elements.iter().position(|form| {
         matches!(form.value, Value::Symbol(ref symbol) if symbol.as_str() == token::PAIR_DELIMITER)
      });

      let tail = match delimiter {
         Some(index) => {
            let position = elements[index].range.start;

            let rest = elements.split_off(index);
            let [_, tail] = <[Annotate; 2]>::try_from(rest).map_err(|_| {
               self.error(
                  position,
                  format!("expected exactly one form after {}", token::PAIR_DELIMITER),
               )
            })?;

            Value::Annotate(Arc::new(tail))
         },

         None => Value::Empty,
      };

      Ok(elements
         .into_iter()
         .rev()
         .fold(tail, |rest, form| cell(Value::Annotate(Arc::new(form)), rest)))
   }

   fn read_string(&mut self, open: Position) -> Result<String> {
      let mut string = String::new();

      loop {
         let position = self.position;

         match self.advance() {
            None => return Err(self.error(open, "unterminated string")),

            Some('"') => return Ok(string),

            Some('\\') => {
               let Some(escaped) = self.advance() else {
                  return Err(self.error(open, "unterminated string"));
               };

               let unescaped = token::unescape(escaped).ok_or_else(|| {
                  self.error(position, format!("illegal escape sequence '\\{escaped}'"))
               })?;

               string.push(unescaped);
            },

            Some(c) => string.push(c),
         }
      }
   }

   fn read_atom(&mut self, start: Position) -> Result<Value> {
      let mut atom = String::new();

      while let Some(c) = self.peek()
         && !token::is_space(c)
         && !token::is_delimiter(c)
      {
         atom.push(c);
         self.advance();
      }

      token::atom(&atom).map_err(|cause| self.error(start, cause))
   }
}

impl Iterator for Reader<'_> {
   type Item = Result<Value>;

   fn next(&mut self) -> Option<Self::Item> {
      match self.read_item() {
         Ok(Some(Item::Form(form))) => Some(Ok(Value::Annotate(Arc::new(form)))),

         Ok(Some(Item::Close(c, position))) => {
            Some(Err(self.error(position, format!("unmatched delimiter {c:?}"))))
         },

         Ok(None) => None,

         Err(error) => Some(Err(error)),
      }
   }
}

/// Reads every form in a source file, stopping at the first error.
pub fn read(file: &str, source: &str) -> Result<Vec<Value>> {
   Reader::new(file, source).collect()
}
