//! Classification of the atoms between delimiters.

use bass_runtime::{
   CommandPath,
   DirPath,
   ExtendPath,
   FileOrDir,
   FilePath,
   Symbol,
   Value,
};

/// The symbol separating the last element of a list from its tail.
pub const PAIR_DELIMITER: &str = "&";

/// Whether this character ends an atom and starts another form.
#[must_use]
pub fn is_delimiter(c: char) -> bool {
   matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | '^')
}

#[must_use]
pub fn is_space(c: char) -> bool {
   c.is_whitespace() || c == ','
}

#[must_use]
pub fn unescape(c: char) -> Option<char> {
   Some(match c {
      'a' => '\x07', // Bell.
      'b' => '\x08', // Backspace.
      't' => '\x09', // Horizontal tab.
      'n' => '\x0A', // New line.
      'v' => '\x0B', // Vertical tab.
      'f' => '\x0C', // Form feed.
      'r' => '\x0D', // Carriage return.
      '"' => '"',
      '\\' => '\\',

      _ => return None,
   })
}

/// Parses an integer literal, with an optional sign and an optional `0x`,
/// `0o` or `0b` radix prefix. Underscores are ignored.
#[must_use]
pub fn parse_int(token: &str) -> Option<i64> {
   let (sign, unsigned) = match token.strip_prefix('-') {
      Some(rest) => ("-", rest),
      None => ("", token.strip_prefix('+').unwrap_or(token)),
   };

   let (radix, digits) = match unsigned.get(..2) {
      Some("0x" | "0X") => (16, &unsigned[2..]),
      Some("0o" | "0O") => (8, &unsigned[2..]),
      Some("0b" | "0B") => (2, &unsigned[2..]),
      _ => (10, unsigned),
   };

   let digits = digits.replace('_', "");
   if digits.is_empty() || digits.starts_with(['+', '-']) {
      return None;
   }

   i64::from_str_radix(&format!("{sign}{digits}"), radix).ok()
}

/// Whether the atom should be read as a number.
#[must_use]
pub fn is_numeric(token: &str) -> bool {
   let mut chars = token.chars();

   match chars.next() {
      Some('+' | '-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
      Some(c) => c.is_ascii_digit(),
      None => false,
   }
}

/// Reads `foo`, `:foo` and `foo:bar`. Each `:segment` after the first
/// becomes a call of that keyword on what precedes it, so `foo:bar:baz`
/// reads as `(:baz (:bar foo))`.
pub fn keywords_or_symbol(token: &str) -> Result<Value, String> {
   let mut segments = token.split(':');

   let first = segments.next().unwrap_or_default();
   let mut value = if first.is_empty() {
      match segments.next() {
         Some(name) if !name.is_empty() => Value::Keyword(Symbol::new(name)),
         _ => return Err(format!("empty keyword in {token:?}")),
      }
   } else {
      Value::Symbol(Symbol::new(first))
   };

   for segment in segments {
      if segment.is_empty() {
         return Err(format!("empty keyword in {token:?}"));
      }

      value = Value::list([Value::Keyword(Symbol::new(segment)), value]);
   }

   Ok(value)
}

/// Reads an atom containing a `/`.
///
/// Literal roots (`./`, `../`, `/`) read as plain paths. Anything else is
/// an expression to be extended at evaluation, as in `*dir*/src/`.
pub fn path(token: &str) -> Result<Value, String> {
   let segments = token.split('/').collect::<Vec<_>>();

   let root = segments[0];
   if matches!(root, "" | "." | "..") {
      return Ok(FileOrDir::parse(token).to_value());
   }

   let is_dir = segments.last().is_some_and(|last| last.is_empty());
   let children = if is_dir {
      &segments[1..segments.len() - 1]
   } else {
      &segments[1..]
   };

   let mut value = keywords_or_symbol(root)?;

   for (index, &child) in children.iter().enumerate() {
      if child.is_empty() {
         return Err(format!("empty path segment in {token:?}"));
      }

      let child = if index == children.len() - 1 && !is_dir {
         FileOrDir::File(FilePath::new(child))
      } else {
         FileOrDir::Dir(DirPath::new(child))
      };

      value = Value::ExtendPath(std::sync::Arc::new(ExtendPath {
         parent: value,
         child,
      }));
   }

   Ok(value)
}

/// Reads an atom: a number, a constant, a path, a command, a keyword or a
/// symbol.
pub fn atom(token: &str) -> Result<Value, String> {
   if is_numeric(token) {
      return parse_int(token)
         .map(Value::Int)
         .ok_or_else(|| format!("invalid number {token:?}"));
   }

   Ok(match token {
      "_" => Value::Ignore,
      "null" => Value::Null,
      "true" => Value::Bool(true),
      "false" => Value::Bool(false),

      _ if token.contains('/') => return path(token),

      _ if token != "." && token != ".." && token.starts_with('.') => {
         Value::Command(CommandPath::new(&token[1..]))
      },

      _ => return keywords_or_symbol(token),
   })
}
