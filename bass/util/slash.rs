//! Lexical operations on slash-separated paths.
//!
//! These never touch a filesystem. They mirror the semantics container
//! runtimes expect for paths inside an image, independent of the host
//! platform's separator.

/// Returns the shortest path name equivalent to `path` by purely lexical
/// processing: repeated slashes collapse, `.` elements drop, and `..`
/// elements eat the element before them where possible.
///
/// An empty result becomes `"."`.
#[must_use]
pub fn clean(path: &str) -> String {
   if path.is_empty() {
      return ".".to_owned();
   }

   let rooted = path.starts_with('/');

   let mut parts: Vec<&str> = Vec::new();
   for part in path.split('/') {
      match part {
         "" | "." => {},

         ".." => {
            match parts.last() {
               Some(&last) if last != ".." => {
                  parts.pop();
               },
               // `/..` is `/`.
               _ if rooted => {},
               _ => parts.push(".."),
            }
         },

         part => parts.push(part),
      }
   }

   let joined = parts.join("/");

   match (rooted, joined.is_empty()) {
      (true, _) => format!("/{joined}"),
      (false, true) => ".".to_owned(),
      (false, false) => joined,
   }
}

/// Returns all but the last element of `path`, cleaned. Trailing slashes
/// are part of the last element, so `"a/b/"` yields `"a/b"`.
#[must_use]
pub fn dirname(path: &str) -> String {
   match path.rfind('/') {
      Some(index) => clean(&path[..=index]),
      None => ".".to_owned(),
   }
}

/// Returns the last element of `path`, ignoring trailing slashes.
#[must_use]
pub fn basename(path: &str) -> String {
   let trimmed = path.trim_end_matches('/');

   if trimmed.is_empty() {
      return if path.is_empty() { "." } else { "/" }.to_owned();
   }

   match trimmed.rfind('/') {
      Some(index) => trimmed[index + 1..].to_owned(),
      None => trimmed.to_owned(),
   }
}

/// Joins the elements with a slash and cleans the result. Empty elements are
/// skipped.
#[must_use]
pub fn join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
   let joined = parts
      .into_iter()
      .filter(|part| !part.is_empty())
      .collect::<Vec<_>>()
      .join("/");

   if joined.is_empty() {
      return String::new();
   }

   clean(&joined)
}

/// Whether the path is explicit about where it is relative to.
#[must_use]
pub fn is_explicit(path: &str) -> bool {
   path.starts_with('/') || path.starts_with("./") || path.starts_with("../")
}

/// Prefixes `./` onto paths that are not already explicit.
#[must_use]
pub fn clarify(path: &str) -> String {
   if is_explicit(path) {
      path.to_owned()
   } else {
      format!("./{path}")
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn cleaning() {
      assert_eq!(clean(""), ".");
      assert_eq!(clean("."), ".");
      assert_eq!(clean("./"), ".");
      assert_eq!(clean("a//b/./c/"), "a/b/c");
      assert_eq!(clean("a/b/../c"), "a/c");
      assert_eq!(clean("../a/.."), "..");
      assert_eq!(clean("../../x"), "../../x");
      assert_eq!(clean("/../a"), "/a");
      assert_eq!(clean("/"), "/");
   }

   #[test]
   fn dirnames() {
      assert_eq!(dirname("./abc/sub/"), "abc/sub");
      assert_eq!(dirname("abc/sub"), "abc");
      assert_eq!(dirname("abc"), ".");
      assert_eq!(dirname("/abc"), "/");
   }

   #[test]
   fn basenames() {
      assert_eq!(basename("a/b/"), "b");
      assert_eq!(basename("file"), "file");
      assert_eq!(basename("/"), "/");
      assert_eq!(basename(""), ".");
   }

   #[test]
   fn joining() {
      assert_eq!(join(["..", "./h/pkg/"]), "../h/pkg");
      assert_eq!(join(["a", "", "b"]), "a/b");
      assert_eq!(join(["a", "/b"]), "a/b");
   }

   #[test]
   fn clarifying() {
      assert_eq!(clarify("foo/"), "./foo/");
      assert_eq!(clarify("../foo"), "../foo");
      assert_eq!(clarify("/foo"), "/foo");
   }
}
