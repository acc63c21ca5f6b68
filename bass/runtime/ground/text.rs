use std::sync::Arc;

use super::define;
use crate::{
   Builtin,
   Call,
   Combiner,
   CommandPath,
   Cont,
   DirPath,
   Error,
   EvalCtx,
   FileOrDir,
   FilePath,
   Result,
   Scope,
   Step,
   Symbol,
   Value,
   decode::Path,
};

/// `str[start..end]` by characters.
fn substring(string: &str, start: i64, end: Option<i64>) -> Result<String> {
   let len = string.chars().count();
   let out_of_bounds = || {
      Error::message(format!(
         "(substring) range {start}..{end:?} out of bounds for length {len}"
      ))
   };

   let start = usize::try_from(start).map_err(|_| out_of_bounds())?;
   let end = match end {
      Some(end) => usize::try_from(end).map_err(|_| out_of_bounds())?,
      None => len,
   };

   if start > end || end > len {
      return Err(out_of_bounds());
   }

   Ok(string.chars().skip(start).take(end - start).collect())
}

fn path_name(path: &Value) -> Result<String> {
   Ok(match *path.unannotated() {
      Value::Command(ref command) => command.name().to_owned(),
      Value::File(ref file) => file.name(),
      Value::Dir(ref dir) => dir.name(),
      Value::HostPath(ref host) => host.path.name(),
      Value::FsPath(ref fs) => fs.path.name(),
      Value::CachePath(ref cache) => cache.path.name(),
      Value::ThunkPath(ref thunk_path) => thunk_path.path.name(),
      Value::Thunk(ref thunk) => thunk.name(),
      _ => return Err(Error::decode(path, "path")),
   })
}

/// Calls `f` with the accumulator and each binding in turn.
fn reduce_kv(
   ctx: &EvalCtx,
   scope: &Scope,
   f: Value,
   bindings: Arc<[(Symbol, Value)]>,
   index: usize,
   acc: Value,
   cont: Cont,
) -> Step {
   let Some(&(ref symbol, ref value)) = bindings.get(index) else {
      return cont.ok(acc);
   };

   let args = vec![acc, Value::Symbol(symbol.clone()), value.clone()];
   let (next_ctx, next_scope, next_f) = (ctx.clone(), scope.clone(), f.clone());

   f.apply(
      ctx,
      args,
      scope,
      Cont::new(move |acc| {
         reduce_kv(
            &next_ctx,
            &next_scope,
            next_f.clone(),
            bindings.clone(),
            index + 1,
            acc,
            cont.clone(),
         )
      }),
   )
}

pub(super) fn register(ground: &Scope) {
   define(
      ground,
      "str",
      Builtin::func("str", "vals", |_, args| {
         let concatenated = args
            .rest(0)
            .iter()
            .map(|value| {
               match *value.unannotated() {
                  Value::String(ref string) => string.to_string(),
                  ref other => other.to_string(),
               }
            })
            .collect::<String>();

         Ok(Value::string(concatenated))
      }),
      &[
         "returns the concatenation of all given strings or values",
         "=> (str \"abc\" 123 \"def\" 456)",
      ],
   );

   define(
      ground,
      "substring",
      Builtin::func("substring", "[str start & end]", |_, args| {
         if args.len() > 3 {
            return Err(Error::Arity {
               name:     args.name().clone(),
               need:     3,
               have:     args.len(),
               variadic: false,
            });
         }

         let string = args.get::<String>(0)?;
         Ok(Value::string(substring(&string, args.get(1)?, args.opt(2)?)?))
      }),
      &[
         "returns a portion of a string",
         "With one number supplied, returns the portion from the offset to the end.",
         "With two numbers supplied, returns the portion between the first offset and the last offset, exclusive.",
         "=> (substring \"abcdef\" 2 4)",
      ],
   );

   define(
      ground,
      "trim",
      Builtin::func("trim", "[str]", |_, args| Ok(Value::string(args.get::<String>(0)?.trim()))),
      &["removes whitespace from both ends of a string", "=> (trim \" hello world!\\n \")"],
   );

   define(
      ground,
      "symbol->string",
      Builtin::func("symbol->string", "[sym]", |_, args| {
         Ok(Value::string(args.get::<Symbol>(0)?.as_str()))
      }),
      &["convert a symbol to a string", "=> (symbol->string :hello!)"],
   );

   define(
      ground,
      "string->symbol",
      Builtin::func("string->symbol", "[str]", |_, args| {
         Ok(Value::Symbol(Symbol::new(&args.get::<String>(0)?)))
      }),
      &["convert a string to a symbol", "=> (string->symbol \"hello!\")"],
   );

   define(
      ground,
      "scope->list",
      Builtin::func("scope->list", "[obj]", |_, args| {
         let scope = args.get::<Scope>(0)?;

         Ok(Value::list(
            scope
               .bindings()
               .into_iter()
               .flat_map(|(symbol, value)| [Value::Symbol(symbol), value]),
         ))
      }),
      &[
         "returns a flat list alternating a scope's keys and values",
         "The returned list is the same form accepted by (assoc).",
         "=> (scope->list {:a 1 :b 2 :c 3})",
      ],
   );

   define(
      ground,
      "assoc",
      Builtin::func("assoc", "[obj & kvs]", |_, args| {
         let clone = args.get::<Scope>(0)?.copy();

         let kvs = args.rest(1);
         if kvs.len() % 2 != 0 {
            return Err(Error::bad_syntax(format!(
               "(assoc) expects alternating keys and values, got {count}",
               count = kvs.len()
            )));
         }

         for kv in kvs.chunks_exact(2) {
            clone.set(kv[0].decode::<Symbol>()?, kv[1].clone());
         }

         Ok(Value::Scope(clone))
      }),
      &[
         "assoc[iate] keys with values in a clone of a scope",
         "Takes a scope and a flat pair sequence alternating symbols and values.",
         "=> (assoc {:a 1} :b 2 :c 3)",
      ],
   );

   define(
      ground,
      "reduce-kv",
      Builtin::func_cont("reduce-kv", "[f init kv]", |Call { ctx, scope, args, cont }| {
         let f = attempt!(cont, args.get::<Combiner>(0));
         let init = attempt!(cont, args.get::<Value>(1));
         let kv = attempt!(cont, args.get::<Scope>(2));

         reduce_kv(&ctx, &scope, f.0, Arc::from(kv.bindings()), 0, init, cont)
      }),
      &[
         "reduces a scope",
         "Takes a 3-arity function, an initial value, and a scope. If the scope is empty, the initial value is \
          returned. Otherwise, calls the function for each key-value pair, with the current value as the first \
          argument.",
         "=> (reduce-kv assoc {:d 4} {:a 1 :b 2 :c 3})",
      ],
   );

   define(
      ground,
      "string->fs-path",
      Builtin::func("string->fs-path", "[str]", |_, args| {
         Ok(FileOrDir::parse(&args.get::<String>(0)?).to_value())
      }),
      &[
         "parses a string value into a file or directory path",
         "=> (string->fs-path \"dir/\")",
      ],
   );

   define(
      ground,
      "string->cmd-path",
      Builtin::func("string->cmd-path", "[str]", |_, args| {
         let string = args.get::<String>(0)?;

         if !string.contains('/') {
            return Ok(Value::Command(CommandPath::new(&string)));
         }

         Ok(Value::File(FilePath::new(FileOrDir::parse(&string).path())))
      }),
      &[
         "converts a string to a command or file path",
         "If the value contains a /, it is converted into a file path. Otherwise, the given value is converted \
          into a command path.",
         "=> (string->cmd-path \"scripts/foo\")",
         "=> (string->cmd-path \"bash\")",
      ],
   );

   define(
      ground,
      "string->dir",
      Builtin::func("string->dir", "[str]", |_, args| {
         Ok(Value::Dir(DirPath::new(FileOrDir::parse(&args.get::<String>(0)?).path())))
      }),
      &[
         "converts a string to a directory path",
         "A trailing slash is not required; the path is always assumed to be a directory.",
         "=> (string->dir \"dir\")",
      ],
   );

   define(
      ground,
      "subpath",
      Builtin::func("subpath", "[parent-dir child-path]", |_, args| {
         args.get::<Path>(0)?.0.extend_path(&args.get::<FileOrDir>(1)?)
      }),
      &["extend path with another path", "=> (subpath ./dir/ ./file)"],
   );

   define(
      ground,
      "path-name",
      Builtin::func("path-name", "[path]", |_, args| Ok(Value::string(path_name(args.value(0)?)?))),
      &[
         "returns the base name of the path",
         "For a command path, this returns the command name. For a file or dir path, it returns the file or \
          dir name. For a thunk, it returns the thunk's hash.",
         "=> (path-name ./some/file)",
      ],
   );
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      Thunk,
      ThunkPath,
      ground::test::{
         call,
         run,
      },
      thunk::ThunkCmd,
   };

   #[tokio::test]
   async fn concatenating() {
      let result = run(&call("str", [
         Value::string("abc"),
         Value::Int(123),
         Value::string("def"),
         Value::keyword("ghi"),
      ]))
      .await
      .unwrap();

      assert_eq!(result, Value::string("abc123defghi"));
   }

   #[test]
   fn substrings() {
      assert_eq!(substring("abcdef", 2, Some(4)).unwrap(), "cd");
      assert_eq!(substring("abcdef", 2, None).unwrap(), "cdef");
      assert_eq!(substring("héllo", 1, Some(2)).unwrap(), "é");
      assert!(substring("abc", 2, Some(5)).is_err());
      assert!(substring("abc", 2, Some(1)).is_err());
      assert!(substring("abc", -1, None).is_err());
   }

   #[tokio::test]
   async fn substring_arity() {
      let form = call("substring", [
         Value::string("abcdef"),
         Value::Int(1),
         Value::Int(2),
         Value::Int(3),
      ]);

      assert!(matches!(run(&form).await, Err(Error::Arity { need: 3, have: 4, .. })));
   }

   #[tokio::test]
   async fn symbols_and_strings() {
      let trimmed = run(&call("trim", [Value::string(" hello world!\n ")])).await.unwrap();
      assert_eq!(trimmed, Value::string("hello world!"));

      let string = run(&call("symbol->string", [Value::keyword("hello!")])).await.unwrap();
      assert_eq!(string, Value::string("hello!"));

      let symbol = run(&call("string->symbol", [Value::string("hello!")])).await.unwrap();
      assert_eq!(symbol, Value::symbol("hello!"));
   }

   #[tokio::test]
   async fn scope_lists_and_assoc() {
      let scope = Scope::new();
      scope.set("a", Value::Int(1));
      scope.set("b", Value::Int(2));

      let list = run(&call("scope->list", [Value::Scope(scope.clone())])).await.unwrap();
      assert_eq!(
         list,
         Value::list([Value::symbol("a"), Value::Int(1), Value::symbol("b"), Value::Int(2)])
      );

      let assoced = run(&call("assoc", [
         Value::Scope(scope.clone()),
         Value::keyword("c"),
         Value::Int(3),
      ]))
      .await
      .unwrap()
      .decode::<Scope>()
      .unwrap();

      assert_eq!(assoced.get(&Symbol::new("c")), Some(Value::Int(3)));
      assert_eq!(assoced.get(&Symbol::new("a")), Some(Value::Int(1)));
      assert!(scope.get(&Symbol::new("c")).is_none());

      let odd = call("assoc", [Value::Scope(scope), Value::keyword("c")]);
      assert!(matches!(run(&odd).await, Err(Error::BadSyntax { .. })));
   }

   #[tokio::test]
   async fn reducing_scopes() {
      let init = Scope::new();
      init.set("d", Value::Int(4));

      let kv = Scope::new();
      kv.set("a", Value::Int(1));
      kv.set("b", Value::Int(2));

      let reduced = run(&call("reduce-kv", [
         Value::symbol("assoc"),
         Value::Scope(init),
         Value::Scope(kv),
      ]))
      .await
      .unwrap()
      .decode::<Scope>()
      .unwrap();

      assert_eq!(reduced.local_symbols(), [Symbol::new("d"), Symbol::new("a"), Symbol::new("b")]);
   }

   async fn parse(name: &str, string: &str) -> Value {
      run(&call(name, [Value::string(string)])).await.unwrap()
   }

   #[tokio::test]
   async fn parsing_paths() {
      assert_eq!(parse("string->fs-path", "dir/").await, Value::Dir(DirPath::new("dir")));
      assert_eq!(parse("string->fs-path", "./file").await, Value::File(FilePath::new("file")));
      assert_eq!(parse("string->cmd-path", "bash").await, Value::Command(CommandPath::new("bash")));
      assert_eq!(
         parse("string->cmd-path", "scripts/foo").await,
         Value::File(FilePath::new("scripts/foo"))
      );
      assert_eq!(parse("string->cmd-path", "scripts/").await, Value::File(FilePath::new("scripts")));
      assert_eq!(parse("string->dir", "dir").await, Value::Dir(DirPath::new("dir")));
   }

   #[tokio::test]
   async fn subpaths_and_names() {
      let sub = run(&call("subpath", [
         Value::Dir(DirPath::new("dir")),
         Value::File(FilePath::new("file")),
      ]))
      .await
      .unwrap();
      assert_eq!(sub, Value::File(FilePath::new("dir/file")));

      let name = run(&call("path-name", [Value::File(FilePath::new("some/file"))])).await.unwrap();
      assert_eq!(name, Value::string("file"));

      let name = run(&call("path-name", [Value::Command(CommandPath::new("bash"))])).await.unwrap();
      assert_eq!(name, Value::string("bash"));

      let thunk = Arc::new(Thunk::new(ThunkCmd::Command(CommandPath::new("tests"))));
      let thunk_path = Value::ThunkPath(Arc::new(ThunkPath {
         thunk: thunk.clone(),
         path:  FileOrDir::parse("out/"),
      }));
      assert_eq!(path_name(&thunk_path).unwrap(), "out");
      assert_eq!(path_name(&Value::Thunk(thunk.clone())).unwrap(), thunk.name());
   }
}
