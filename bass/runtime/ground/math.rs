use super::define;
use crate::{
   Args,
   Builtin,
   Error,
   Result,
   Scope,
   Value,
};

fn overflow(name: &str) -> Error {
   Error::message(format!("({name}) integer overflow"))
}

fn fold(args: &Args, init: i64, step: fn(i64, i64) -> Option<i64>) -> Result<Value> {
   let mut result = init;

   for num in args.rest_as::<i64>(0)? {
      result = step(result, num).ok_or_else(|| overflow(args.name().as_str()))?;
   }

   Ok(Value::Int(result))
}

/// Whether every adjacent pair of numbers satisfies `holds`.
fn ordered(args: &Args, holds: fn(i64, i64) -> bool) -> Result<Value> {
   let nums = args.rest_as::<i64>(0)?;

   Ok(Value::Bool(nums.windows(2).all(|pair| holds(pair[0], pair[1]))))
}

pub(super) fn register(ground: &Scope) {
   define(
      ground,
      "+",
      Builtin::func("+", "nums", |_, args| fold(args, 0, i64::checked_add)),
      &["sums numbers", "=> (+ 1 2 3)"],
   );

   define(
      ground,
      "*",
      Builtin::func("*", "nums", |_, args| fold(args, 1, i64::checked_mul)),
      &["multiplies numbers", "=> (* 2 3 7)"],
   );

   define(
      ground,
      "quot",
      Builtin::func("quot", "[num denom]", |_, args| {
         let num = args.get::<i64>(0)?;
         let denom = args.get::<i64>(1)?;

         if denom == 0 {
            return Err(Error::message("(quot) division by zero"));
         }

         num.checked_div(denom).map(Value::Int).ok_or_else(|| overflow("quot"))
      }),
      &["quot[ient] of dividing num by denom", "=> (quot 84 2)"],
   );

   define(
      ground,
      "-",
      Builtin::func("-", "[num & nums]", |_, args| {
         let num = args.get::<i64>(0)?;
         let nums = args.rest_as::<i64>(1)?;

         if nums.is_empty() {
            return num.checked_neg().map(Value::Int).ok_or_else(|| overflow("-"));
         }

         nums
            .into_iter()
            .try_fold(num, i64::checked_sub)
            .map(Value::Int)
            .ok_or_else(|| overflow("-"))
      }),
      &[
         "subtracts ys from x",
         "If only x is given, returns the negation of x.",
         "=> (- 10 4 1)",
         "=> (- 6)",
      ],
   );

   define(
      ground,
      "max",
      Builtin::func("max", "[num & nums]", |_, args| {
         let num = args.get::<i64>(0)?;
         Ok(Value::Int(args.rest_as::<i64>(1)?.into_iter().fold(num, i64::max)))
      }),
      &["returns the largest number", "=> (max 6 42 7)"],
   );

   define(
      ground,
      "min",
      Builtin::func("min", "[num & nums]", |_, args| {
         let num = args.get::<i64>(0)?;
         Ok(Value::Int(args.rest_as::<i64>(1)?.into_iter().fold(num, i64::min)))
      }),
      &["returns the smallest number", "=> (min 6 42 7)"],
   );

   define(
      ground,
      "=",
      Builtin::func("=", "[val & vals]", |_, args| {
         let first = args.value(0)?;
         Ok(Value::Bool(args.rest(1).iter().all(|other| other.equal(first))))
      }),
      &[
         "returns true if the values are all equal",
         "=> (= 1 1 1 1)",
         "=> (= {:a 1} {:a 1})",
      ],
   );

   define(
      ground,
      ">",
      Builtin::func(">", "[num & nums]", |_, args| ordered(args, |a, b| a > b)),
      &["returns true if the numbers are in descending order", "=> (> 9 8 7)"],
   );

   define(
      ground,
      ">=",
      Builtin::func(">=", "[num & nums]", |_, args| ordered(args, |a, b| a >= b)),
      &["returns true if the numbers are in descending or equal order", "=> (>= 9 8 8)"],
   );

   define(
      ground,
      "<",
      Builtin::func("<", "[num & nums]", |_, args| ordered(args, |a, b| a < b)),
      &["returns true if the numbers are in ascending order", "=> (< 7 8 9)"],
   );

   define(
      ground,
      "<=",
      Builtin::func("<=", "[num & nums]", |_, args| ordered(args, |a, b| a <= b)),
      &["returns true if the numbers are in ascending or equal order", "=> (<= 7 8 8)"],
   );
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::ground::test::{
      call,
      run,
   };

   fn ints(nums: &[i64]) -> Vec<Value> {
      nums.iter().copied().map(Value::Int).collect()
   }

   async fn math(name: &str, nums: &[i64]) -> Result<Value> {
      run(&call(name, ints(nums))).await
   }

   #[tokio::test]
   async fn arithmetic() {
      assert_eq!(math("+", &[1, 2, 3]).await.unwrap(), Value::Int(6));
      assert_eq!(math("+", &[]).await.unwrap(), Value::Int(0));
      assert_eq!(math("*", &[2, 3, 7]).await.unwrap(), Value::Int(42));
      assert_eq!(math("quot", &[84, 2]).await.unwrap(), Value::Int(42));
      assert_eq!(math("-", &[10, 4, 1]).await.unwrap(), Value::Int(5));
      assert_eq!(math("-", &[6]).await.unwrap(), Value::Int(-6));
      assert_eq!(math("max", &[6, 42, 7]).await.unwrap(), Value::Int(42));
      assert_eq!(math("min", &[6, 42, 7]).await.unwrap(), Value::Int(6));
   }

   #[tokio::test]
   async fn arithmetic_errors() {
      assert!(math("quot", &[1, 0]).await.is_err());
      assert!(math("+", &[i64::MAX, 1]).await.is_err());
      assert!(matches!(math("-", &[]).await, Err(Error::Arity { need: 1, have: 0, .. })));
      assert!(matches!(
         run(&call("+", [Value::Int(1), Value::string("2")])).await,
         Err(Error::Decode { .. })
      ));
   }

   #[tokio::test]
   async fn comparisons() {
      assert_eq!(math(">", &[9, 8, 7]).await.unwrap(), Value::Bool(true));
      assert_eq!(math(">", &[9, 8, 8]).await.unwrap(), Value::Bool(false));
      assert_eq!(math(">=", &[9, 8, 8]).await.unwrap(), Value::Bool(true));
      assert_eq!(math("<", &[7, 8, 9]).await.unwrap(), Value::Bool(true));
      assert_eq!(math("<", &[8, 8, 9]).await.unwrap(), Value::Bool(false));
      assert_eq!(math("<=", &[7, 8, 8]).await.unwrap(), Value::Bool(true));
      assert_eq!(math("<", &[1]).await.unwrap(), Value::Bool(true));
   }

   #[tokio::test]
   async fn equality() {
      let equal = run(&call("=", [Value::keyword("a"), Value::keyword("a"), Value::keyword("a")]))
         .await
         .unwrap();
      assert_eq!(equal, Value::Bool(true));

      let unequal = run(&call("=", [Value::keyword("a"), Value::keyword("b")])).await.unwrap();
      assert_eq!(unequal, Value::Bool(false));
   }
}
