//! Miscellaneous utilities.

pub mod slash;

macro_rules! call_alias {
   ([$d:tt] $name:ident => $($call:tt)+) => {
      #[doc = concat!("Rebinds each identifier to itself with `", stringify!($($call)+), "` applied.")]
      #[macro_export]
      macro_rules! $name {
         ($d(mut $d identifier:ident),* $d(,)?) => {
            $d(let mut $d identifier = $d identifier $($call)+;)*
         };

         ($d($d identifier:ident),* $d(,)?) => {
            $d(let $d identifier = $d identifier $($call)+;)*
         };
      }
   };

   ($($call:tt)+) => {
      call_alias!([$] $($call)+);
   };
}

call_alias!(into => .into());
call_alias!(clone => .clone());
call_alias!(collect_vec => .into_iter().collect::<Vec<_>>());
