use std::{
   io,
   path::PathBuf,
   process::{
      self,
      Termination as _,
   },
   sync::Arc,
};

use bass::{
   error::{
      self,
      Contextful as _,
   },
   runtime::{
      self,
      Config,
      EvalCtx,
      Scope,
      Sink,
      Source,
      StaticPool,
      Value,
      pipe::{
         JsonSink,
         JsonSource,
      },
   },
   syntax,
};
use clap::Parser as _;
use tracing_subscriber::EnvFilter;

/// The environment variable holding the log filter.
const LOG_ENV: &str = "BASS_LOG";

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Cli {
   /// Log debug output.
   #[arg(long, short)]
   verbose: bool,

   /// Only read the script, reporting syntax errors.
   #[arg(long)]
   check: bool,

   /// The script to run.
   file: PathBuf,

   /// Arguments passed to the script as *args*.
   #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
   args: Vec<String>,
}

fn init_logging(verbose: bool) {
   let filter = if verbose {
      EnvFilter::new("debug")
   } else {
      EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
   };

   tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(io::stderr)
      .init();
}

/// A pool for the configured runtimes. No drivers ship with the evaluator,
/// so configured runtimes are reported and skipped.
fn runtime_pool(config: &Config) -> StaticPool {
   for runtime in &config.runtimes {
      tracing::warn!(
         runtime = %runtime.runtime,
         platform = %runtime.platform,
         "no driver available for runtime, skipping"
      );
   }

   StaticPool::new()
}

async fn run(cli: Cli) -> error::Result<process::ExitCode> {
   let file = cli.file.display().to_string();

   if cli.check {
      let source = tokio::fs::read_to_string(&cli.file)
         .await
         .with_context(|| format!("failed to read '{file}'"))?;

      let forms = syntax::read(&file, &source).context("syntax check failed")?;
      tracing::info!(file, forms = forms.len(), "syntax ok");

      return Ok(process::ExitCode::SUCCESS);
   }

   let config = Config::load().context("failed to load config")?;

   let ctx = EvalCtx::new().with_pool(Arc::new(runtime_pool(&config)));

   let scope = Scope::standard();
   scope.set(
      "*args*",
      Value::list(cli.args.iter().map(|arg| Value::string(arg.as_str()))),
   );
   scope.set(
      "*stdin*",
      Value::Source(Source::new(JsonSource::new("stdin", tokio::io::stdin()))),
   );
   scope.set("*stdout*", Value::Sink(Sink::new(JsonSink::new("stdout", io::stdout()))));

   let result = async {
      bass::eval_file(&ctx, &scope, &cli.file).await?;
      ctx.runs().wait().await
   }
   .await;

   if let Err(error) = ctx.custodian().close() {
      tracing::warn!(%error, "failed to release resources");
   }

   match result {
      Ok(()) => Ok(process::ExitCode::SUCCESS),

      Err(error) => {
         runtime::write_error(&ctx, &error).context("failed to write error")?;
         Ok(process::ExitCode::FAILURE)
      },
   }
}

#[tokio::main]
async fn main() -> process::ExitCode {
   let cli = Cli::parse();

   init_logging(cli.verbose);

   match run(cli).await {
      Ok(code) => code,
      Err(error) => error::Termination::error(error).report(),
   }
}
