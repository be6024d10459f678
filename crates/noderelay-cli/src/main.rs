//! noderelay CLI - invoke a JavaScript export in an out-of-process runtime.
//!
//! The JSON result goes to stdout; logs go to stderr. The exit code reflects
//! the error kind (see `RelayError::to_exit_code`).

mod config;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config::{CliConfig, Overrides};
use noderelay::{
    CancellationToken, InvocationEngine, InvokeOptions, ModuleSource, NodeLauncher, RelayError,
};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "noderelay", version)]
#[command(about = "Invoke JavaScript exports in a supervised Node.js runtime")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke one export and print its JSON result
    Invoke(InvokeArgs),
}

#[derive(Args, Debug)]
struct InvokeArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Export to call (default export when omitted)
    #[arg(short, long)]
    export: Option<String>,

    /// Arguments as a JSON array
    #[arg(long, default_value = "[]")]
    args: String,

    /// Invocation timeout in milliseconds (-1 waits forever)
    #[arg(long, allow_negative_numbers = true)]
    timeout_ms: Option<i64>,

    /// Restart-triggered retries allowed
    #[arg(long)]
    max_retries: Option<u32>,

    /// JSON config file (engine options plus a `Runtime` section)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Runtime executable (defaults to `node`)
    #[arg(long)]
    program: Option<PathBuf>,

    /// Runtime entry script
    #[arg(long)]
    entry: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = true)]
struct SourceArgs {
    /// Module file to load
    #[arg(long, conflicts_with_all = ["source", "cache_key"])]
    module: Option<PathBuf>,

    /// Inline module source
    #[arg(long)]
    source: Option<String>,

    /// Cache key; alone it invokes a cached module, with --source it caches
    #[arg(long)]
    cache_key: Option<String>,
}

impl SourceArgs {
    fn module_source(&self) -> Option<ModuleSource> {
        match (&self.module, &self.source, &self.cache_key) {
            (Some(path), _, _) => Some(ModuleSource::file(path.clone())),
            (None, Some(source), Some(key)) => {
                Some(ModuleSource::string_cached(source.clone(), key.clone()))
            }
            (None, Some(source), None) => Some(ModuleSource::string(source.clone())),
            (None, None, Some(key)) => Some(ModuleSource::cache(key.clone())),
            (None, None, None) => None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("noderelay-cli")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Command::Invoke(args) => run_invoke(args).await,
        }
    });

    match result {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<RelayError>()
                .map(RelayError::to_exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run_invoke(args: InvokeArgs) -> Result<Value> {
    let mut config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    config.apply(&Overrides {
        timeout_ms: args.timeout_ms,
        max_retries: args.max_retries,
        program: args.program.clone(),
        entry: args.entry.clone(),
    });

    let call_args = parse_call_args(&args.args)?;
    let module_source = args
        .source
        .module_source()
        .ok_or_else(|| RelayError::config("--module", "no module source given"))?;

    let launcher = NodeLauncher::new(config.launcher()?);
    let engine = InvocationEngine::new(launcher, config.engine.clone()).await?;

    info!(
        "Invoking {} (export: {})",
        module_source,
        args.export.as_deref().unwrap_or("default")
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling invocation");
            on_interrupt.cancel();
        }
    });

    let result = engine
        .invoke_with(
            module_source,
            args.export.as_deref(),
            call_args,
            InvokeOptions::new().with_cancellation(cancel),
        )
        .await;

    interrupt.abort();
    engine.shutdown().await;
    debug!("Engine shut down");

    Ok(result?)
}

fn parse_call_args(text: &str) -> Result<Vec<Value>, RelayError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(other) => Err(RelayError::config(
            "--args",
            format!("expected a JSON array, got {other}"),
        )),
        Err(e) => Err(RelayError::config("--args", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_args() {
        assert_eq!(
            parse_call_args(r#"[1, "two", {"three": 3}]"#).unwrap(),
            vec![
                Value::from(1),
                Value::from("two"),
                serde_json::json!({"three": 3})
            ]
        );
        assert!(parse_call_args("[]").unwrap().is_empty());
        assert!(matches!(
            parse_call_args(r#"{"a": 1}"#),
            Err(RelayError::Configuration { .. })
        ));
        assert!(parse_call_args("not json").is_err());
    }

    #[test]
    fn test_source_selection() {
        let args = Cli::parse_from([
            "noderelay",
            "invoke",
            "--source",
            "module.exports = x => x",
            "--cache-key",
            "identity",
        ]);
        let Command::Invoke(invoke) = args.command;
        assert_eq!(
            invoke.source.module_source(),
            Some(ModuleSource::string_cached("module.exports = x => x", "identity"))
        );

        let args = Cli::parse_from(["noderelay", "invoke", "--cache-key", "identity"]);
        let Command::Invoke(invoke) = args.command;
        assert_eq!(invoke.source.module_source(), Some(ModuleSource::cache("identity")));
    }

    #[test]
    fn test_module_conflicts_with_source() {
        let parsed = Cli::try_parse_from([
            "noderelay",
            "invoke",
            "--module",
            "a.js",
            "--source",
            "x",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["noderelay", "invoke", "--export", "add"]);
        assert!(parsed.is_err(), "a module source is required");
    }

    #[test]
    fn test_negative_timeout_parses() {
        let args = Cli::parse_from([
            "noderelay",
            "invoke",
            "--source",
            "x",
            "--timeout-ms",
            "-1",
        ]);
        let Command::Invoke(invoke) = args.command;
        assert_eq!(invoke.timeout_ms, Some(-1));
    }
}
