//! Basic usage: run one export in a Node.js runtime.
//!
//! ```text
//! cargo run -p noderelay --example basic_usage -- path/to/entry.js
//! ```

use noderelay::{EngineOptions, InvocationEngine, ModuleSource, NodeLauncher, NodeLauncherConfig};
use serde_json::json;

#[tokio::main]
async fn main() -> noderelay::Result<()> {
    tracing_subscriber::fmt::init();

    let entry = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "runtime/entry.js".to_string());

    let engine = InvocationEngine::builder(NodeLauncher::new(NodeLauncherConfig::new(entry)))
        .options(EngineOptions::new().with_timeout_ms(5_000))
        .build()
        .await?;

    let result = engine
        .invoke(
            ModuleSource::string("exports.greet = (name) => `hello ${name}`;"),
            Some("greet"),
            vec![json!("noderelay")],
        )
        .await?;
    println!("{}", result);

    engine.shutdown().await;
    Ok(())
}
