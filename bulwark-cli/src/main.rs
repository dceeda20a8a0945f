use anyhow::Result;
use bulwark::GuardListSource;
use std::sync::Arc;

use bulwark_cli::config::Config;
use bulwark_cli::drill;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging; stdout is reserved for the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("bulwark={}", config.log_level).parse()?)
                .add_directive(format!("bulwark_cli={}", config.log_level).parse()?),
        )
        .init();

    let registry = Arc::new(config.policy.build_registry()?);

    if config.check_only {
        println!("Policy OK");
        for call_site in registry.call_sites() {
            println!(
                "  {call_site}: [{}]",
                registry.guards(call_site).names().join(", ")
            );
        }
        let fallback = registry.default_chain();
        if !fallback.is_empty() {
            println!("  (default): [{}]", fallback.names().join(", "));
        }
        return Ok(());
    }

    if !registry.is_bound(&config.drill.call_site) {
        tracing::warn!(
            call_site = %config.drill.call_site,
            "Call site has no binding; using the default chain"
        );
    }

    let snapshot_source = Arc::clone(&registry);
    let report = drill::run(registry, &config.drill, move || {
        snapshot_source.snapshots()
    })
    .await?;

    println!("{}", report.render(config.format)?);

    Ok(())
}
