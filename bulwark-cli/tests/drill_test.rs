use bulwark::{GuardKind, GuardRegistry, GuardState};
use bulwark_cli::config::{DrillConfig, OutputFormat};
use bulwark_cli::drill::{self, DrillReport};
use bulwark_cli::policy::PolicyConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn registry(policy: &str) -> Arc<GuardRegistry> {
    let policy = PolicyConfig::from_toml_str(policy).unwrap();
    Arc::new(policy.build_registry().unwrap())
}

async fn drill(registry: Arc<GuardRegistry>, config: DrillConfig) -> DrillReport {
    let snapshots = Arc::clone(&registry);
    assert_ok!(drill::run(registry, &config, move || snapshots.snapshots()).await)
}

const CHECKOUT: &str = r#"
    [[guards]]
    name = "db"
    kind = "concurrency"
    limit = 1000

    [[guards]]
    name = "per-user"
    kind = "rate-limiting"
    limit = 5

    [[call_sites]]
    name = "checkout"
    guards = ["db", "per-user"]
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_limit_caps_each_principal() {
    let report = drill(
        registry(CHECKOUT),
        DrillConfig {
            call_site: "checkout".to_string(),
            requests: 40,
            workers: 4,
            principals: 4,
            hold: Duration::ZERO,
            fail_every: 0,
        },
    )
    .await;

    assert_eq!(report.chain, vec!["db", "per-user"]);
    assert_eq!(report.counts.total, 40);
    assert_eq!(report.counts.succeeded, 20);
    assert_eq!(report.counts.rejected_rate, 20);
    assert_eq!(report.counts.rejected_concurrency, 0);

    let per_user = report.guards.iter().find(|g| g.name == "per-user").unwrap();
    assert_eq!(per_user.kind, GuardKind::RateLimiting);
    assert!(matches!(
        per_user.state,
        GuardState::RateLimiting {
            tracked_identities: 4,
            ..
        }
    ));
}

#[tokio::test]
async fn test_anonymous_callers_are_unauthenticated() {
    let report = drill(
        registry(CHECKOUT),
        DrillConfig {
            call_site: "checkout".to_string(),
            requests: 10,
            workers: 2,
            principals: 0,
            hold: Duration::ZERO,
            fail_every: 0,
        },
    )
    .await;

    assert_eq!(report.counts.unauthenticated, 10);
    assert_eq!(report.counts.succeeded, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_turns_away_excess_workers() {
    let registry = registry(
        r#"
        [[guards]]
        name = "db"
        kind = "concurrency"
        limit = 2

        [[call_sites]]
        name = "report"
        guards = ["db"]
        "#,
    );

    let report = drill(
        Arc::clone(&registry),
        DrillConfig {
            call_site: "report".to_string(),
            requests: 8,
            workers: 8,
            principals: 1,
            hold: Duration::from_millis(200),
            fail_every: 0,
        },
    )
    .await;

    assert_eq!(report.counts.total, 8);
    assert!(report.counts.succeeded >= 2);
    assert!(report.counts.rejected_concurrency >= 1);
    assert_eq!(
        report.counts.succeeded + report.counts.rejected_concurrency,
        8
    );

    // Every permit is back once the drill is over
    assert_eq!(
        report.guards[0].state,
        GuardState::Concurrency {
            in_flight: 0,
            available: 2
        }
    );
}

#[tokio::test]
async fn test_action_failures_pass_through_unguarded_call_site() {
    let report = drill(
        registry(CHECKOUT),
        DrillConfig {
            call_site: "unbound".to_string(),
            requests: 12,
            workers: 3,
            principals: 0,
            hold: Duration::ZERO,
            fail_every: 4,
        },
    )
    .await;

    assert!(report.chain.is_empty());
    assert_eq!(report.counts.failed, 3);
    assert_eq!(report.counts.succeeded, 9);
    assert_eq!(report.counts.rejected(), 0);
}

#[tokio::test]
async fn test_default_chain_covers_unbound_call_sites() {
    let registry = registry(
        r#"
        default_chain = ["per-user"]

        [[guards]]
        name = "per-user"
        kind = "rate-limiting"
        limit = 1
        "#,
    );

    let report = drill(
        registry,
        DrillConfig {
            call_site: "anything".to_string(),
            requests: 6,
            workers: 1,
            principals: 2,
            hold: Duration::ZERO,
            fail_every: 0,
        },
    )
    .await;

    assert_eq!(report.chain, vec!["per-user"]);
    assert_eq!(report.counts.succeeded, 2);
    assert_eq!(report.counts.rejected_rate, 4);
}

#[tokio::test]
async fn test_report_formats() {
    let report = drill(
        registry(CHECKOUT),
        DrillConfig {
            call_site: "checkout".to_string(),
            requests: 6,
            workers: 2,
            principals: 1,
            hold: Duration::ZERO,
            fail_every: 0,
        },
    )
    .await;

    let text = report.render(OutputFormat::Text).unwrap();
    assert!(text.contains("Drill of 'checkout' through [db, per-user]"));
    assert!(text.contains("per-user (rate-limiting, limit 5)"));

    let json: serde_json::Value =
        serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json["call_site"], "checkout");
    assert_eq!(json["counts"]["succeeded"], 5);
    assert_eq!(json["counts"]["rejected_rate"], 1);
    assert_eq!(json["guards"][0]["kind"], "concurrency");
    assert_eq!(json["guards"][1]["state"]["type"], "rate-limiting");

    let prometheus = report.render(OutputFormat::Prometheus).unwrap();
    assert!(prometheus.contains("bulwark_drill_requests_total 6"));
    assert!(prometheus.contains("bulwark_guard_limit{guard=\"per-user\",kind=\"rate-limiting\"} 5"));
    assert!(prometheus.contains("bulwark_guard_tracked_identities{guard=\"per-user\"} 1"));
}
