//! E2E scenario tests.
//!
//! These tests deploy to a real cluster running the GitOps controller.
//! They require:
//! - `kubectl` pointing at the cluster
//! - `GIT_REPO_URL` (and usually `GIT_SSH_KEY`) for git-driven scenarios
//!
//! Run with: `cargo test --test e2e_test -- --ignored`
//! Run specific: `cargo test --test e2e_test helm_kustomize -- --ignored`
//!
//! Environment variables:
//! - `FLEET_E2E_TIMEOUT` - Seconds each expectation may take
//! - `FLEET_DEBUG=1` - Pause before teardown to inspect the cluster

use serial_test::serial;

use fleet_e2e::{default_catalog_dir, Catalog, ScenarioReport, ScenarioRunner, TestEnv};

fn create_runner() -> ScenarioRunner {
    let env = TestEnv::from_env().expect("invalid environment configuration");
    ScenarioRunner::with_kubectl_cli(env).expect("invalid test environment")
}

fn print_report(report: &ScenarioReport) {
    println!("\n=== E2E Result ===");
    println!("Scenario: {}", report.name);
    println!("Passed: {}", report.passed());
    println!("Reached: {:?}", report.reached);
    println!("Duration: {:?}", report.duration);

    if let Err(error) = &report.outcome {
        println!("Error: {}", error);
    }
    for error in &report.teardown_errors {
        println!("Teardown: {}", error);
    }
}

async fn run_scenario(name: &str) {
    let catalog = Catalog::load_dir(default_catalog_dir()).expect("failed to load catalog");
    let scenario = catalog
        .get(name)
        .unwrap_or_else(|| panic!("scenario {} not in catalog", name));

    let runner = create_runner();
    let report = scenario.run(&runner).await;

    print_report(&report);
    assert!(report.passed(), "scenario {} failed", name);
}

#[tokio::test]
#[ignore]
#[serial]
async fn helm() {
    run_scenario("helm").await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn manifests() {
    run_scenario("manifests").await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn kustomize() {
    run_scenario("kustomize").await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn helm_kustomize() {
    run_scenario("helm-kustomize").await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn helm_multi_chart() {
    run_scenario("helm-multi-chart").await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn multiple_paths() {
    run_scenario("multiple-paths").await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn gitrepo_update() {
    run_scenario("gitrepo-update").await;
}

#[test]
fn catalog_names_match_tests() {
    let catalog = Catalog::load_dir(default_catalog_dir()).expect("failed to load catalog");
    let mut names: Vec<&str> = catalog.scenarios().iter().map(|s| s.name.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "gitrepo-update",
            "helm",
            "helm-kustomize",
            "helm-multi-chart",
            "kustomize",
            "manifests",
            "multiple-paths",
        ]
    );
}
