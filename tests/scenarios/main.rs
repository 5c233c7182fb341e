//! Scenario tests using cucumber-rs (Gherkin).
//!
//! Each world drives the model layer against a scripted transport:
//!
//! ```bash
//! cargo test --test scenarios
//! ```

mod steps;

use cucumber::World;
use steps::persistence::PersistenceWorld;
use steps::querying::QueryWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running Querying Scenarios ===\n");
    QueryWorld::cucumber()
        .fail_on_skipped()
        .run("tests/scenarios/features/querying.feature")
        .await;

    println!("\n=== Running Paging Scenarios ===\n");
    QueryWorld::cucumber()
        .fail_on_skipped()
        .run("tests/scenarios/features/paging.feature")
        .await;

    println!("\n=== Running Persistence Scenarios ===\n");
    PersistenceWorld::cucumber()
        .fail_on_skipped()
        .run("tests/scenarios/features/persistence.feature")
        .await;
}
