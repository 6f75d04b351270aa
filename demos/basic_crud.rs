//! Basic record lifecycle.
//!
//! Connects with the password grant, describes `Account`, then inserts,
//! reads, updates and deletes one account.
//!
//! Run with:
//! `SF_CLIENT_ID=.. SF_CLIENT_SECRET=.. SF_USERNAME=.. SF_PASSWORD=.. SF_SECURITY_TOKEN=.. cargo run --example basic_crud`
//!
//! Set `SF_ENVIRONMENT=sandbox` for a sandbox org and `SF_TRACE=1` to print
//! every request and response.

use serde_json::json;
use sforce::{Environment, Error, LogSink, Record, Session};
use std::sync::Arc;

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{} must be set", name))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sforce=debug".into()),
        )
        .init();

    let environment: Environment = std::env::var("SF_ENVIRONMENT")
        .unwrap_or_else(|_| "production".into())
        .parse()?;

    let mut builder = Session::builder(env("SF_CLIENT_ID"), env("SF_CLIENT_SECRET"))
        .password(env("SF_USERNAME"), env("SF_PASSWORD"), env("SF_SECURITY_TOKEN"))
        .environment(environment)
        .user_agent_suffix("basic-crud-demo/1.0");
    if std::env::var("SF_TRACE").is_ok() {
        builder = builder.trace("sfdc", Arc::new(LogSink));
    }

    let session = builder.connect().await?;
    println!("Connected, API {}", session.api_version());

    let identity = session.identity().await?;
    println!("Logged in as {} ({})", identity.username, identity.organization_id);

    let description = session.describe("Account").await?;
    println!(
        "Account has {} fields, {} createable",
        description.fields.len(),
        description.createable_fields().count()
    );

    let mut account = Record::new();
    account.insert("Name".into(), json!("sforce demo account"));
    let created = session.insert_record("Account", &account).await?;
    let id = match created.id {
        Some(id) => id,
        None => {
            eprintln!("Insert failed: {:?}", created.errors);
            return Ok(());
        }
    };
    println!("Inserted {}", id);

    let mut changes = Record::new();
    changes.insert("Name".into(), json!("sforce demo account (renamed)"));
    session.update_record("Account", &id, &changes).await?;

    let fetched = session
        .get_record("Account", &id, Some(&["Id", "Name"]))
        .await?;
    println!("Read back: {}", fetched["Name"]);

    session.delete_record("Account", &id).await?;
    match session.get_record("Account", &id, None).await {
        Err(Error::NotFound(_)) => println!("Deleted {}", id),
        other => println!("Unexpected result after delete: {:?}", other),
    }

    Ok(())
}
