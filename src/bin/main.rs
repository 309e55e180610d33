use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;
use transaction_insights_agent::{agent::create_agent, config::AgentConfig, Classification};

const DEMO_CUSTOMER: &str = "CUST_001";

const DEMO_TURNS: &[&str] = &[
    "How much did I spend on dining last month?",
    "Recent transactions",
    "last week",
    "How much on groceries in Nov vs Oct?",
    "How much did I spend at bars last month?",
    "the first one",
];

/// Offline demo: runs a scripted conversation against the bundled fixture
/// data, or reads turns from stdin with `--interactive`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut config = AgentConfig::from_env()?;
    // the bundled fixture data is anchored on the default reference date
    if std::env::var("REFERENCE_DATE").is_err() {
        config.reference_date = AgentConfig::default().reference_date;
    }
    let agent = create_agent(&config)?;
    let interactive = std::env::args().any(|arg| arg == "--interactive");

    info!(reference_date = %config.reference_date, interactive = interactive, "Insights demo starting");
    println!("Reference date: {}", config.reference_date);

    let mut session_id: Option<String> = None;

    let turns: Vec<String> = if interactive {
        Vec::new()
    } else {
        DEMO_TURNS.iter().map(|t| t.to_string()).collect()
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut scripted = turns.into_iter();

    loop {
        let text = if interactive {
            print!("\n> ");
            io::stdout().flush()?;
            match lines.next() {
                Some(line) => line?,
                None => break,
            }
        } else {
            match scripted.next() {
                Some(text) => {
                    println!("\n> {}", text);
                    text
                }
                None => break,
            }
        };

        if text.trim().eq_ignore_ascii_case("quit") {
            break;
        }
        if text.trim().is_empty() {
            continue;
        }

        match agent
            .handle_turn(session_id.as_deref(), DEMO_CUSTOMER, &text)
            .await
        {
            Ok(response) => {
                println!("{}", response.customer_message);
                if response.classification == Classification::Clear {
                    if let Some(record) = &response.audit_record {
                        println!(
                            "  [audit {} | {:?} | {} tool call(s)]",
                            record.audit_id,
                            record.outcome,
                            record.tool_calls.len()
                        );
                    }
                }
                session_id = Some(response.session_id);
            }
            Err(e) => eprintln!("Turn failed: {}", e),
        }
    }

    Ok(())
}
