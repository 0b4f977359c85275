use flowfill::{FlowBrowser, FlowScanner, Heuristics, ScanConfig};

#[tokio::main]
async fn main() -> flowfill::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowfill=info".into()),
        )
        .with_target(false)
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/forms/post".to_string());

    let browser = FlowBrowser::builder().headless(true).build().await?;
    let page = browser.open(&url).await?;

    let heuristics = Heuristics::default();
    let flow = FlowScanner::new(&heuristics, ScanConfig::default())
        .scan(&page)
        .await?;

    println!("Found {} step(s):", flow.len());
    for (i, step) in flow.steps.iter().enumerate() {
        println!("  step {} at {} ({} fields)", i + 1, step.url, step.fields.len());
        for field in &step.fields {
            println!("    {} [{}] {}", field.selector, field.input_type, field.label);
        }
    }
    println!("{}", serde_json::to_string_pretty(&flow)?);

    Ok(())
}
