//! `bulk_fill <url> <rows.csv> [mappings.json]`
//!
//! Scans the flow at `url`, maps CSV columns onto its fields (reusing a saved
//! mapping when the flow was seen before) and submits every row.

use std::sync::Arc;

use flowfill::{
    BulkJob, BulkRunner, EventBus, FieldMapping, FlowBrowser, FlowScanner, Heuristics,
    MappingStore, RunState, ScanConfig, Table,
};

#[tokio::main]
async fn main() -> flowfill::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowfill=info".into()),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(csv_path)) = (args.next(), args.next()) else {
        eprintln!("usage: bulk_fill <url> <rows.csv> [mappings.json]");
        std::process::exit(2);
    };
    let store = MappingStore::new(args.next().unwrap_or_else(|| "mappings.json".into()));

    let table = Table::parse(&std::fs::read_to_string(&csv_path)?)?;
    println!("Loaded {} rows with columns {:?}", table.rows.len(), table.header);

    let browser = FlowBrowser::builder().headless(true).build().await?;
    let page = browser.open(&url).await?;

    let heuristics = Heuristics::default();
    let flow = FlowScanner::new(&heuristics, ScanConfig::default())
        .scan(&page)
        .await?;
    println!("Scanned {} step(s)", flow.len());

    let mapping = match store.load(&flow)? {
        Some(saved) => {
            println!("Using saved mapping from {}", store.path().display());
            saved
        }
        None => {
            let fields = flow.steps.iter().flat_map(|s| &s.fields);
            let suggested = FieldMapping::suggest(fields, &table.header);
            store.save(&flow, &suggested)?;
            println!(
                "Mapped {} field(s) by name; edit {} to adjust",
                suggested.len(),
                store.path().display()
            );
            suggested
        }
    };

    // Replay starts from the first step.
    page.goto(&url).await?;

    let events = EventBus::new();
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("{}", event.describe());
        }
    });

    let runner = BulkRunner::new(Arc::new(page), Arc::new(RunState::new()), events);
    let stopper = runner.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let summary = runner
        .run(BulkJob {
            flow,
            rows: table.into_dataset(),
            mapping,
            delay_ms: None,
        })
        .await?;
    println!(
        "{} of {} rows submitted, {} failed{}",
        summary.completed,
        summary.total,
        summary.failed,
        if summary.stopped { " (stopped)" } else { "" }
    );

    Ok(())
}
