use std::time::Duration;

use flowfill::{
    ArrivalTrigger, Document, Element, Heuristics, MemoryDocument, MemoryPage, StepArrival,
    StepSynchronizer,
};
use tokio::time::Instant;

const POLL: Duration = Duration::from_millis(250);
const TIMEOUT: Duration = Duration::from_secs(9);

fn with_form(url: &str) -> MemoryPage {
    MemoryPage::new(
        url,
        "Form",
        Element::new("body").child(Element::new("form").child(Element::input("x"))),
    )
}

fn without_form(url: &str) -> MemoryPage {
    MemoryPage::new(
        url,
        "Interstitial",
        Element::new("body").child(Element::new("p").text("Loading…")),
    )
}

/// Subscribe, load page `change.1` after `change.0`, and wait for the next step.
async fn wait_after(
    doc: &MemoryDocument,
    change: Option<(Duration, usize)>,
) -> (StepArrival, Duration) {
    let heuristics = Heuristics::default();
    let sync = StepSynchronizer::new(&heuristics, POLL);
    let previous = doc.url().await.unwrap();
    let mut mutations = doc.mutations();
    mutations.borrow_and_update();

    if let Some((after, page)) = change {
        let doc = doc.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            doc.goto(page);
        });
    }
    let began = Instant::now();
    let arrival = sync
        .await_next_step(doc, &previous, mutations, TIMEOUT)
        .await
        .unwrap();
    (arrival, began.elapsed())
}

#[tokio::test(start_paused = true)]
async fn form_appearing_resolves_on_mutation() {
    let doc = MemoryDocument::new(vec![
        with_form("https://forms.test/a"),
        with_form("https://forms.test/b"),
    ]);
    let (arrival, waited) = wait_after(&doc, Some((Duration::from_millis(40), 1))).await;

    assert_eq!(arrival.trigger, ArrivalTrigger::Mutation);
    assert!(arrival.navigated);
    assert!(arrival.form.is_some());
    assert!(waited < POLL);
}

#[tokio::test(start_paused = true)]
async fn location_change_without_form_resolves_on_poll() {
    let doc = MemoryDocument::new(vec![
        with_form("https://forms.test/a"),
        without_form("https://forms.test/processing"),
    ]);
    let (arrival, waited) = wait_after(&doc, Some((Duration::from_millis(40), 1))).await;

    assert_eq!(arrival.trigger, ArrivalTrigger::LocationChange);
    assert!(arrival.navigated);
    assert_eq!(arrival.form, None);
    assert!(waited >= POLL && waited < POLL * 2, "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn nothing_happening_resolves_at_the_deadline() {
    let doc = MemoryDocument::new(vec![with_form("https://forms.test/a")]);
    let (arrival, waited) = wait_after(&doc, None).await;

    assert!(arrival.timed_out());
    assert!(!arrival.navigated);
    // The form still on screen is reported as best effort.
    assert!(arrival.form.is_some());
    assert!(waited >= TIMEOUT && waited < TIMEOUT + POLL, "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn in_place_change_without_form_keeps_waiting() {
    let doc = MemoryDocument::new(vec![
        with_form("https://forms.test/a"),
        without_form("https://forms.test/a"),
    ]);
    let (arrival, _) = wait_after(&doc, Some((Duration::from_millis(40), 1))).await;

    assert_eq!(arrival.trigger, ArrivalTrigger::Timeout);
    assert!(!arrival.navigated);
    assert_eq!(arrival.form, None);
}
