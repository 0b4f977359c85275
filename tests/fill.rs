use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use flowfill::{
    fill, snapshot, DataRow, Document, DomEvent, DomTree, EffectMode, Element, FieldMapping,
    Heuristics, MemoryDocument, MemoryPage, NodeId,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn preferences() -> MemoryDocument {
    MemoryDocument::new(vec![MemoryPage::new(
        "https://forms.test/prefs",
        "Preferences",
        Element::new("body").child(Element::new("form").children([
            Element::select("country", &[("us", "United States"), ("ca", "Canada")]),
            Element::select("size", &[("s", "Small"), ("m", "Medium")]),
            Element::input("news").attr("type", "checkbox"),
            Element::input("terms").attr("type", "checkbox").attr("checked", ""),
            Element::input("plan").attr("type", "radio").attr("value", "free"),
            Element::input("nickname").attr("value", "keep me"),
            Element::new("textarea").attr("name", "bio"),
            Element::input("token").attr("type", "hidden"),
        ])),
    )])
}

#[tokio::test]
async fn writes_each_control_by_its_kind() {
    let doc = preferences();
    let step = snapshot::snapshot(&doc, &Heuristics::default()).await.unwrap();
    assert!(step.fields.iter().all(|f| f.name != "token"));

    let mapping = FieldMapping::new()
        .with("[name=\"country\"]", "Country")
        .with("[name=\"size\"]", "Size")
        .with("[name=\"news\"]", "News")
        .with("[name=\"terms\"]", "Terms")
        .with("[name=\"plan\"]", "Plan")
        .with("[name=\"bio\"]", "Bio");
    let row = DataRow::new()
        .with("Country", "Canada")
        .with("Size", "XL")
        .with("News", " Yes")
        .with("Terms", "no")
        .with("Plan", "1");

    let done = fill::fill(&doc, &mapping.apply(&step), &row, &CancellationToken::new())
        .await
        .unwrap();
    assert!(done);

    // Display text resolves to the option value.
    assert_eq!(doc.value_of("[name=\"country\"]").as_deref(), Some("ca"));
    // No matching option: the raw value is offered and refused.
    assert_eq!(doc.value_of("[name=\"size\"]").as_deref(), Some(""));
    assert_eq!(doc.is_checked("[name=\"news\"]"), Some(true));
    assert_eq!(doc.is_checked("[name=\"terms\"]"), Some(false));
    assert_eq!(doc.is_checked("[name=\"plan\"]"), Some(true));
    // Mapped but absent from the row: cleared.
    assert_eq!(doc.value_of("[name=\"bio\"]").as_deref(), Some(""));
    // Not mapped at all: untouched.
    assert_eq!(doc.value_of("[name=\"nickname\"]").as_deref(), Some("keep me"));

    let journal = doc.journal();
    assert_eq!(journal.writes.len(), 6);
    // Only the textarea gets synthetic notifications.
    assert_eq!(journal.events.len(), 2);
}

#[tokio::test]
async fn stale_locators_are_skipped() {
    let doc = preferences();
    let step = snapshot::snapshot(&doc, &Heuristics::default()).await.unwrap();
    let mut fields = FieldMapping::new()
        .with("[name=\"bio\"]", "Bio")
        .apply(&step);
    fields.retain(|f| f.map_to.is_some());
    fields[0].field.selector = "[name=\"renamed\"]".into();

    let row = DataRow::new().with("Bio", "hello");
    assert!(fill::fill(&doc, &fields, &row, &CancellationToken::new())
        .await
        .unwrap());
    assert!(doc.journal().writes.is_empty());
}

#[tokio::test]
async fn cancelled_token_ends_the_fill_early() {
    let doc = preferences();
    let step = snapshot::snapshot(&doc, &Heuristics::default()).await.unwrap();
    let mapping = FieldMapping::new().with("[name=\"bio\"]", "Bio");
    let row = DataRow::new().with("Bio", "hello");

    let stop = CancellationToken::new();
    stop.cancel();
    let done = fill::fill(&doc, &mapping.apply(&step), &row, &stop)
        .await
        .unwrap();
    assert!(!done);
    assert!(doc.journal().writes.is_empty());
}

const NAMES_URL: &str = "https://forms.test/names";

/// Re-renders the form with a validation hint ahead of the inputs the first
/// time any field reports an `input` event.
struct Revalidating {
    inner: MemoryDocument,
    rendered_hint: AtomicBool,
}

impl Revalidating {
    fn new() -> Self {
        let plain = MemoryPage::new(
            NAMES_URL,
            "Names",
            Element::new("body").child(
                Element::new("form")
                    .child(Element::input("first"))
                    .child(Element::input("last")),
            ),
        );
        let hinted = MemoryPage::new(
            NAMES_URL,
            "Names",
            Element::new("body").child(
                Element::new("form")
                    .child(Element::new("span").text("Looks good"))
                    .child(Element::input("first").attr("value", "Ann"))
                    .child(Element::input("last")),
            ),
        );
        Self {
            inner: MemoryDocument::new(vec![plain, hinted]),
            rendered_hint: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Document for Revalidating {
    async fn tree(&self) -> flowfill::Result<DomTree> {
        self.inner.tree().await
    }
    async fn url(&self) -> flowfill::Result<String> {
        self.inner.url().await
    }
    async fn title(&self) -> flowfill::Result<String> {
        self.inner.title().await
    }
    async fn set_value(&self, node: NodeId, value: &str) -> flowfill::Result<()> {
        self.inner.set_value(node, value).await
    }
    async fn set_checked(&self, node: NodeId, checked: bool) -> flowfill::Result<()> {
        self.inner.set_checked(node, checked).await
    }
    async fn dispatch(&self, node: NodeId, event: DomEvent) -> flowfill::Result<()> {
        self.inner.dispatch(node, event).await?;
        if event == DomEvent::Input && !self.rendered_hint.swap(true, Ordering::SeqCst) {
            self.inner.goto(1);
        }
        Ok(())
    }
    async fn click(&self, node: NodeId) -> flowfill::Result<()> {
        self.inner.click(node).await
    }
    async fn submit(&self, form: NodeId) -> flowfill::Result<()> {
        self.inner.submit(form).await
    }
    async fn set_effect_mode(&self, mode: EffectMode) -> flowfill::Result<()> {
        self.inner.set_effect_mode(mode).await
    }
    fn release_discovery(&self) {
        self.inner.release_discovery()
    }
    fn mutations(&self) -> watch::Receiver<u64> {
        self.inner.mutations()
    }
}

#[tokio::test]
async fn locators_are_resolved_again_after_a_rerender() {
    let doc = Revalidating::new();
    let step = snapshot::snapshot(&doc, &Heuristics::default()).await.unwrap();
    let mapping = FieldMapping::new()
        .with("[name=\"first\"]", "First")
        .with("[name=\"last\"]", "Last");
    let row = DataRow::new().with("First", "Ann").with("Last", "Lee");

    assert!(fill::fill(&doc, &mapping.apply(&step), &row, &CancellationToken::new())
        .await
        .unwrap());

    assert_eq!(doc.inner.current_page(), 1);
    assert_eq!(doc.inner.value_of("[name=\"first\"]").as_deref(), Some("Ann"));
    assert_eq!(doc.inner.value_of("[name=\"last\"]").as_deref(), Some("Lee"));
}
