#![allow(dead_code)]

use std::time::Duration;

use flowfill::{Behavior, DataRow, Element, FieldMapping, MemoryDocument, MemoryPage};

pub const SIGNUP_URL: &str = "https://forms.test/signup";

fn body(children: impl IntoIterator<Item = Element>) -> Element {
    Element::new("body").children(children)
}

/// Two in-place steps. Submitting step 2 posts and reloads the empty form.
pub fn signup() -> MemoryDocument {
    signup_with(Duration::ZERO)
}

/// Like [`signup`], but step 1 re-renders only after `lag`.
pub fn signup_with(lag: Duration) -> MemoryDocument {
    let step1 = MemoryPage::new(
        SIGNUP_URL,
        "Sign up",
        body([Element::new("form").attr("id", "details").children([
            Element::new("label").attr("for", "first").text("First name"),
            Element::input("first").attr("id", "first"),
            Element::input("last").attr("placeholder", "Last name"),
            Element::button("Next"),
        ])]),
    );
    let to_step2 = if lag.is_zero() {
        Behavior::Show(1)
    } else {
        Behavior::Delayed(lag, Box::new(Behavior::Show(1)))
    };
    let step1 = step1.on_click("form#details > button", vec![to_step2]);

    let step2 = MemoryPage::new(
        SIGNUP_URL,
        "Sign up",
        body([Element::new("form").attr("id", "contact").children([
            Element::input("email").attr("type", "email"),
            Element::button("Submit").attr("type", "submit"),
        ])]),
    )
    .on_click(
        "form#contact > button",
        vec![Behavior::Fetch("/api/signup".into()), Behavior::Navigate(0)],
    );

    MemoryDocument::new(vec![step1, step2])
}

/// One step that posts natively and lands on a page without a form.
pub fn one_way() -> MemoryDocument {
    let form = MemoryPage::new(
        "https://forms.test/contact",
        "Contact",
        body([Element::new("form").children([
            Element::input("first"),
            Element::new("input").attr("type", "submit").attr("value", "Send"),
        ])]),
    )
    .on_submit(vec![Behavior::Navigate(1)]);
    let done = MemoryPage::new(
        "https://forms.test/thanks",
        "Thanks",
        body([Element::new("h1").text("Thanks!")]),
    );
    MemoryDocument::new(vec![form, done])
}

pub fn signup_mapping() -> FieldMapping {
    FieldMapping::new()
        .with("[name=\"first\"]", "First")
        .with("[name=\"last\"]", "Last")
        .with("[name=\"email\"]", "Email")
}

pub fn people() -> Vec<DataRow> {
    vec![
        DataRow::new()
            .with("First", "Ann")
            .with("Last", "Lee")
            .with("Email", "a@x.com"),
        DataRow::new()
            .with("First", "Bo")
            .with("Last", "Ng")
            .with("Email", "b@x.com"),
    ]
}

pub fn numbered_rows(count: usize) -> Vec<DataRow> {
    (1..=count)
        .map(|n| {
            DataRow::new()
                .with("First", format!("First{n}"))
                .with("Last", format!("Last{n}"))
                .with("Email", format!("user{n}@x.com"))
        })
        .collect()
}

pub const APPLY_URL: &str = "https://forms.test/apply";

/// Step 1 has plain `type=button` Back and Next controls; only Next moves on.
/// Step 2 posts natively and reloads the first step.
pub fn back_next() -> MemoryDocument {
    let step1 = MemoryPage::new(
        APPLY_URL,
        "Apply",
        body([Element::new("form").children([
            Element::input("a"),
            Element::new("button")
                .attr("type", "button")
                .attr("id", "back")
                .text("Back"),
            Element::new("button")
                .attr("type", "button")
                .attr("id", "next")
                .text("Next"),
        ])]),
    )
    .on_click("#next", vec![Behavior::Show(1)]);
    let step2 = MemoryPage::new(
        APPLY_URL,
        "Apply",
        body([Element::new("form").children([
            Element::input("b"),
            Element::new("input").attr("type", "submit").attr("value", "Send"),
        ])]),
    )
    .on_submit(vec![
        Behavior::Fetch("/api/apply".into()),
        Behavior::Navigate(0),
    ]);
    MemoryDocument::new(vec![step1, step2])
}
