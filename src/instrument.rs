use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page as CrPage;

use crate::error::{Error, Result};

/// Install the page-side helpers so they run before any site JS, and in the
/// document that is already loaded.
pub async fn apply_instrumentation(page: &CrPage) -> Result<()> {
    let params = AddScriptToEvaluateOnNewDocumentParams::new(INSTRUMENT_JS);
    page.execute(params)
        .await
        .map_err(|e| Error::JsError(format!("Failed to inject instrumentation: {e}")))?;
    page.evaluate(INSTRUMENT_JS)
        .await
        .map_err(|e| Error::JsError(format!("Failed to instrument current document: {e}")))?;
    Ok(())
}

pub(crate) const ENTER_DISCOVERY_JS: &str = "window.__flowfill && window.__flowfill.enter()";
pub(crate) const EXIT_DISCOVERY_JS: &str = "window.__flowfill && window.__flowfill.exit()";
pub(crate) const MUTATION_COUNT_JS: &str =
    "window.__flowfill ? window.__flowfill.state.mutations : -1";

/// Reads every element in document order; index in the array is the node id.
pub(crate) const TREE_JS: &str = r#"
JSON.stringify((() => {
    const all = Array.from(document.querySelectorAll('*'));
    const index = new Map(all.map((el, i) => [el, i]));
    return all.map(el => ({
        tag: el.tagName.toLowerCase(),
        attrs: Object.fromEntries(Array.from(el.attributes).map(a => [a.name, a.value])),
        text: Array.from(el.childNodes)
            .filter(n => n.nodeType === Node.TEXT_NODE)
            .map(n => n.textContent)
            .join(' '),
        rendered: el.offsetParent !== null || el.getClientRects().length > 0,
        value: ('value' in el && typeof el.value === 'string') ? el.value : '',
        checked: !!el.checked,
        parent: el.parentElement ? index.get(el.parentElement) : null,
    }));
})())
"#;

/// Discovery switch and mutation counter. Discovery mode survives a
/// same-tab navigation through session storage.
static INSTRUMENT_JS: &str = r#"
(() => {
    if (window.__flowfill) return;
    const FLAG = '__flowfillDiscovery';
    const real = {
        fetch: window.fetch,
        xhrSend: XMLHttpRequest.prototype.send,
        beacon: navigator.sendBeacon ? navigator.sendBeacon.bind(navigator) : null,
        submit: HTMLFormElement.prototype.submit,
        requestSubmit: HTMLFormElement.prototype.requestSubmit,
    };
    const state = { discovery: false, mutations: 0 };

    window.addEventListener('submit', (e) => {
        if (state.discovery) {
            e.preventDefault();
            e.stopImmediatePropagation();
        }
    }, true);

    function enter() {
        state.discovery = true;
        try { sessionStorage.setItem(FLAG, '1'); } catch (_) {}
        window.fetch = () => new Promise(() => {});
        XMLHttpRequest.prototype.send = function () {};
        if (real.beacon) navigator.sendBeacon = () => false;
        HTMLFormElement.prototype.submit = function () {};
        if (real.requestSubmit) HTMLFormElement.prototype.requestSubmit = function () {};
    }

    function exit() {
        state.discovery = false;
        try { sessionStorage.removeItem(FLAG); } catch (_) {}
        window.fetch = real.fetch;
        XMLHttpRequest.prototype.send = real.xhrSend;
        if (real.beacon) navigator.sendBeacon = real.beacon;
        HTMLFormElement.prototype.submit = real.submit;
        if (real.requestSubmit) HTMLFormElement.prototype.requestSubmit = real.requestSubmit;
    }

    new MutationObserver(() => { state.mutations += 1; })
        .observe(document, { childList: true, subtree: true, attributes: true });

    window.__flowfill = { enter, exit, state };
    try { if (sessionStorage.getItem(FLAG) === '1') enter(); } catch (_) {}
})();
"#;

/// Expression that yields the element with document-order index `index`.
pub(crate) fn node_expr(index: usize) -> String {
    format!(
        "(() => {{ const el = document.querySelectorAll('*')[{index}]; \
         if (!el) throw new Error('stale node {index}'); return el; }})()"
    )
}
