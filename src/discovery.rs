//! Scoped discovery mode: network and submission primitives are inert for the
//! duration of a future and are restored on every exit path.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::dom::{Document, EffectMode};
use crate::error::Result;

/// Hands the document back to live mode if the scope is dropped mid-flight.
struct LiveOnDrop<'a, D: Document + ?Sized> {
    doc: &'a D,
    armed: bool,
}

impl<D: Document + ?Sized> Drop for LiveOnDrop<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("discovery scope dropped, releasing discovery mode");
            self.doc.release_discovery();
        }
    }
}

/// Run `work` with the document in discovery mode.
///
/// Live behavior is restored after `work` finishes, whether it returned `Ok`,
/// returned `Err`, or panicked; a panic is resumed once the document is
/// restored. If the returned future is dropped before completing, the
/// document is released through [`Document::release_discovery`]. An error
/// from `work` takes precedence over an error while restoring.
pub async fn scoped<D, F, T>(doc: &D, work: F) -> Result<T>
where
    D: Document + ?Sized,
    F: Future<Output = Result<T>>,
{
    let mut guard = LiveOnDrop { doc, armed: true };
    doc.set_effect_mode(EffectMode::Discovery).await?;
    tracing::debug!("discovery mode on");

    let outcome = AssertUnwindSafe(work).catch_unwind().await;
    let restored = doc.set_effect_mode(EffectMode::Live).await;
    guard.armed = false;
    tracing::debug!(ok = restored.is_ok(), "discovery mode off");

    match outcome {
        Ok(result) => {
            let value = result?;
            restored?;
            Ok(value)
        }
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
