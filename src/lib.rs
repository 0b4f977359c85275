//! Discover the steps of a multi-step web form and replay rows of tabular
//! data through them.
//!
//! Discovery walks the flow with side effects suppressed and records one
//! [`PageSnapshot`] per step. Replay fills each step from a [`DataRow`],
//! activates the advance control and waits for the next step to appear.
//! Both run against any [`Document`]: a Chrome tab ([`Page`]) or a scripted
//! [`MemoryDocument`].

pub mod browser;
pub mod config;
pub mod discovery;
pub mod dom;
pub mod engine;
pub mod error;
pub mod events;
pub mod fill;
pub mod heuristics;
mod instrument;
pub mod memory;
pub mod model;
pub mod page;
pub mod protocol;
pub mod scan;
pub mod selector;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod tabular;

pub use browser::FlowBrowser;
pub use config::{BrowserBuilder, BrowserConfig, ReplayConfig, ScanConfig};
pub use dom::{Document, DomEvent, DomNode, DomTree, EffectMode, NodeId};
pub use engine::{BulkJob, BulkRunner, RunProgress, RunState, RunStatus, ScanLease};
pub use error::{Error, Result};
pub use events::{Event, EventBus, RunSummary};
pub use heuristics::{AdvanceHeuristic, FormHeuristic, Heuristics};
pub use memory::{Behavior, Element, MemoryDocument, MemoryPage};
pub use model::{
    DataRow, DataSet, FieldDescriptor, FieldMapping, FieldTag, Flow, MappedField, PageSnapshot,
};
pub use page::Page;
pub use protocol::{Agent, Request, Response};
pub use scan::FlowScanner;
pub use store::MappingStore;
pub use sync::{ArrivalTrigger, StepArrival, StepSynchronizer};
pub use tabular::Table;
