//! Request/response surface between a control client and the automation side.
//!
//! Failures are reported inside the response, never as `Err`. Progress and
//! log lines travel separately on the [`EventBus`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ReplayConfig, ScanConfig};
use crate::dom::Document;
use crate::engine::{BulkJob, BulkRunner, RunProgress, RunState};
use crate::events::EventBus;
use crate::heuristics::Heuristics;
use crate::model::{DataSet, FieldDescriptor, FieldMapping, Flow};
use crate::scan::FlowScanner;
use crate::snapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    DetectFields,
    #[serde(rename_all = "camelCase")]
    ScanFlow { max_steps: Option<usize> },
    #[serde(rename_all = "camelCase")]
    StartBulk {
        flow: Flow,
        rows: DataSet,
        mapping: FieldMapping,
        delay_ms: Option<u64>,
    },
    StopBulk,
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Fields { ok: bool, fields: Vec<FieldDescriptor> },
    Flow { ok: bool, flow: Flow },
    Started { accepted: bool },
    Stopped { acknowledged: bool },
    Status { progress: RunProgress },
    Error { ok: bool, message: String },
}

impl Response {
    fn error(message: impl ToString) -> Self {
        Response::Error {
            ok: false,
            message: message.to_string(),
        }
    }
}

/// Automation side of the messaging interface, bound to one document.
pub struct Agent<D: ?Sized> {
    doc: Arc<D>,
    heuristics: Arc<Heuristics>,
    events: EventBus,
    scan_config: ScanConfig,
    runner: BulkRunner<D>,
}

impl<D: Document + ?Sized + 'static> Agent<D> {
    pub fn new(doc: Arc<D>) -> Self {
        Self::with_config(doc, ScanConfig::default(), ReplayConfig::default())
    }

    pub fn with_config(
        doc: Arc<D>,
        scan_config: ScanConfig,
        replay_config: ReplayConfig,
    ) -> Self {
        let heuristics = Arc::new(Heuristics::default());
        let events = EventBus::new();
        let state = Arc::new(RunState::new());
        let runner = BulkRunner::new(Arc::clone(&doc), state, events.clone())
            .with_config(replay_config)
            .with_heuristics(Arc::clone(&heuristics));
        Self {
            doc,
            heuristics,
            events,
            scan_config,
            runner,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn runner(&self) -> &BulkRunner<D> {
        &self.runner
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::DetectFields => {
                match snapshot::snapshot(self.doc.as_ref(), &self.heuristics).await {
                    Ok(snap) => Response::Fields {
                        ok: true,
                        fields: snap.fields,
                    },
                    Err(err) => Response::error(err),
                }
            }
            Request::ScanFlow { max_steps } => {
                let Ok(_lease) = self.runner.state().begin_scan() else {
                    return Response::error("cannot scan while a scan or bulk run is in progress");
                };
                let mut config = self.scan_config.clone();
                if let Some(max) = max_steps {
                    config.max_steps = max;
                }
                let scanner = FlowScanner::new(&self.heuristics, config).with_events(&self.events);
                match scanner.scan(self.doc.as_ref()).await {
                    Ok(flow) => Response::Flow { ok: true, flow },
                    Err(err) => Response::error(err),
                }
            }
            Request::StartBulk {
                flow,
                rows,
                mapping,
                delay_ms,
            } => {
                let job = BulkJob {
                    flow,
                    rows,
                    mapping,
                    delay_ms,
                };
                match self.runner.start(job) {
                    Ok(_) => Response::Started { accepted: true },
                    Err(err) => {
                        self.events.log(err.to_string());
                        Response::Started { accepted: false }
                    }
                }
            }
            Request::StopBulk => {
                if !self.runner.stop() {
                    tracing::debug!("stop requested while idle");
                }
                Response::Stopped { acknowledged: true }
            }
            Request::Status => Response::Status {
                progress: self.runner.state().progress(),
            },
        }
    }

    /// Decode a JSON request, handle it and encode the response.
    pub async fn handle_json(&self, raw: &str) -> String {
        let response = match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => Response::error(format!("invalid request: {err}")),
        };
        serde_json::to_string(&response)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","ok":false,"message":"{e}"}}"#))
    }
}
