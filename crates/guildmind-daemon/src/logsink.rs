use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use guildmind_core::types::SystemLogRow;

/// tracing layer mirroring WARN/ERROR events into the `system_logs` table.
///
/// The sender slot is filled after the store opens; events before that are
/// console-only. Delivery is `try_send` so logging never blocks a handler.
pub struct StoreLogLayer {
    tx: Arc<OnceLock<mpsc::Sender<SystemLogRow>>>,
    hostname: String,
}

impl StoreLogLayer {
    pub fn new() -> (Self, Arc<OnceLock<mpsc::Sender<SystemLogRow>>>) {
        let tx = Arc::new(OnceLock::new());
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        (
            Self {
                tx: Arc::clone(&tx),
                hostname,
            },
            tx,
        )
    }
}

impl<S: Subscriber> Layer<S> for StoreLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::WARN {
            return;
        }
        let Some(tx) = self.tx.get() else {
            return;
        };

        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        let row = SystemLogRow {
            timestamp: Utc::now(),
            level: meta.level().to_string(),
            logger_name: meta.target().to_string(),
            message: visitor.message,
            module: meta.module_path().map(String::from),
            function: None,
            line: meta.line(),
            exception: visitor.error,
            extra: serde_json::Value::Object(
                visitor
                    .extra
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect(),
            ),
            hostname: self.hostname.clone(),
        };
        let _ = tx.try_send(row);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    error: Option<String>,
    extra: BTreeMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "error" => self.error = Some(format!("{value:?}")),
            name => {
                self.extra.insert(name.to_string(), format!("{value:?}"));
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "error" => self.error = Some(value.to_string()),
            name => {
                self.extra.insert(name.to_string(), value.to_string());
            }
        }
    }
}
