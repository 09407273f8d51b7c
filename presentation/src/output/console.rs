//! Event sinks that render a run on the terminal

use async_trait::async_trait;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reagent_application::{EventSink, SinkClosed};
use reagent_domain::EventRecord;
use reagent_domain::util::truncate_str;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const ARGS_PREVIEW: usize = 80;

/// Renders events as formatted text, with a spinner per in-flight tool call.
pub struct ConsoleEventSink {
    multi: MultiProgress,
    in_flight: Mutex<HashMap<String, (String, Option<ProgressBar>)>>,
    spinners: bool,
}

impl ConsoleEventSink {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            in_flight: Mutex::new(HashMap::new()),
            spinners: true,
        }
    }

    /// No spinners; tool calls are printed as plain lines.
    pub fn quiet() -> Self {
        Self {
            spinners: false,
            ..Self::new()
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("  {spinner:.green} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn print(&self, line: String) {
        if self.multi.is_hidden() {
            println!("{}", line);
        } else {
            let _ = self.multi.println(line);
        }
    }

    fn render(&self, record: &EventRecord) {
        let payload = &record.payload;
        let call_id = record.call_id.clone().unwrap_or_default();

        match record.event_type.as_str() {
            "tool_call_started" => {
                let name = str_field(payload, "name").to_string();
                let args = preview(&payload["args"]);
                let bar = self.spinners.then(|| {
                    let pb = self.multi.add(ProgressBar::new_spinner());
                    pb.set_style(Self::spinner_style());
                    pb.set_prefix(name.clone());
                    pb.set_message(args.clone());
                    pb.enable_steady_tick(Duration::from_millis(100));
                    pb
                });
                if bar.is_none() {
                    self.print(format!("  {} {} {}", "->".cyan(), name.bold(), args.dimmed()));
                }
                self.lock().insert(call_id, (name, bar));
            }
            "tool_call_finished" => {
                let entry = self.lock().remove(&call_id);
                let name = match entry {
                    Some((name, bar)) => {
                        if let Some(bar) = bar {
                            bar.finish_and_clear();
                        }
                        name
                    }
                    None => call_id,
                };
                if let Some(line) = format_finished(&name, payload) {
                    self.print(line);
                }
            }
            _ => {
                if record.is_terminal() {
                    self.clear_in_flight();
                }
                if let Some(line) = format_record(record) {
                    self.print(line);
                }
            }
        }
    }

    fn clear_in_flight(&self) {
        for (_, (_, bar)) in self.lock().drain() {
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Option<ProgressBar>)>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ConsoleEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for ConsoleEventSink {
    async fn send(&self, record: EventRecord) -> Result<(), SinkClosed> {
        self.render(&record);
        Ok(())
    }
}

/// Writes every record as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct JsonEventSink;

#[async_trait]
impl EventSink for JsonEventSink {
    async fn send(&self, record: EventRecord) -> Result<(), SinkClosed> {
        match serde_json::to_string(&record) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "Event not serializable"),
        }
        Ok(())
    }
}

/// Text for reasoning, answers and errors. Tool events are handled by the
/// sink since they need the in-flight table.
pub fn format_record(record: &EventRecord) -> Option<String> {
    let payload = &record.payload;
    match record.event_type.as_str() {
        "reasoning" => Some(format!("{}", str_field(payload, "text").dimmed().italic())),
        "final_answer" => Some(format!("\n{}\n", str_field(payload, "text"))),
        "session_error" => {
            let kind = str_field(payload, "kind");
            let message = str_field(payload, "message");
            Some(if kind == "cancelled" {
                format!("{}", "Cancelled.".yellow())
            } else {
                format!("{} {}: {}", "Error".red().bold(), kind, message)
            })
        }
        _ => None,
    }
}

fn format_finished(name: &str, payload: &Value) -> Option<String> {
    match str_field(payload, "status") {
        "ok" => Some(format!("  {} {}", "v".green(), name)),
        "error" => {
            let error = &payload["error"];
            Some(format!(
                "  {} {} {}: {}",
                "x".red(),
                name,
                str_field(error, "kind"),
                str_field(error, "message")
            ))
        }
        _ => None,
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn preview(args: &Value) -> String {
    truncate_str(&args.to_string(), ARGS_PREVIEW)
}
