//! Line-oriented exposition format parser
//!
//! Each sample line is `name value` or `name{label="v",...} value`. The value
//! is taken after the last whitespace. Malformed lines are skipped one by one.

use std::collections::HashMap;
use tracing::{debug, trace};

use super::{DatabaseStatus, MetricSet, COMMANDS_TOTAL, MYSQL_UP};

/// Turns an exporter payload into a [`MetricSet`]
#[derive(Debug, Clone)]
pub struct MetricsTextParser {
    /// Gauge whose value 1.0 means the database is up
    liveness_metric: String,

    /// Counter registered as `<name>_<label value>` instead of by bare name
    command_metric: String,
}

impl Default for MetricsTextParser {
    fn default() -> Self {
        Self::new(MYSQL_UP, COMMANDS_TOTAL)
    }
}

impl MetricsTextParser {
    /// Create a parser with custom liveness and per-command metric names
    pub fn new(liveness_metric: &str, command_metric: &str) -> Self {
        Self {
            liveness_metric: liveness_metric.to_string(),
            command_metric: command_metric.to_string(),
        }
    }

    /// Parse a raw payload. Empty input yields a DOWN set without metrics.
    pub fn parse(&self, raw: &str, source_label: &str) -> MetricSet {
        let mut set = MetricSet::down(source_label);
        if raw.trim().is_empty() {
            return set;
        }

        let mut skipped = 0usize;
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !self.parse_line(line, &mut set.metrics, &mut set.info) {
                skipped += 1;
                trace!(source = source_label, line, "Skipping malformed metric line");
            }
        }

        set.status = match set.metrics.get(&self.liveness_metric) {
            Some(value) if *value == 1.0 => DatabaseStatus::Up,
            _ => DatabaseStatus::Down,
        };

        debug!(
            source = source_label,
            metrics = set.metrics.len(),
            skipped,
            status = ?set.status,
            "Parsed exporter payload"
        );

        set
    }

    /// Returns false when the line was discarded
    fn parse_line(
        &self,
        line: &str,
        metrics: &mut HashMap<String, f64>,
        info: &mut HashMap<String, String>,
    ) -> bool {
        let Some(split_at) = line.rfind(char::is_whitespace) else {
            return false;
        };

        let key_part = line[..split_at].trim_end();
        let Ok(value) = line[split_at..].trim().parse::<f64>() else {
            return false;
        };
        if key_part.is_empty() {
            return false;
        }

        let Some(brace) = key_part.find('{') else {
            metrics.insert(key_part.to_string(), value);
            return true;
        };

        if !key_part.ends_with('}') {
            return false;
        }

        let name = key_part[..brace].trim();
        if name.is_empty() {
            return false;
        }
        let labels = parse_labels(&key_part[brace + 1..key_part.len() - 1]);

        if name == self.command_metric {
            let command = labels
                .iter()
                .find(|(label, _)| label == "command")
                .or_else(|| labels.first());

            return match command {
                Some((_, command)) => {
                    metrics.insert(format!("{}_{}", name, command.to_lowercase()), value);
                    true
                }
                None => false,
            };
        }

        metrics.insert(name.to_string(), value);
        for (label, label_value) in labels {
            info.insert(format!("{}_{}", name, label), label_value);
        }
        true
    }
}

/// Split `a="x",b="y,z"` into pairs, honouring quotes and escapes
fn parse_labels(block: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in block.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                push_label(&current, &mut pairs);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_label(&current, &mut pairs);

    pairs
}

fn push_label(raw: &str, pairs: &mut Vec<(String, String)>) {
    let Some((key, value)) = raw.split_once('=') else {
        return;
    };
    let key = key.trim();
    if key.is_empty() {
        return;
    }
    pairs.push((key.to_string(), value.trim().replace('"', "")));
}
