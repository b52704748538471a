use serde::{ Deserialize, Serialize };
use std::time::Duration;

/// Timing and token counts reported on the final `done` object. Durations
/// are nanoseconds.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerationStats {
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

impl GenerationStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn eval_rate(&self) -> Option<f64> {
        rate(self.eval_count, self.eval_duration)
    }

    pub fn prompt_eval_rate(&self) -> Option<f64> {
        rate(self.prompt_eval_count, self.prompt_eval_duration)
    }

    /// Multi-line summary in the layout of `ollama run --verbose`.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ns) = self.total_duration {
            lines.push(row("total duration", fmt_duration(ns)));
        }
        if let Some(ns) = self.load_duration {
            lines.push(row("load duration", fmt_duration(ns)));
        }
        if let Some(count) = self.prompt_eval_count {
            lines.push(row("prompt eval count", format!("{} token(s)", count)));
        }
        if let Some(ns) = self.prompt_eval_duration {
            lines.push(row("prompt eval duration", fmt_duration(ns)));
        }
        if let Some(r) = self.prompt_eval_rate() {
            lines.push(row("prompt eval rate", format!("{:.2} tokens/s", r)));
        }
        if let Some(count) = self.eval_count {
            lines.push(row("eval count", format!("{} token(s)", count)));
        }
        if let Some(ns) = self.eval_duration {
            lines.push(row("eval duration", fmt_duration(ns)));
        }
        if let Some(r) = self.eval_rate() {
            lines.push(row("eval rate", format!("{:.2} tokens/s", r)));
        }
        lines.join("\n")
    }
}

fn rate(count: Option<u64>, duration_ns: Option<u64>) -> Option<f64> {
    match (count, duration_ns) {
        (Some(c), Some(d)) if d > 0 => Some((c as f64) / Duration::from_nanos(d).as_secs_f64()),
        _ => None,
    }
}

fn fmt_duration(ns: u64) -> String {
    format!("{:?}", Duration::from_nanos(ns))
}

fn row(label: &str, value: String) -> String {
    format!("{:<22}{}", format!("{}:", label), value)
}
