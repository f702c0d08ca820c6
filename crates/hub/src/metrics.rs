use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};

pub struct HubMetrics {
    ws_duration_count: Mutex<HashMap<String, u64>>,
    ws_duration_sum_ms: Mutex<HashMap<String, u64>>,
    ws_errors_total: Mutex<HashMap<String, u64>>,
    ws_rate_total: Mutex<HashMap<String, u64>>,
    connected_connections: AtomicU64,
    active_rooms: AtomicU64,
    store_errors_total: AtomicU64,
}

static GLOBAL_METRICS: OnceLock<Arc<HubMetrics>> = OnceLock::new();

impl Default for HubMetrics {
    fn default() -> Self {
        Self {
            ws_duration_count: Mutex::new(HashMap::new()),
            ws_duration_sum_ms: Mutex::new(HashMap::new()),
            ws_errors_total: Mutex::new(HashMap::new()),
            ws_rate_total: Mutex::new(HashMap::new()),
            connected_connections: AtomicU64::new(0),
            active_rooms: AtomicU64::new(0),
            store_errors_total: AtomicU64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<HubMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

pub fn global_metrics() -> Option<&'static Arc<HubMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_ws_event(event: &str, is_error: bool, latency_ms: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_ws_event(event, is_error, latency_ms);
    }
}

pub fn set_connection_count(count: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.set_connection_count(count);
    }
}

pub fn set_room_count(count: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.set_room_count(count);
    }
}

pub fn increment_store_errors() {
    if let Some(metrics) = global_metrics() {
        metrics.increment_store_errors();
    }
}

impl HubMetrics {
    pub fn record_ws_event(&self, event: &str, is_error: bool, latency_ms: u64) {
        let label = normalize_event_label(event);
        increment_counter(&self.ws_rate_total, &label, 1);
        increment_counter(&self.ws_duration_sum_ms, &label, latency_ms);
        increment_counter(&self.ws_duration_count, &label, 1);
        if is_error {
            increment_counter(&self.ws_errors_total, &label, 1);
        }
    }

    pub fn set_connection_count(&self, count: u64) {
        self.connected_connections.store(count, Ordering::SeqCst);
    }

    pub fn set_room_count(&self, count: u64) {
        self.active_rooms.store(count, Ordering::SeqCst);
    }

    pub fn increment_store_errors(&self) {
        self.store_errors_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP hub_ws_rate_total Total websocket events by type.\n");
        output.push_str("# TYPE hub_ws_rate_total counter\n");
        append_counter_lines(&mut output, "hub_ws_rate_total", &self.ws_rate_total);

        output.push_str("# HELP hub_ws_errors_total Total websocket event errors by type.\n");
        output.push_str("# TYPE hub_ws_errors_total counter\n");
        append_counter_lines(&mut output, "hub_ws_errors_total", &self.ws_errors_total);

        output.push_str(
            "# HELP hub_ws_duration_ms_sum Sum of websocket event latency in milliseconds by type.\n",
        );
        output.push_str("# TYPE hub_ws_duration_ms_sum counter\n");
        append_counter_lines(&mut output, "hub_ws_duration_ms_sum", &self.ws_duration_sum_ms);

        output.push_str(
            "# HELP hub_ws_duration_ms_count Count of websocket latency samples by type.\n",
        );
        output.push_str("# TYPE hub_ws_duration_ms_count counter\n");
        append_counter_lines(&mut output, "hub_ws_duration_ms_count", &self.ws_duration_count);

        output.push_str("# HELP hub_connected_connections Currently registered connections.\n");
        output.push_str("# TYPE hub_connected_connections gauge\n");
        output.push_str(&format!(
            "hub_connected_connections {}\n",
            self.connected_connections.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP hub_active_rooms Rooms with at least one member.\n");
        output.push_str("# TYPE hub_active_rooms gauge\n");
        output
            .push_str(&format!("hub_active_rooms {}\n", self.active_rooms.load(Ordering::SeqCst)));

        output.push_str("# HELP hub_store_errors_total Shared store operations that failed.\n");
        output.push_str("# TYPE hub_store_errors_total counter\n");
        output.push_str(&format!(
            "hub_store_errors_total {}\n",
            self.store_errors_total.load(Ordering::SeqCst)
        ));

        output
    }
}

fn normalize_event_label(event: &str) -> String {
    let normalized = event.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized
    }
}

fn increment_counter(map: &Mutex<HashMap<String, u64>>, label: &str, delta: u64) {
    let mut guard = map.lock().expect("metrics map lock poisoned");
    let value = guard.entry(label.to_string()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn append_counter_lines(output: &mut String, metric_name: &str, map: &Mutex<HashMap<String, u64>>) {
    let guard = map.lock().expect("metrics map lock poisoned");
    if guard.is_empty() {
        return;
    }

    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (label, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{event=\"{}\"}} {value}\n",
            escape_label_value(label),
        ));
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}
