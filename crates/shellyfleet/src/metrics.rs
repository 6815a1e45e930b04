//! Prometheus text-format rendering and the notification cache backing
//! the metrics exporter.

use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use shelly_rpc::StatusNotification;

/// Documented error conditions reported on switch components.
const KNOWN_SWITCH_ERRORS: &[&str] = &["overtemp", "overpower", "overvoltage", "undervoltage"];

/// Documented cover component states.
const COVER_STATES: &[&str] = &["open", "closed", "opening", "closing", "stopped", "calibrating"];

pub const DEFAULT_NAMESPACE: &str = "shelly";
pub const DEFAULT_SUBSYSTEM: &str = "status";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// One device's component statuses, from a probe or a notification.
pub struct DeviceStatus {
    pub instance: String,
    pub device_name: String,
    pub mac: String,
    /// Component map (`"switch:0"` → status object).
    pub components: Value,
}

// ── Notification cache ───────────────────────────────────────────────

/// TTL-bounded cache of status notifications.
///
/// Purging keys off the local arrival time, not the device timestamp;
/// device clocks skew and are sometimes plain wrong.
pub struct NotificationCache {
    entries: Mutex<VecDeque<(Instant, StatusNotification)>>,
    ttl: Duration,
}

impl NotificationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            ttl,
        }
    }

    pub fn push(&self, notification: StatusNotification) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache poisoned");
        entries.push_back((now, notification));
        Self::purge(&mut entries, now, self.ttl);
    }

    pub fn snapshot(&self) -> Vec<StatusNotification> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache poisoned");
        Self::purge(&mut entries, now, self.ttl);
        entries.iter().map(|(_, n)| n.clone()).collect()
    }

    fn purge(entries: &mut VecDeque<(Instant, StatusNotification)>, now: Instant, ttl: Duration) {
        // Arrival-ordered, so stop at the first fresh entry.
        while let Some((arrived, _)) = entries.front() {
            if now.duration_since(*arrived) > ttl {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────

struct MetricsWriter {
    buf: String,
    prefix: String,
    announced: HashSet<String>,
}

impl MetricsWriter {
    fn new(namespace: &str, subsystem: &str) -> Self {
        Self {
            buf: String::new(),
            prefix: format!("{namespace}_{subsystem}"),
            announced: HashSet::new(),
        }
    }

    fn gauge(&mut self, name: &str, help: &str, labels: &[(&str, &str)], value: f64) {
        let full = format!("{}_{name}", self.prefix);
        if self.announced.insert(full.clone()) {
            let _ = writeln!(self.buf, "# HELP {full} {help}");
            let _ = writeln!(self.buf, "# TYPE {full} gauge");
        }
        let rendered: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
            .collect();
        let _ = writeln!(self.buf, "{full}{{{}}} {value}", rendered.join(","));
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Render every device status into the Prometheus text exposition
/// format (version 0.0.4).
pub fn render(namespace: &str, subsystem: &str, statuses: &[DeviceStatus]) -> String {
    let mut writer = MetricsWriter::new(namespace, subsystem);

    for status in statuses {
        let Value::Object(components) = &status.components else {
            continue;
        };
        for (key, component_status) in components {
            let (component, id) = match key.split_once(':') {
                Some((component, id)) => (component, id),
                None => (key.as_str(), "0"),
            };
            let base_labels = [
                ("instance", status.instance.as_str()),
                ("device_name", status.device_name.as_str()),
                ("mac", status.mac.as_str()),
                ("component", component),
                ("id", id),
            ];
            match component {
                "switch" => render_switch(&mut writer, &base_labels, component_status),
                "cover" => render_cover(&mut writer, &base_labels, component_status),
                "input" => render_input(&mut writer, &base_labels, component_status),
                "temperature" => {
                    if let Some(celsius) = component_status["tC"].as_f64() {
                        writer.gauge(
                            "temperature_celsius",
                            "Temperature reading in degrees celsius.",
                            &base_labels,
                            celsius,
                        );
                    }
                }
                "humidity" => {
                    if let Some(rh) = component_status["rh"].as_f64() {
                        writer.gauge(
                            "relative_humidity_percent",
                            "Relative humidity reading.",
                            &base_labels,
                            rh,
                        );
                    }
                }
                "devicepower" => {
                    if let Some(percent) = component_status["battery"]["percent"].as_f64() {
                        writer.gauge(
                            "battery_percent",
                            "Remaining battery charge.",
                            &base_labels,
                            percent,
                        );
                    }
                }
                _ => {}
            }
        }
    }
    writer.buf
}

fn render_switch(writer: &mut MetricsWriter, labels: &[(&str, &str)], status: &Value) {
    if let Some(output) = status["output"].as_bool() {
        writer.gauge(
            "switch_output_on",
            "1 if the switch output is on; 0 if off.",
            labels,
            bool_value(output),
        );
    }
    if let Some(power) = status["apower"].as_f64() {
        writer.gauge(
            "instantaneous_active_power_watts",
            "Last measured instantaneous active power in watts.",
            labels,
            power,
        );
    }
    if let Some(voltage) = status["voltage"].as_f64() {
        writer.gauge("voltage_volts", "Last measured voltage.", labels, voltage);
    }
    if let Some(current) = status["current"].as_f64() {
        writer.gauge(
            "current_amperes",
            "Last measured current in amperes.",
            labels,
            current,
        );
    }
    if let Some(total) = status["aenergy"]["total"].as_f64() {
        writer.gauge(
            "total_energy_watt_hours",
            "Accumulated energy in watt-hours.",
            labels,
            total,
        );
    }
    if let Some(celsius) = status["temperature"]["tC"].as_f64() {
        writer.gauge(
            "component_temperature_celsius",
            "Component temperature in degrees celsius.",
            labels,
            celsius,
        );
    }
    let active: HashSet<&str> = status["errors"]
        .as_array()
        .map(|errors| errors.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    for error in KNOWN_SWITCH_ERRORS {
        let mut error_labels = labels.to_vec();
        error_labels.push(("error", error));
        writer.gauge(
            "switch_error",
            "1 if the switch reports the error condition; 0 otherwise.",
            &error_labels,
            bool_value(active.contains(error)),
        );
    }
}

fn render_cover(writer: &mut MetricsWriter, labels: &[(&str, &str)], status: &Value) {
    if let Some(position) = status["current_pos"].as_f64() {
        writer.gauge(
            "cover_position",
            "Cover position; 0 is fully closed, 100 fully open. Requires calibration.",
            labels,
            position,
        );
    }
    if let Some(pos_control) = status["pos_control"].as_bool() {
        writer.gauge(
            "cover_position_control_enabled",
            "1 if the cover is calibrated for position control.",
            labels,
            bool_value(pos_control),
        );
    }
    let current_state = status["state"].as_str().unwrap_or_default();
    for state in COVER_STATES {
        let mut state_labels = labels.to_vec();
        state_labels.push(("state", state));
        writer.gauge(
            "cover_state",
            "1 for the cover's current state; 0 for all other states.",
            &state_labels,
            bool_value(current_state == *state),
        );
    }
    if let Some(power) = status["apower"].as_f64() {
        writer.gauge(
            "instantaneous_active_power_watts",
            "Last measured instantaneous active power in watts.",
            labels,
            power,
        );
    }
    if let Some(total) = status["aenergy"]["total"].as_f64() {
        writer.gauge(
            "total_energy_watt_hours",
            "Accumulated energy in watt-hours.",
            labels,
            total,
        );
    }
}

fn render_input(writer: &mut MetricsWriter, labels: &[(&str, &str)], status: &Value) {
    if let Some(state) = status["state"].as_bool() {
        writer.gauge(
            "input_state_on",
            "1 if the input is active; 0 if not.",
            labels,
            bool_value(state),
        );
    }
    if let Some(percent) = status["percent"].as_f64() {
        writer.gauge(
            "input_percent",
            "Analog input value in percent.",
            labels,
            percent,
        );
    }
    if let Some(xpercent) = status["xpercent"].as_f64() {
        writer.gauge(
            "input_xpercent",
            "Transformed analog input value.",
            labels,
            xpercent,
        );
    }
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(components: Value) -> DeviceStatus {
        DeviceStatus {
            instance: "http://192.0.2.10/rpc".into(),
            device_name: "porch".into(),
            mac: "AABBCCDDEEFF".into(),
            components,
        }
    }

    #[test]
    fn switch_metrics_render_with_labels() {
        let body = render(
            "shelly",
            "status",
            &[status(json!({
                "switch:0": {
                    "id": 0,
                    "output": true,
                    "apower": 12.5,
                    "aenergy": {"total": 8.25},
                    "errors": ["overtemp"]
                }
            }))],
        );
        assert!(body.contains("# TYPE shelly_status_switch_output_on gauge"));
        assert!(body.contains(
            "shelly_status_switch_output_on{instance=\"http://192.0.2.10/rpc\",device_name=\"porch\",mac=\"AABBCCDDEEFF\",component=\"switch\",id=\"0\"} 1"
        ));
        assert!(body.contains("shelly_status_total_energy_watt_hours"));
        assert!(body.contains("error=\"overtemp\"} 1"));
        assert!(body.contains("error=\"overpower\"} 0"));
    }

    #[test]
    fn cover_state_is_one_hot() {
        let body = render(
            "shelly",
            "status",
            &[status(json!({
                "cover:0": {"id": 0, "state": "opening", "current_pos": 40.0}
            }))],
        );
        assert!(body.contains("state=\"opening\"} 1"));
        assert!(body.contains("state=\"closed\"} 0"));
        assert!(body.contains("shelly_status_cover_position{"));
    }

    #[test]
    fn help_and_type_are_announced_once() {
        let body = render(
            "shelly",
            "status",
            &[
                status(json!({"switch:0": {"id": 0, "output": true}})),
                status(json!({"switch:0": {"id": 0, "output": false}})),
            ],
        );
        assert_eq!(body.matches("# TYPE shelly_status_switch_output_on").count(), 1);
    }

    #[test]
    fn cache_purges_by_arrival_time() {
        let cache = NotificationCache::new(Duration::ZERO);
        let notification: StatusNotification = StatusNotification {
            status: serde_json::from_value(json!({"ts": 1.0})).unwrap(),
            frame: shelly_rpc::Frame::default(),
        };
        cache.push(notification);
        // TTL of zero: everything is expired by snapshot time.
        assert!(cache.snapshot().is_empty());
    }
}
