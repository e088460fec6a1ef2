//! Control message dispatch — parse s-expressions and route to handlers.

use lexpr::Value;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::state::MonitorState;

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message<C: Clock>(state: &mut MonitorState<C>, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);
    state.control_messages += 1;
    debug!("control message {:?} (id {})", msg_type, msg_id);

    match msg_type.as_deref() {
        Some("ping") => handle_ping(msg_id, &value),
        Some("fatigue-status") => handle_fatigue_status(state, msg_id),
        Some("fatigue-config") => handle_fatigue_config(state, msg_id),
        Some("fatigue-metrics") => handle_fatigue_metrics(state, msg_id),
        Some("fatigue-reset") => handle_fatigue_reset(state, msg_id),
        Some(other) => {
            warn!("unknown message type: {}", other);
            Some(error_response(msg_id, &format!("unknown message type: {other}")))
        }
        None => Some(error_response(msg_id, "missing :type")),
    }
}

fn handle_ping(msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    let server_ts = chrono::Utc::now().timestamp_millis();

    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id, client_ts, server_ts
    ))
}

// ── Fatigue handlers ───────────────────────────────────────

fn handle_fatigue_status<C: Clock>(state: &mut MonitorState<C>, msg_id: i64) -> Option<String> {
    let status = state.engine.snapshot().to_sexp();
    Some(format!(
        "(:type :response :id {} :status :ok :fatigue {})",
        msg_id, status
    ))
}

fn handle_fatigue_config<C: Clock>(state: &mut MonitorState<C>, msg_id: i64) -> Option<String> {
    let config = state.engine.config().config_sexp();
    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id, config
    ))
}

fn handle_fatigue_metrics<C: Clock>(state: &mut MonitorState<C>, msg_id: i64) -> Option<String> {
    let metrics = state.engine.metrics_sexp();
    Some(format!(
        "(:type :response :id {} :status :ok :metrics {} :ticks {} :session-s {:.1} :playback :{})",
        msg_id,
        metrics,
        state.ticks,
        state.session_s(),
        state.alarm.mode().as_str()
    ))
}

fn handle_fatigue_reset<C: Clock>(state: &mut MonitorState<C>, msg_id: i64) -> Option<String> {
    info!("fatigue reset requested over control channel");
    state.reset();
    Some(ok_response(msg_id))
}

// ── Helpers ────────────────────────────────────────────────

fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract a keyword value from an s-expression plist.
/// Accepts both `Value::Keyword("key")` and `Value::Symbol(":key")`
/// spellings of the key.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return match val {
                Value::Keyword(v) => Some(v.to_string()),
                Value::Symbol(v) => {
                    let s = v.to_string();
                    Some(s.strip_prefix(':').unwrap_or(&s).to_string())
                }
                Value::String(v) => Some(v.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
                Value::Null | Value::Nil => Some("nil".to_string()),
                _ => Some(val.to_string()),
            };
        }
        current = pair.cdr();
    }
    None
}

/// Extract an integer value from an s-expression plist.
fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Format a control-channel event s-expression.
pub fn format_event(event_type: &str, fields: &[(&str, &str)]) -> String {
    let mut s = format!("(:type :event :event :{}", event_type);
    for (key, val) in fields {
        s.push_str(&format!(" :{} {}", key, val));
    }
    s.push(')');
    s
}
