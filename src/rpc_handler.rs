//! RPC method handler for the visitlog JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! `handle_method` dispatches a method name to the history store.

use serde_json::{json, Value};

use crate::managers::history_store::HistoryStore;
use crate::types::entry::Entry;

fn entry_json(entry: &Entry) -> Value {
    json!({
        "address": entry.address,
        "lastVisited": entry.last_visited,
        "visitCount": entry.visit_count,
    })
}

fn entries_json(entries: &[Entry]) -> Value {
    Value::Array(entries.iter().map(entry_json).collect())
}

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

fn u64_param(params: &Value, name: &str) -> Result<u64, String> {
    params
        .get(name)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| format!("missing {}", name))
}

/// Dispatch a JSON-RPC method call to the history store.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub fn handle_method(history: &HistoryStore, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "history.record" => {
            let address = str_param(params, "address")?;
            if address.trim().is_empty() {
                return Err("invalid address: must not be empty".to_string());
            }
            let ok = history.record_visit(address);
            Ok(json!({"ok": ok, "generation": history.generation()}))
        }
        "history.remove" => {
            let address = str_param(params, "address")?;
            Ok(json!({"removed": history.remove_by_address(address)}))
        }
        "history.clear" => {
            history.clear();
            Ok(json!({"ok": true}))
        }
        "history.count" => Ok(json!(history.count())),
        "history.entry_at" => {
            let index = u64_param(params, "index")? as usize;
            match history.entry_at(index) {
                Some(entry) => Ok(entry_json(&entry)),
                None => Err(format!("index out of range: {}", index)),
            }
        }
        "history.list" => Ok(entries_json(&history.entries())),
        "history.search" => {
            let query = str_param(params, "query")?;
            Ok(entries_json(&history.search(query)))
        }
        "history.day" => {
            let date = str_param(params, "date")?;
            let entries = history.entries_on_day(date).map_err(|e| e.to_string())?;
            Ok(entries_json(&entries))
        }
        "history.set_max_age" => {
            let days = u64_param(params, "days")?;
            let days = u32::try_from(days).map_err(|_| format!("days out of range: {}", days))?;
            history.set_max_age(days);
            Ok(json!({"maxAgeDays": history.max_age()}))
        }
        "history.max_age" => Ok(json!(history.max_age())),
        "history.generation" => Ok(json!(history.generation())),
        _ => Err(format!("unknown method: {}", method)),
    }
}
