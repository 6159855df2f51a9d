//! Schema validation for `config.json`.
//!
//! Walks the parsed JSON and collects every violation as a JSON-pointer
//! path plus message, so a broken config is reported in one pass instead of
//! failing on the first bad field.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::CONFIG_VERSION;

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9_-]+$").expect("slug regex"))
}

const PRESETS: &[&str] = &["none", "coding", "messaging", "full", "custom"];
const HEARTBEAT_MODES: &[&str] = &["check", "work"];

/// Validates the whole config value. Returns the collected violations;
/// empty means the config deserializes cleanly into [`crate::Config`].
pub fn validate(value: &Value) -> Vec<String> {
    let mut out = Vec::new();

    let Some(root) = value.as_object() else {
        out.push("/: expected object".to_string());
        return out;
    };

    match root.get("version") {
        Some(Value::Number(n)) if n.is_i64() => {
            let v = n.as_i64().unwrap_or(0);
            if v != CONFIG_VERSION {
                out.push(format!(
                    "/version: unsupported config version {} (current {})",
                    v, CONFIG_VERSION
                ));
            }
        }
        Some(other) => out.push(format!("/version: expected integer, got {}", kind(other))),
        None => out.push("/version: required".to_string()),
    }

    if let Some(agents) = root.get("agents") {
        validate_agents(agents, &mut out);
    }
    if let Some(routing) = root.get("routing") {
        validate_routing(routing, &mut out);
    }
    if let Some(mcp) = root.get("mcp") {
        validate_mcp(mcp, &mut out);
    }
    for section in ["channels", "gateway", "skills", "browser", "backup"] {
        if let Some(v) = root.get(section) {
            if !v.is_object() {
                out.push(format!("/{}: expected object, got {}", section, kind(v)));
            }
        }
    }

    out
}

fn validate_agents(agents: &Value, out: &mut Vec<String>) {
    let Some(map) = agents.as_object() else {
        out.push(format!("/agents: expected object, got {}", kind(agents)));
        return;
    };
    for (slug, agent) in map {
        let base = format!("/agents/{}", slug);
        if !slug_re().is_match(slug) {
            out.push(format!(
                "{}: invalid agent slug (lowercase letters, digits, hyphen, underscore)",
                base
            ));
        }
        let Some(fields) = agent.as_object() else {
            out.push(format!("{}: expected object, got {}", base, kind(agent)));
            continue;
        };
        expect_string(fields.get("name"), &format!("{}/name", base), out);
        expect_string(fields.get("model"), &format!("{}/model", base), out);
        if let Some(preset) = fields.get("toolPreset") {
            match preset.as_str() {
                Some(p) if PRESETS.contains(&p) => {}
                Some(p) => out.push(format!(
                    "{}/toolPreset: unknown preset \"{}\" (one of {})",
                    base,
                    p,
                    PRESETS.join(", ")
                )),
                None => out.push(format!(
                    "{}/toolPreset: expected string, got {}",
                    base,
                    kind(preset)
                )),
            }
        }
        for list in ["customTools", "toolServers", "skills"] {
            expect_string_array(fields.get(list), &format!("{}/{}", base, list), out);
        }
        for int in ["reflectionIntervalDays", "maxTurns"] {
            expect_integer(fields.get(int), &format!("{}/{}", base, int), out);
        }
        expect_string(fields.get("notify"), &format!("{}/notify", base), out);
        expect_bool(fields.get("admin"), &format!("{}/admin", base), out);
        if let Some(hb) = fields.get("heartbeat") {
            validate_heartbeat(hb, &format!("{}/heartbeat", base), out);
        }
    }
}

fn validate_heartbeat(hb: &Value, base: &str, out: &mut Vec<String>) {
    let Some(fields) = hb.as_object() else {
        out.push(format!("{}: expected object, got {}", base, kind(hb)));
        return;
    };
    expect_bool(fields.get("enabled"), &format!("{}/enabled", base), out);
    expect_bool(fields.get("suppressOk"), &format!("{}/suppressOk", base), out);
    expect_string(fields.get("interval"), &format!("{}/interval", base), out);
    expect_string(fields.get("deliverTo"), &format!("{}/deliverTo", base), out);
    if let Some(mode) = fields.get("mode") {
        match mode.as_str() {
            Some(m) if HEARTBEAT_MODES.contains(&m) => {}
            _ => out.push(format!("{}/mode: expected \"check\" or \"work\"", base)),
        }
    }
    if let Some(hours) = fields.get("activeHours") {
        let hours_base = format!("{}/activeHours", base);
        match hours.as_object() {
            Some(h) => {
                for key in ["start", "end", "timezone"] {
                    match h.get(key) {
                        Some(v) if v.is_string() => {}
                        Some(v) => out.push(format!(
                            "{}/{}: expected string, got {}",
                            hours_base,
                            key,
                            kind(v)
                        )),
                        None => out.push(format!("{}/{}: required", hours_base, key)),
                    }
                }
            }
            None => out.push(format!("{}: expected object, got {}", hours_base, kind(hours))),
        }
    }
}

fn validate_routing(routing: &Value, out: &mut Vec<String>) {
    let Some(fields) = routing.as_object() else {
        out.push(format!("/routing: expected object, got {}", kind(routing)));
        return;
    };
    expect_string(fields.get("defaultAgent"), "/routing/defaultAgent", out);
    if let Some(rules) = fields.get("rules") {
        let Some(rules) = rules.as_array() else {
            out.push(format!("/routing/rules: expected array, got {}", kind(rules)));
            return;
        };
        for (i, rule) in rules.iter().enumerate() {
            let base = format!("/routing/rules/{}", i);
            let Some(rule) = rule.as_object() else {
                out.push(format!("{}: expected object", base));
                continue;
            };
            for required in ["channel", "agentId"] {
                match rule.get(required) {
                    Some(v) if v.is_string() => {}
                    Some(v) => out.push(format!(
                        "{}/{}: expected string, got {}",
                        base,
                        required,
                        kind(v)
                    )),
                    None => out.push(format!("{}/{}: required", base, required)),
                }
            }
            expect_string(rule.get("channelUserId"), &format!("{}/channelUserId", base), out);
            expect_string(rule.get("chatId"), &format!("{}/chatId", base), out);
        }
    }
}

fn validate_mcp(mcp: &Value, out: &mut Vec<String>) {
    let Some(fields) = mcp.as_object() else {
        out.push(format!("/mcp: expected object, got {}", kind(mcp)));
        return;
    };
    expect_string_array(fields.get("autoApprove"), "/mcp/autoApprove", out);
    if let Some(servers) = fields.get("servers") {
        let Some(servers) = servers.as_object() else {
            out.push(format!("/mcp/servers: expected object, got {}", kind(servers)));
            return;
        };
        for (name, def) in servers {
            let base = format!("/mcp/servers/{}", name);
            let Some(def) = def.as_object() else {
                out.push(format!("{}: expected object", base));
                continue;
            };
            match def.get("command") {
                Some(v) if v.is_string() => {}
                Some(v) => out.push(format!("{}/command: expected string, got {}", base, kind(v))),
                None => out.push(format!("{}/command: required", base)),
            }
            expect_string_array(def.get("args"), &format!("{}/args", base), out);
            if let Some(env) = def.get("env") {
                match env.as_object() {
                    Some(env) => {
                        for (key, v) in env {
                            if !v.is_string() {
                                out.push(format!(
                                    "{}/env/{}: expected string, got {}",
                                    base,
                                    key,
                                    kind(v)
                                ));
                            }
                        }
                    }
                    None => out.push(format!("{}/env: expected object, got {}", base, kind(env))),
                }
            }
        }
    }
}

fn expect_string(value: Option<&Value>, path: &str, out: &mut Vec<String>) {
    if let Some(v) = value {
        if !v.is_string() && !v.is_null() {
            out.push(format!("{}: expected string, got {}", path, kind(v)));
        }
    }
}

fn expect_bool(value: Option<&Value>, path: &str, out: &mut Vec<String>) {
    if let Some(v) = value {
        if !v.is_boolean() {
            out.push(format!("{}: expected boolean, got {}", path, kind(v)));
        }
    }
}

fn expect_integer(value: Option<&Value>, path: &str, out: &mut Vec<String>) {
    if let Some(v) = value {
        if !v.is_i64() && !v.is_u64() && !v.is_null() {
            out.push(format!("{}: expected integer, got {}", path, kind(v)));
        }
    }
}

fn expect_string_array(value: Option<&Value>, path: &str, out: &mut Vec<String>) {
    if let Some(v) = value {
        match v.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        out.push(format!("{}/{}: expected string, got {}", path, i, kind(item)));
                    }
                }
            }
            None => out.push(format!("{}: expected array, got {}", path, kind(v))),
        }
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_config_has_no_violations() {
        let value = json!({
            "version": 5,
            "agents": {
                "scout": {
                    "name": "Scout",
                    "toolPreset": "coding",
                    "heartbeat": {
                        "enabled": true,
                        "interval": "15m",
                        "mode": "work",
                        "activeHours": {"start": "09:00", "end": "22:00", "timezone": "America/Los_Angeles"}
                    }
                }
            },
            "routing": {"defaultAgent": "scout", "rules": [{"channel": "slack", "agentId": "scout"}]},
            "mcp": {"servers": {"memory": {"command": "hive-memory-server"}}, "autoApprove": ["mcp__memory__*"]}
        });
        assert_eq!(validate(&value), Vec::<String>::new());
    }

    #[test]
    fn wrong_version_reported() {
        let value = json!({"version": 4});
        let violations = validate(&value);
        assert!(violations[0].contains("unsupported config version 4"));
    }

    #[test]
    fn bad_rule_and_bad_heartbeat_both_reported() {
        let value = json!({
            "version": 5,
            "agents": {"a": {"heartbeat": {"mode": "sometimes"}}},
            "routing": {"rules": [{"chatId": 42}]}
        });
        let violations = validate(&value);
        assert!(violations.iter().any(|v| v.contains("/agents/a/heartbeat/mode")));
        assert!(violations.iter().any(|v| v.contains("/routing/rules/0/channel")));
        assert!(violations.iter().any(|v| v.contains("/routing/rules/0/chatId")));
    }
}
