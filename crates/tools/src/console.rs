//! get_console_messages: scope parsing and the text report format.

use async_trait::async_trait;
use bmcps_browser::console::{
    ConsoleQuery, ConsoleQueryResult, CountScope, DurationUnit, LevelScope, Order, TimeScope,
};
use bmcps_core::{Error, Result};
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolOutput, ToolSchema};

pub struct GetConsoleMessagesTool;

pub(crate) fn parse_query(arguments: &Value) -> Result<ConsoleQuery> {
    let mut query = ConsoleQuery::default();

    if let Some(time_scope) = arguments.get("time_scope").filter(|v| v.is_object()) {
        let kind = time_scope
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("none");
        query.time_scope = match kind {
            "none" => TimeScope::None,
            "last_duration" => TimeScope::LastDuration {
                value: time_scope.get("value").and_then(Value::as_i64).unwrap_or(0),
                unit: DurationUnit::parse(
                    time_scope
                        .get("unit")
                        .and_then(Value::as_str)
                        .unwrap_or("seconds"),
                )?,
            },
            "range" => TimeScope::Range {
                from_ms: time_scope
                    .get("from_ms")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
                to_ms: time_scope.get("to_ms").and_then(Value::as_i64).unwrap_or(0),
            },
            "from_onwards" => TimeScope::FromOnwards {
                from_ms: time_scope
                    .get("from_ms")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
            },
            "until" => TimeScope::Until {
                to_ms: time_scope.get("to_ms").and_then(Value::as_i64).unwrap_or(0),
            },
            other => return Err(Error::Tool(format!("Unknown time_scope type: {other}"))),
        };
    }

    if let Some(count_scope) = arguments.get("count_scope").filter(|v| v.is_object()) {
        query.count_scope = CountScope {
            max_entries: count_scope
                .get("max_entries")
                .and_then(Value::as_i64)
                .unwrap_or(500),
            order: match count_scope
                .get("order")
                .and_then(Value::as_str)
                .unwrap_or("newest_first")
            {
                "oldest_first" => Order::OldestFirst,
                _ => Order::NewestFirst,
            },
        };
    }

    if let Some(level_scope) = arguments.get("level_scope").filter(|v| v.is_object()) {
        let kind = level_scope
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("min_level");
        query.level_scope = if kind == "only" {
            let levels = level_scope
                .get("levels")
                .and_then(Value::as_array)
                .map(|levels| {
                    levels
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            LevelScope::Only(levels)
        } else {
            LevelScope::MinLevel(
                level_scope
                    .get("level")
                    .and_then(Value::as_str)
                    .unwrap_or("info")
                    .to_string(),
            )
        };
    }

    Ok(query)
}

pub(crate) fn format_report(result: &ConsoleQueryResult) -> String {
    let mut report = format!(
        "[bmcps-console] returned={} total_matching={} truncated={}\n",
        result.returned, result.total_matching, result.truncated
    );
    report.push_str(&format!(
        "time_sync browser_now_ms={} server_now_ms={} offset_ms={} round_trip_ms={}\n\n",
        result.time_sync.browser_now_ms,
        result.time_sync.server_now_ms,
        result.time_sync.offset_ms,
        result.time_sync.round_trip_ms
    ));
    for line in &result.lines {
        report.push_str(line);
        report.push('\n');
    }
    report
}

#[async_trait]
impl Tool for GetConsoleMessagesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_console_messages",
            description: "Get console messages (console.log, console.error, etc.) from the \
                current browser tab. The browser must be open and a tab attached (call \
                open_browser first). Parameters: time_scope (none | last_duration | range | \
                from_onwards | until), count_scope (max_entries, order), level_scope \
                (min_level or only). Response first line: [bmcps-console] returned=N \
                total_matching=M truncated=true|false; then time_sync; then log lines.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "time_scope": {
                        "type": "object",
                        "description": "Time filter. One variant: type=none (default), type=last_duration (value+unit), type=range (from_ms+to_ms), type=from_onwards (from_ms), type=until (to_ms).",
                        "properties": {
                            "type": {"type": "string", "enum": ["none", "last_duration", "range", "from_onwards", "until"]},
                            "value": {"type": "number", "description": "For last_duration: duration value."},
                            "unit": {"type": "string", "enum": ["milliseconds", "seconds", "minutes"], "description": "For last_duration."},
                            "from_ms": {"type": "integer", "description": "For range or from_onwards: start timestamp (ms epoch)."},
                            "to_ms": {"type": "integer", "description": "For range or until: end timestamp (ms epoch)."}
                        },
                        "required": ["type"]
                    },
                    "count_scope": {
                        "type": "object",
                        "description": "Max entries to return and order. Applied after time and level filter.",
                        "properties": {
                            "max_entries": {"type": "integer", "default": 500, "description": "Max number of lines to return."},
                            "order": {"type": "string", "enum": ["newest_first", "oldest_first"], "default": "newest_first"}
                        }
                    },
                    "level_scope": {
                        "type": "object",
                        "description": "Level filter: type=min_level with level (default info), or type=only with levels array.",
                        "properties": {
                            "type": {"type": "string", "enum": ["min_level", "only"]},
                            "level": {"type": "string", "enum": ["debug", "log", "info", "warning", "error"], "description": "For min_level."},
                            "levels": {"type": "array", "items": {"type": "string"}, "description": "For only: list of levels to include."}
                        },
                        "required": ["type"]
                    }
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let query = parse_query(&params)?;
        let result = ctx.driver.get_console_messages(&query).await?;
        Ok(ToolOutput::text(format_report(&result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmcps_browser::console::TimeSync;

    #[test]
    fn parses_default_query() {
        let query = parse_query(&json!({})).unwrap();
        assert_eq!(query.time_scope, TimeScope::None);
        assert_eq!(query.count_scope.max_entries, 500);
        assert_eq!(query.count_scope.order, Order::NewestFirst);
        assert_eq!(query.level_scope, LevelScope::MinLevel("info".to_string()));
    }

    #[test]
    fn parses_full_query() {
        let query = parse_query(&json!({
            "time_scope": {"type": "last_duration", "value": 5, "unit": "minutes"},
            "count_scope": {"max_entries": 10, "order": "oldest_first"},
            "level_scope": {"type": "only", "levels": ["error", "warning"]}
        }))
        .unwrap();
        assert_eq!(
            query.time_scope,
            TimeScope::LastDuration {
                value: 5,
                unit: DurationUnit::Minutes
            }
        );
        assert_eq!(query.count_scope.max_entries, 10);
        assert_eq!(query.count_scope.order, Order::OldestFirst);
        assert_eq!(
            query.level_scope,
            LevelScope::Only(vec!["error".to_string(), "warning".to_string()])
        );
    }

    #[test]
    fn rejects_unknown_variants() {
        assert!(parse_query(&json!({"time_scope": {"type": "lately"}})).is_err());
        assert!(parse_query(
            &json!({"time_scope": {"type": "last_duration", "value": 1, "unit": "fortnights"}})
        )
        .is_err());
    }

    #[test]
    fn report_format() {
        let result = ConsoleQueryResult {
            lines: vec!["[error] b".to_string()],
            returned: 1,
            total_matching: 1,
            truncated: false,
            time_sync: TimeSync {
                browser_now_ms: 1010,
                server_now_ms: 1000,
                offset_ms: 10,
                round_trip_ms: 4,
            },
        };
        let report = format_report(&result);
        assert!(report.starts_with(
            "[bmcps-console] returned=1 total_matching=1 truncated=false\n"
        ));
        assert!(report.contains(
            "time_sync browser_now_ms=1010 server_now_ms=1000 offset_ms=10 round_trip_ms=4"
        ));
        assert!(report.ends_with("[error] b\n"));
    }
}
