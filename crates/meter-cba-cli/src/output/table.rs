use serde_json::{Map, Value};
use tabled::{Table, builder::Builder};

/// Keys rendered per row by the comparison tables. Series and nested
/// payer breakdowns only make sense in JSON output.
const SKIPPED_KEYS: [&str; 3] = ["series", "payers", "annual"];

/// Render an analysis envelope (or a bare value) as tables.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => {
                print_result(result);
                print_footer(map);
            }
            None => print_result(value),
        },
        Value::Array(rows) => print_rows(rows),
        other => println!("{other}"),
    }
}

fn print_result(result: &Value) {
    let Value::Object(map) = result else {
        println!("{}", format_cell("", result));
        return;
    };
    // Tornado, scenario and comparison outputs carry their rows in an array.
    if let Some(Value::Array(rows)) = map.get("rows").or_else(|| map.get("results")) {
        print_rows(rows);
        let headline: Map<String, Value> = map
            .iter()
            .filter(|(k, v)| !v.is_array() && k.as_str() != "rows")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !headline.is_empty() {
            println!();
            print_fields(&headline);
        }
    } else {
        print_fields(map);
    }
}

fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if SKIPPED_KEYS.contains(&key.as_str()) {
            continue;
        }
        builder.push_record([key.as_str(), &format_cell(key, val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        if rows.is_empty() {
            println!("(empty)");
        }
        for item in rows {
            println!("{}", format_cell("", item));
        }
        return;
    };

    let headers: Vec<&String> = first
        .keys()
        .filter(|k| !SKIPPED_KEYS.contains(&k.as_str()))
        .collect();
    let mut builder = Builder::default();
    builder.push_record(headers.iter().map(|h| h.as_str()));
    for item in rows {
        if let Value::Object(map) = item {
            builder.push_record(
                headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(|v| format_cell(h, v)).unwrap_or_default()),
            );
        }
    }
    println!("{}", Table::from(builder));
}

fn print_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }
    if let Some(Value::String(methodology)) = envelope.get("methodology") {
        println!("\nMethodology: {methodology}");
    }
}

/// Dollar and volume figures are rounded to whole units, ratios keep
/// four decimals.
fn format_cell(key: &str, value: &Value) -> String {
    match value {
        Value::Null => "n/a".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(x) if is_amount(key) => format!("{x:.0}"),
            Some(x) if x.fract() != 0.0 => format!("{x:.4}"),
            _ => n.to_string(),
        },
        Value::Object(map) => match map.get("status").and_then(Value::as_str) {
            // PaybackPeriod
            Some("within") => map
                .get("years")
                .and_then(Value::as_f64)
                .map(|y| format!("{y:.1} years"))
                .unwrap_or_else(|| "within".to_string()),
            Some("never") => "never".to_string(),
            _ => serde_json::to_string(value).unwrap_or_default(),
        },
        Value::Array(items) => items
            .iter()
            .map(|v| format_cell(key, v))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn is_amount(key: &str) -> bool {
    key.contains("npv")
        || key.starts_with("pv_")
        || key.ends_with("_m3")
        || key.contains("capex")
        || key.contains("outlay")
        || key.contains("deviation_from_base")
        || key == "swing"
}
