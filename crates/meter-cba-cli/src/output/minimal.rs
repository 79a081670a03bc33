use serde_json::Value;

/// Headline figure of each command, in lookup order. The first non-null hit
/// is printed.
const HEADLINE_KEYS: [&str; 6] = [
    "npv",
    "probability_weighted_npv",
    "best",
    "base_npv",
    "deterministic_npv",
    "probability_positive_npv",
];

/// Print just the headline answer: a run prints its NPV and payback on
/// one line, other commands print their headline figure.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let Value::Object(map) = result else {
        println!("{}", render(result));
        return;
    };

    // Optimizer output nests the winning schedule.
    if let Some(best) = map.get("best").filter(|b| b.is_object()) {
        print_minimal(best);
        return;
    }

    match HEADLINE_KEYS
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
    {
        Some(npv) => match map.get("payback") {
            Some(payback) => println!("{} {}", render(npv), render(payback)),
            None => println!("{}", render(npv)),
        },
        None => match map.get("status").and_then(Value::as_str) {
            Some(status) => println!("{status}"),
            None => {
                if let Some((key, val)) = map.iter().next() {
                    println!("{}: {}", key, render(val));
                }
            }
        },
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Object(map) if map.contains_key("status") => match map.get("years") {
            Some(years) => format!("payback={years}"),
            None => "payback=never".to_string(),
        },
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
