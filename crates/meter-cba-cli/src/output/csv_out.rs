use serde_json::{Map, Value};
use std::io;

type CsvWriter = csv::Writer<io::StdoutLock<'static>>;

/// Write output as CSV to stdout.
///
/// A single run prints its annual series, one row per year. Row-shaped
/// outputs (tornado, scenarios, meter comparisons) print one row per entry.
/// Anything else falls back to `field,value` pairs.
pub fn print_csv(value: &Value) {
    let mut wtr = csv::Writer::from_writer(io::stdout().lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let written = match result {
        Value::Object(map) => match (map.get("series"), map.get("rows").or_else(|| map.get("results"))) {
            (Some(Value::Object(series)), _) => write_series(&mut wtr, series),
            (_, Some(Value::Array(rows))) => write_rows(&mut wtr, rows),
            _ => write_fields(&mut wtr, map),
        },
        Value::Array(rows) => write_rows(&mut wtr, rows),
        other => wtr.write_record([cell(other)]),
    };

    if let Err(e) = written.and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        eprintln!("CSV write error: {e}");
    }
}

/// Column-per-series transpose of an `AnnualSeries` object.
fn write_series(wtr: &mut CsvWriter, series: &Map<String, Value>) -> csv::Result<()> {
    let columns: Vec<(&String, &Vec<Value>)> = series
        .iter()
        .filter_map(|(k, v)| v.as_array().map(|a| (k, a)))
        .collect();
    wtr.write_record(columns.iter().map(|(k, _)| k.as_str()))?;

    let len = columns.iter().map(|(_, a)| a.len()).max().unwrap_or(0);
    for i in 0..len {
        wtr.write_record(
            columns
                .iter()
                .map(|(_, a)| a.get(i).map(cell).unwrap_or_default()),
        )?;
    }
    Ok(())
}

fn write_rows(wtr: &mut CsvWriter, rows: &[Value]) -> csv::Result<()> {
    let Some(Value::Object(first)) = rows.first() else {
        for item in rows {
            wtr.write_record([cell(item)])?;
        }
        return Ok(());
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    wtr.write_record(&headers)?;
    for item in rows.iter().filter_map(Value::as_object) {
        wtr.write_record(
            headers
                .iter()
                .map(|h| item.get(*h).map(cell).unwrap_or_default()),
        )?;
    }
    Ok(())
}

fn write_fields(wtr: &mut CsvWriter, map: &Map<String, Value>) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in map {
        wtr.write_record([key.as_str(), &cell(val)])?;
    }
    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Object(map) if map.contains_key("status") => map
            .get("years")
            .and_then(Value::as_f64)
            .map(|y| y.to_string())
            .unwrap_or_else(|| "never".to_string()),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
