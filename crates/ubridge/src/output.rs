use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use ubridge::frame::{CompactRecord, Field, PeriodicFrame, PeriodicLayout};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PeriodicOutput<'a> {
    layout: PeriodicLayout,
    line: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compact: Option<CompactRecord>,
    timestamp_ms: u128,
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Print one periodic frame. JSON output is one object per line.
pub fn print_periodic(frame: &PeriodicFrame, format: OutputFormat) {
    let text = frame.text();
    match format {
        OutputFormat::Json => {
            let out = PeriodicOutput {
                layout: frame.layout(),
                line: &text,
                fields: frame.fields(),
                compact: frame.compact().ok(),
                timestamp_ms: now_unix_millis(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let fields = frame.fields();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);
            if fields.is_empty() {
                table.set_header(vec!["LAYOUT", "LINE"]).add_row(vec![
                    layout_name(frame.layout()).to_string(),
                    text.to_string(),
                ]);
            } else {
                table
                    .set_header(fields.iter().map(|f| f.key.clone()).collect::<Vec<_>>())
                    .add_row(fields.iter().map(|f| f.value.clone()).collect::<Vec<_>>());
            }
            println!("{table}");
        }
        OutputFormat::Pretty => match frame.compact() {
            Ok(record) => println!(
                "accel={},{},{} a={} b={} logo={}",
                record.accel[0],
                record.accel[1],
                record.accel[2],
                record.button_a,
                record.button_b,
                record.logo
            ),
            Err(_) => {
                let fields = frame.fields();
                if fields.is_empty() {
                    println!("{text}");
                } else {
                    let pairs: Vec<String> = fields
                        .iter()
                        .map(|f| format!("{}={}", f.key, f.value))
                        .collect();
                    println!("{}", pairs.join(" "));
                }
            }
        },
        OutputFormat::Raw => print_line(&text),
    }
}

/// Print name/value rows: a two-column table, aligned text, or a JSON
/// object built from `json`.
pub fn print_rows<T: Serialize>(
    title: &str,
    rows: &[(&str, String)],
    json: &T,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(json),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in rows {
                table.add_row(vec![name.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{title}\n");
            let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
            for (name, value) in rows {
                println!("  {name:<width$}  {value}");
            }
        }
        OutputFormat::Raw => {
            for (_, value) in rows {
                print_line(value);
            }
        }
    }
}

pub fn print_line(line: &str) {
    let mut out = std::io::stdout();
    let _ = out.write_all(line.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn layout_name(layout: PeriodicLayout) -> &'static str {
    match layout {
        PeriodicLayout::Readable => "readable",
        PeriodicLayout::Compact => "compact",
        PeriodicLayout::Unrecognized => "unrecognized",
    }
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
