use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use duinobus_frame::{command_name, Hex, Packet};
use serde::Serialize;

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
struct PacketOutput<'a> {
    kind: &'a str,
    command: u8,
    command_name: &'a str,
    payload_size: usize,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rtt_ms: Option<f64>,
    timestamp: String,
}

/// Print one packet. `kind` says how it arrived: `response`, `event`, or
/// `unsolicited`.
pub fn print_packet(packet: &Packet, kind: &str, rtt: Option<Duration>, format: OutputFormat) {
    let name = command_name(packet.command);
    let hex = Hex(&packet.payload).to_string();
    let rtt_ms = rtt.map(|rtt| rtt.as_secs_f64() * 1000.0);
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                kind,
                command: packet.command,
                command_name: name,
                payload_size: packet.payload.len(),
                payload: hex,
                text: printable_text(&packet.payload),
                rtt_ms,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "COMMAND", "SIZE", "RTT", "PAYLOAD"])
                .add_row(vec![
                    kind.to_string(),
                    format!("0x{:02x} ({name})", packet.command),
                    packet.payload.len().to_string(),
                    rtt_ms.map(|ms| format!("{ms:.2}ms")).unwrap_or_default(),
                    payload_preview(&packet.payload, &hex),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!(
                "{kind} command=0x{:02x} ({name}) size={} payload={}",
                packet.command,
                packet.payload.len(),
                payload_preview(&packet.payload, &hex)
            );
            if let Some(ms) = rtt_ms {
                line.push_str(&format!(" rtt={ms:.2}ms"));
            }
            println!("{line}");
        }
        OutputFormat::Raw => print_raw(&packet.payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn printable_text(payload: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(payload).ok()?;
    (!text.is_empty() && !text.chars().any(char::is_control)).then_some(text)
}

fn payload_preview(payload: &[u8], hex: &str) -> String {
    match printable_text(payload) {
        Some(text) => format!("{text:?}"),
        None if payload.is_empty() => "-".to_string(),
        None => hex.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
