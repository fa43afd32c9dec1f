use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use ubridge::transport::{list_ports, PortInfo};

use crate::cmd::PortsArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_json, print_line, OutputFormat};

#[derive(Debug, Serialize)]
struct PortOutput {
    path: String,
    usb_id: Option<String>,
    manufacturer: Option<String>,
    product: Option<String>,
    serial_number: Option<String>,
    microbit: bool,
}

impl From<PortInfo> for PortOutput {
    fn from(port: PortInfo) -> Self {
        Self {
            microbit: port.is_microbit(),
            usb_id: port.usb_id.map(|(vid, pid)| format!("{vid:04x}:{pid:04x}")),
            path: port.path,
            manufacturer: port.manufacturer,
            product: port.product,
            serial_number: port.serial_number,
        }
    }
}

pub fn run(args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let ports: Vec<PortOutput> = list_ports()
        .map_err(|err| transport_error("port enumeration failed", err))?
        .into_iter()
        .filter(|port| args.all || port.is_microbit())
        .map(PortOutput::from)
        .collect();

    match format {
        OutputFormat::Json => print_json(&ports),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "USB ID", "PRODUCT", "SERIAL", "MICRO:BIT"]);
            for port in &ports {
                table.add_row(vec![
                    port.path.clone(),
                    port.usb_id.clone().unwrap_or_default(),
                    port.product.clone().unwrap_or_default(),
                    port.serial_number.clone().unwrap_or_default(),
                    if port.microbit { "yes" } else { "" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("no ports found");
            }
            for port in &ports {
                println!(
                    "{} {} {}",
                    port.path,
                    port.usb_id.as_deref().unwrap_or("-"),
                    port.product.as_deref().unwrap_or("")
                );
            }
        }
        OutputFormat::Raw => {
            for port in &ports {
                print_line(&port.path);
            }
        }
    }

    Ok(SUCCESS)
}
