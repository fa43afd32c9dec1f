use crate::cmd::InfoArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::link::{open_session, LinkArgs};
use crate::output::{print_rows, OutputFormat};

pub fn run(_args: InfoArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = open_session(link, true)?;
    let info = session
        .device_info()
        .map_err(|err| session_error("info failed", err))?;

    let rows = [
        ("protocol", info.protocol_version.clone()),
        ("sw-version", info.software_version.clone()),
        ("hw-version", info.hardware_version.clone()),
        ("bridge-id", info.bridge_id.to_string()),
        ("remote-id", info.remote_id.to_string()),
        ("channel", info.radio_channel.to_string()),
        ("period", format!("{} ms", info.period_ms)),
    ];
    print_rows("ubridge info", &rows, &info, format);
    Ok(SUCCESS)
}
