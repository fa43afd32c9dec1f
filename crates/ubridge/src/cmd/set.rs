use tracing::info;
use ubridge::session::{InvokeOptions, Setting};

use crate::cmd::get::SettingOutput;
use crate::cmd::SetArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::link::{open_session, LinkArgs};
use crate::output::{print_rows, OutputFormat};

pub fn run(args: SetArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let setting: Setting = args
        .setting
        .parse()
        .map_err(|err| session_error("set", err))?;
    let command = setting
        .write_command(&args.value)
        .map_err(|err| session_error("set", err))?;

    let mut session = open_session(link, true)?;
    let reply = session
        .invoke(&command, InvokeOptions::default())
        .map_err(|err| session_error("set failed", err))?;
    info!(setting = setting.as_str(), value = reply.text(), "setting written");

    let out = SettingOutput {
        setting: setting.as_str(),
        value: reply.text(),
    };
    print_rows(
        "ubridge set",
        &[(setting.as_str(), reply.text().to_string())],
        &out,
        format,
    );
    Ok(SUCCESS)
}
