use serde::Serialize;
use tracing::debug;
use ubridge::session::{InvokeOptions, Setting};

use crate::cmd::GetArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::link::{open_session, LinkArgs};
use crate::output::{print_rows, OutputFormat};

#[derive(Debug, Serialize)]
pub(crate) struct SettingOutput<'a> {
    pub setting: &'a str,
    pub value: &'a str,
}

pub fn run(args: GetArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let setting: Setting = args
        .setting
        .parse()
        .map_err(|err| session_error("get", err))?;

    let mut session = open_session(link, true)?;
    let command = setting.read_command();
    debug!(%command, "reading setting");
    let reply = session
        .invoke(&command, InvokeOptions::default())
        .map_err(|err| session_error("get failed", err))?;

    let value = reply.text();
    let out = SettingOutput {
        setting: setting.as_str(),
        value,
    };
    print_rows(
        "ubridge get",
        &[(setting.as_str(), value.to_string())],
        &out,
        format,
    );
    Ok(SUCCESS)
}
