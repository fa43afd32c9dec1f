use serde::Serialize;
use ubridge::frame::parse_body;
use ubridge::session::{InvokeOptions, Reply};

use crate::cmd::SendArgs;
use crate::exit::{frame_error, session_error, CliResult, SUCCESS};
use crate::link::{open_session, LinkArgs};
use crate::output::{print_json, print_line, print_periodic, OutputFormat};

#[derive(Debug, Serialize)]
struct SendOutput<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
    backlog: usize,
}

pub fn run(args: SendArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let (name, command_args) = split_frame(&args.frame)?;

    let mut options = if args.no_wait {
        InvokeOptions::fire_and_forget()
    } else {
        InvokeOptions::default()
    };
    if args.allow_periodic {
        options = options.allowing_periodic(true);
    }

    let mut session = open_session(link, false)?;
    let reply = session
        .invoke_raw(&name, &command_args, options)
        .map_err(|err| session_error("send failed", err))?;

    print_reply(&reply, format);
    Ok(SUCCESS)
}

fn split_frame(frame: &str) -> CliResult<(String, String)> {
    let body = if frame.contains('[') {
        frame.to_string()
    } else {
        format!("{frame}[]")
    };
    parse_body(body.as_bytes()).map_err(|err| frame_error("send", err))
}

fn print_reply(reply: &Reply, format: OutputFormat) {
    for frame in &reply.backlog {
        print_periodic(frame, format);
    }
    match format {
        OutputFormat::Json => print_json(&SendOutput {
            command: &reply.command,
            response: reply.frame.as_ref().map(|frame| frame.to_string()),
            value: reply.value.as_ref().map(|_| reply.text()),
            backlog: reply.backlog.len(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => match &reply.frame {
            Some(frame) => println!("{} -> {}", reply.command, frame),
            None => println!("{} (sent)", reply.command),
        },
        OutputFormat::Raw => {
            if reply.value.is_some() {
                print_line(reply.text());
            }
        }
    }
}
