use anyhow::Context;
use rnetconf::rpc::RpcReply;
use rnetconf::session::{NormalizeOptions, SessionEvent, SessionRecorder, SessionReplayer};
use std::env;
use std::fs;

fn print_usage() {
    eprintln!(
        "Usage: cargo run --example replay_recording -- <recording.jsonl> [--write <fixture.jsonl>] [--keep-raw]"
    );
}

fn describe(reply: &RpcReply) -> String {
    let errors = reply
        .errors()
        .iter()
        .map(|e| format!("{}: {}", e.tag, e.message.as_deref().unwrap_or("-")))
        .collect::<Vec<_>>()
        .join("; ");
    match reply {
        RpcReply::Ok => "ok".to_string(),
        RpcReply::Data(data) => format!("data <{}> ({} children)", data.name(), data.children().len()),
        RpcReply::Errors(_) => format!("error [{errors}]"),
        RpcReply::Partial { .. } => format!("partial [{errors}]"),
    }
}

/// Normalizes a session recording and replays every recorded request
/// against it, the way a test fixture would be consumed.
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(2);
    }

    let input = &args[1];
    let mut output = None;
    let mut options = NormalizeOptions::default();
    let mut rest = args.iter().skip(2);
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--write" => output = Some(rest.next().context("--write needs a path")?),
            "--keep-raw" => options.keep_raw_frames = true,
            unknown => {
                print_usage();
                anyhow::bail!("unknown flag '{unknown}'");
            }
        }
    }

    let recording =
        fs::read_to_string(input).with_context(|| format!("reading recording '{input}'"))?;
    let normalized = SessionRecorder::normalize_jsonl(&recording, options)?;

    let mut replayer = SessionReplayer::from_jsonl(&normalized)?;
    let ctx = replayer
        .initial_context()
        .context("recording has no hello exchange")?;
    println!(
        "session={} version={} peer capabilities={}",
        ctx.session_id,
        ctx.version,
        ctx.peer_capabilities.len()
    );

    let operations = SessionRecorder::from_jsonl(&normalized)?
        .entries()?
        .into_iter()
        .filter_map(|entry| match entry.event {
            SessionEvent::RpcSent { operation, .. } => Some(operation),
            _ => None,
        })
        .collect::<Vec<_>>();
    for operation in &operations {
        match replayer.replay_next(operation) {
            Ok(reply) => println!("{operation:<18} {}", describe(&reply)),
            Err(err) => println!("{operation:<18} not replayable: {err}"),
        }
    }

    if let Some(output) = output {
        fs::write(output, normalized).with_context(|| format!("writing fixture '{output}'"))?;
        println!("normalized fixture written to {output}");
    }
    Ok(())
}
