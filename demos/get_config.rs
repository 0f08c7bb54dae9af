use anyhow::Context;
use rnetconf::config::{NETCONF_PORT, SessionConfig};
use rnetconf::element::Element;
use rnetconf::rpc::{Datastore, Filter};
use rnetconf::session::{ConnectionSecurityOptions, SecurityLevel, Session};
use std::env;

const IETF_INTERFACES_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-interfaces";

fn print_usage() {
    eprintln!(
        "Usage: cargo run --example get_config -- <user> <host> <password> [port] [--security secure|balanced|legacy] [--pin <host-key>]"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        print_usage();
        std::process::exit(2);
    }

    let (user, host, password) = (&args[1], &args[2], &args[3]);
    let mut port = NETCONF_PORT;
    let mut level = SecurityLevel::default();
    let mut pinned_key = None;
    let mut rest = args.iter().skip(4);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--security" => {
                let value = rest.next().context("--security needs a value")?;
                level = value.parse()?;
            }
            "--pin" => pinned_key = Some(rest.next().context("--pin needs a key")?.clone()),
            value => port = value.parse().with_context(|| format!("invalid port '{value}'"))?,
        }
    }
    let mut security = ConnectionSecurityOptions::new(level).with_keepalive(Some(20));
    if let Some(key) = pinned_key {
        security = security.pinned(key);
    }

    let session = Session::connect(user, host, port, password, &security, SessionConfig::default())
        .await
        .with_context(|| format!("connecting to {user}@{host}:{port}"))?;
    println!(
        "session={} version={} capabilities={}",
        session.session_id(),
        session.protocol_version(),
        session.capabilities().len()
    );
    for module in session.capabilities().modules() {
        println!(
            "  module={} revision={}",
            module.module().unwrap_or_default(),
            module.revision().unwrap_or("-")
        );
    }

    let filter = Filter::subtree(Element::new("interfaces").with_namespace(IETF_INTERFACES_NS));
    let data = session
        .get_config(Datastore::Running, Some(filter))
        .await?
        .into_data()
        .context("get-config failed")?;
    println!("{data}");

    session.close().await?;
    Ok(())
}
