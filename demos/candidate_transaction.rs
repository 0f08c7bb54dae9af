use rnetconf::config::{NETCONF_PORT, SessionConfig};
use rnetconf::element::{Element, Schema, diff_with};
use rnetconf::rpc::{Datastore, Filter};
use rnetconf::session::{ConfigTransaction, ConnectionSecurityOptions, Session, TxResult};
use std::env;
use std::error::Error;

const IETF_INTERFACES_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-interfaces";

fn print_report(result: &TxResult) {
    println!(
        "transaction={} committed={} failed_step={:?} applied_edits={} validated={} discarded={} unlocked={}",
        result.name,
        result.committed,
        result.failed_step,
        result.applied_edits,
        result.validated,
        result.discarded,
        result.unlocked
    );
    if let Some(reason) = &result.failure_reason {
        println!("  failure_reason={reason}");
    }
    if !result.cleanup_errors.is_empty() {
        println!("  cleanup_errors={:?}", result.cleanup_errors);
    }
}

fn desired_mtu(current: &Element, interface: &str, mtu: &str) -> Element {
    let mut desired = current.clone();
    let entry = desired
        .children_mut()
        .iter_mut()
        .find(|e| e.name() == "interface" && e.child_text("name") == Some(interface));
    match entry {
        Some(entry) => match entry.child_mut("mtu") {
            Some(leaf) => leaf.set_text(mtu),
            None => entry.push_child(Element::leaf("mtu", mtu)),
        },
        None => desired.push_child(
            Element::new("interface")
                .with_child(Element::leaf("name", interface))
                .with_child(Element::leaf("mtu", mtu)),
        ),
    }
    desired
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 6 {
        eprintln!(
            "Usage: cargo run --example candidate_transaction -- <user> <host> <password> <interface> <mtu> [--dry-run]"
        );
        std::process::exit(2);
    }
    let dry_run = args.iter().any(|a| a == "--dry-run");

    let session = Session::connect(
        &args[1],
        &args[2],
        NETCONF_PORT,
        &args[3],
        &ConnectionSecurityOptions::default(),
        SessionConfig::default(),
    )
    .await?;

    let filter = Filter::subtree(Element::new("interfaces").with_namespace(IETF_INTERFACES_NS));
    let running = session
        .get_config(Datastore::Running, Some(filter))
        .await?
        .into_data()?;
    let current = running
        .child("interfaces")
        .cloned()
        .unwrap_or_else(|| Element::new("interfaces").with_namespace(IETF_INTERFACES_NS));

    let schema = Schema::new().with_list("interface", ["name"]);
    let desired = desired_mtu(&current, &args[4], &args[5]);
    let edit = diff_with(&current, &desired, &schema);
    if edit.children().is_empty() {
        println!("running configuration already matches");
        session.close().await?;
        return Ok(());
    }
    println!("edit-config payload:\n{edit}");

    if !dry_run {
        let tx = ConfigTransaction::new(format!("mtu-{}", args[4]))
            .edit(edit)
            .validate_before_commit();
        let result = session.execute_transaction(&tx).await?;
        print_report(&result);
    }

    session.close().await?;
    Ok(())
}
