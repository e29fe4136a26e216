//! portal-admin: command-line front end for the portal core.
//!
//! Usage:
//!   portal-admin --db portal.db --data-dir ./data --viewer u-eng-01
//!   portal-admin --db portal.db --bootstrap --admin u-admin
//!   portal-admin --db portal.db --ipc-mode

use anyhow::Result;
use portal_core::{
    clock::SystemClock,
    command::PortalCommand,
    config::PortalConfig,
    directory::{StaticDirectory, UserDirectory},
    portal::Portal,
    registry::NewProtocol,
    status::RequestStatus,
    store::PortalStore,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
struct ProtocolsFile {
    protocols: Vec<NewProtocol>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let bootstrap = args.iter().any(|a| a == "--bootstrap");
    let db = parse_str(&args, "--db", ":memory:");
    let data_dir = parse_str(&args, "--data-dir", "./data");
    let viewer = parse_str(&args, "--viewer", "");
    let admin = parse_str(&args, "--admin", "");

    if !ipc_mode {
        println!("portal-admin");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = PortalConfig::load(data_dir)?;
    let directory = StaticDirectory::load(&format!("{data_dir}/users.json"))?;
    log::info!("directory loaded: {} users", directory.len());

    let store = PortalStore::open(db)?;
    store.migrate()?;

    let mut portal = Portal::new(store, directory, &config, Arc::new(SystemClock))?;

    if bootstrap {
        bootstrap_protocols(&mut portal, data_dir, admin)?;
    }

    if ipc_mode {
        run_ipc_loop(&mut portal)?;
    } else {
        print_summary(&portal, viewer)?;
    }

    Ok(())
}

/// One `PortalCommand` per line on stdin, one JSON answer per line on stdout.
fn run_ipc_loop(portal: &mut Portal<StaticDirectory>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }
        if buffer.trim() == "quit" {
            break;
        }

        let cmd: PortalCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let name = cmd.name();
        match portal.execute(cmd) {
            Ok(outcome) => writeln!(stdout, "{}", serde_json::to_string(&outcome)?)?,
            Err(e) => {
                log::warn!("{name} failed: {e}");
                let err_json = serde_json::json!({ "error": e.to_string(), "cmd": name });
                writeln!(stdout, "{}", err_json)?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

/// Add every protocol in `<data_dir>/protocols.json` that is not stored yet.
fn bootstrap_protocols(
    portal: &mut Portal<StaticDirectory>,
    data_dir: &str,
    admin: &str,
) -> Result<()> {
    let path = format!("{data_dir}/protocols.json");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let file: ProtocolsFile = serde_json::from_str(&content)?;

    let mut added = 0;
    for protocol in file.protocols {
        if portal.store().protocol_exists(protocol.id.trim())? {
            continue;
        }
        let saved = portal.add_protocol(admin, protocol)?;
        println!("  + {} {} ({})", saved.uid, saved.id, saved.pic);
        added += 1;
    }
    println!("bootstrap: {added} protocol(s) added");
    println!();
    Ok(())
}

fn print_summary(portal: &Portal<StaticDirectory>, viewer: &str) -> Result<()> {
    let protocols = portal.list_protocols()?;
    let rules = portal.list_rules()?;
    let store = portal.store();

    println!("=== PROTOCOLS ===");
    if protocols.is_empty() {
        println!("  (none, run with --bootstrap --admin <id>)");
    }
    for p in &protocols {
        let state = if p.is_active { "active" } else { "inactive" };
        println!("  {} {:<20} {:<10} {}", p.uid, p.id, state, p.pic);
    }

    println!();
    println!("=== BOOKING RULES ===");
    if rules.is_empty() {
        println!("  (none)");
    }
    for r in &rules {
        println!(
            "  [{:>4}] {:<10} {:<20} -> {}",
            r.priority,
            r.rule_type.as_str(),
            r.condition,
            r.assigned_pic
        );
    }

    println!();
    println!("=== REQUESTS ===");
    println!("  total:      {}", store.request_count()?);
    for status in [
        RequestStatus::Pending,
        RequestStatus::Confirmed,
        RequestStatus::Completed,
    ] {
        println!("  {:<10}  {}", status.as_str(), store.request_count_by_status(status)?);
    }

    if !viewer.is_empty() {
        let name = portal
            .directory()
            .lookup(viewer)?
            .map(|u| u.display_name().to_string())
            .unwrap_or_else(|| viewer.to_string());
        let visible = portal.list_requests(viewer)?;
        println!();
        println!("=== VISIBLE TO {name} ({}) ===", visible.len());
        for r in &visible {
            println!(
                "  {} {:<12} {:<10} {:<20} pic={}",
                r.created_at.format("%Y-%m-%d"),
                r.kind.as_str(),
                r.status.as_str(),
                r.client,
                r.pic
            );
        }
    }
    Ok(())
}

fn parse_str<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .unwrap_or(default)
}
